use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CourseSearchError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Too many search terms: {count} word lookups, max {max}")]
    TooManyTerms { count: usize, max: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Course {course_id} starts in {year}, beyond the last supported year {max_year}")]
    FutureYear {
        course_id: i64,
        year: i32,
        max_year: i32,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, CourseSearchError>;

impl From<std::io::Error> for CourseSearchError {
    fn from(e: std::io::Error) -> Self {
        CourseSearchError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CourseSearchError {
    fn from(e: serde_json::Error) -> Self {
        CourseSearchError::Json(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CourseSearchError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CourseSearchError::Storage(format!("lock poisoned: {}", e))
    }
}
