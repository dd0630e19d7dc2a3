use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard-local document identifier, assigned on insert.
pub type DocumentId = i64;
/// Global word identifier. Word rows are never deleted.
pub type WordId = i64;
pub type CourseId = i64;
pub type CourseModuleId = i64;

/// Everything that identifies a document for lookup purposes.
///
/// Two keys are the same document only when every field matches, with `None`
/// distinct from any value (a key with no group is not the same document as
/// one with group 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    pub plugin: String,
    pub course_id: Option<CourseId>,
    pub course_module_id: Option<CourseModuleId>,
    pub group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub string_ref: Option<String>,
    pub int_ref1: Option<i64>,
    pub int_ref2: Option<i64>,
}

impl DocumentKey {
    pub fn new(plugin: impl Into<String>) -> Self {
        DocumentKey {
            plugin: plugin.into(),
            ..Default::default()
        }
    }

    /// Key for content owned by an activity module, e.g. `mod_forum`.
    pub fn for_module(module_name: &str, course_id: CourseId, course_module_id: CourseModuleId) -> Self {
        DocumentKey {
            plugin: format!("mod_{}", module_name),
            course_id: Some(course_id),
            course_module_id: Some(course_module_id),
            ..Default::default()
        }
    }

    pub fn with_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn with_course_module(mut self, course_module_id: CourseModuleId) -> Self {
        self.course_module_id = Some(course_module_id);
        self
    }

    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_string_ref(mut self, string_ref: impl Into<String>) -> Self {
        self.string_ref = Some(string_ref.into());
        self
    }

    pub fn with_int_refs(mut self, int_ref1: i64, int_ref2: Option<i64>) -> Self {
        self.int_ref1 = Some(int_ref1);
        self.int_ref2 = int_ref2;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub key: DocumentKey,
    pub time_modified: i64,
    pub time_expires: Option<i64>,
}

/// One word in one document. `score` packs body and title counts:
/// `min(body, 15) + min(title, 15) * 16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub word_id: WordId,
    pub document_id: DocumentId,
    pub score: u8,
}

pub fn occurrence_score(title_count: usize, body_count: usize) -> u8 {
    (body_count.min(15) + title_count.min(15) * 16) as u8
}

/// Physical partition of document and occurrence storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shard {
    Unpartitioned,
    Year(i32),
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shard::Unpartitioned => write!(f, "unpartitioned"),
            Shard::Year(year) => write!(f, "year_{}", year),
        }
    }
}

/// What the course catalog knows about a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub short_name: String,
    /// Unix timestamp (seconds).
    pub start_date: i64,
}

impl Course {
    pub fn new(id: CourseId, short_name: impl Into<String>, start_date: i64) -> Self {
        Course {
            id,
            short_name: short_name.into(),
            start_date,
        }
    }
}

/// Which year shard holds a course's documents, plus years that may still
/// hold some of them until the redate process catches up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseYearRecord {
    pub course_id: CourseId,
    pub year: i32,
    /// Insertion ordered, no duplicates. The first entry is the oldest.
    pub stale_years: Vec<i32>,
}

impl CourseYearRecord {
    pub fn new(course_id: CourseId, year: i32) -> Self {
        CourseYearRecord {
            course_id,
            year,
            stale_years: Vec::new(),
        }
    }

    pub fn is_stale(&self) -> bool {
        !self.stale_years.is_empty()
    }

    pub fn oldest_stale_year(&self) -> Option<i32> {
        self.stale_years.first().copied()
    }

    /// Move the course to `new_year`. Returns false when nothing changed.
    ///
    /// The new year leaves the stale set (its shard is the home shard again)
    /// and the previous year joins it if not already present.
    pub fn change_year(&mut self, new_year: i32) -> bool {
        if new_year == self.year {
            return false;
        }
        self.stale_years.retain(|&y| y != new_year);
        if !self.stale_years.contains(&self.year) {
            self.stale_years.push(self.year);
        }
        self.year = new_year;
        true
    }

    pub fn remove_stale_year(&mut self, year: i32) {
        self.stale_years.retain(|&y| y != year);
    }
}
