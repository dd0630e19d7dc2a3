use crate::error::Result;
use crate::types::{Course, CourseId};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// Read access to the host's courses.
pub trait CourseCatalog: Send + Sync {
    fn get(&self, course_id: CourseId) -> Result<Option<Course>>;

    /// Smallest course id strictly greater than `after`, or the smallest id
    /// overall when `after` is `None`.
    fn next_course_id_after(&self, after: Option<CourseId>) -> Result<Option<CourseId>>;

    fn course_count(&self) -> Result<usize>;

    /// Number of courses with an id strictly less than `course_id`.
    fn courses_before(&self, course_id: CourseId) -> Result<usize>;
}

/// Catalog backed by an ordered map.
#[derive(Default)]
pub struct InMemoryCatalog {
    courses: RwLock<BTreeMap<CourseId, Course>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_courses(courses: impl IntoIterator<Item = Course>) -> Self {
        InMemoryCatalog {
            courses: RwLock::new(courses.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// Add or replace a course.
    pub fn upsert(&self, course: Course) -> Result<()> {
        self.courses.write()?.insert(course.id, course);
        Ok(())
    }

    pub fn remove(&self, course_id: CourseId) -> Result<Option<Course>> {
        Ok(self.courses.write()?.remove(&course_id))
    }
}

impl CourseCatalog for InMemoryCatalog {
    fn get(&self, course_id: CourseId) -> Result<Option<Course>> {
        Ok(self.courses.read()?.get(&course_id).cloned())
    }

    fn next_course_id_after(&self, after: Option<CourseId>) -> Result<Option<CourseId>> {
        let courses = self.courses.read()?;
        let next = match after {
            Some(id) => courses.range((Bound::Excluded(id), Bound::Unbounded)).next(),
            None => courses.iter().next(),
        };
        Ok(next.map(|(&id, _)| id))
    }

    fn course_count(&self) -> Result<usize> {
        Ok(self.courses.read()?.len())
    }

    fn courses_before(&self, course_id: CourseId) -> Result<usize> {
        Ok(self.courses.read()?.range(..course_id).count())
    }
}
