use super::MigrationEngine;
use crate::error::{CourseSearchError, Result};
use crate::types::{Course, CourseYearRecord};

impl MigrationEngine<'_> {
    /// Record the year of a newly created course.
    ///
    /// Only acts once year shards are on. While transferring, new courses
    /// have ids above the cursor and are recorded when the split reaches
    /// them.
    pub fn on_course_created(&self, course: &Course) -> Result<()> {
        let mut txn = self.storage.begin()?;
        let state = txn.migration_state()?;
        if !state.is_on() {
            return Ok(());
        }

        let year = self.router().year_for_course(course)?;
        let record = match txn.course_year(course.id)? {
            Some(mut existing) => {
                if !existing.change_year(year) {
                    return Ok(());
                }
                existing
            }
            None => CourseYearRecord::new(course.id, year),
        };
        txn.save_course_year(&record)?;
        txn.commit()?;
        tracing::debug!("[events] Course {} recorded under {}", course.id, year);
        Ok(())
    }

    /// React to a course's start date changing. When its year shard differs
    /// from the recorded one, the old year is marked stale so the redate
    /// process moves its documents.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::NotFound`] when the course's year is determined
    /// but it has no year record.
    pub fn on_course_updated(&self, course: &Course) -> Result<()> {
        let mut txn = self.storage.begin()?;
        let state = txn.migration_state()?;
        let Some(year) = self.router().year_for_tables(&state, Some(course))? else {
            return Ok(());
        };

        let mut record = txn.course_year(course.id)?.ok_or_else(|| {
            CourseSearchError::NotFound(format!("no year record for course {}", course.id))
        })?;
        let previous = record.year;
        if !record.change_year(year) {
            return Ok(());
        }
        txn.save_course_year(&record)?;
        txn.commit()?;
        tracing::info!(
            "[events] Course {} ({}) moved from {} to {}; stale years {:?}",
            course.id,
            course.short_name,
            previous,
            year,
            record.stale_years
        );
        Ok(())
    }
}
