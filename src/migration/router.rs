use crate::catalog::CourseCatalog;
use crate::error::{CourseSearchError, Result};
use crate::index::settings::SearchSettings;
use crate::index::storage::Transaction;
use crate::migration::state::{MigrationMode, MigrationState};
use crate::types::{Course, CourseId, Shard};
use chrono::{Datelike, TimeZone, Utc};

/// Decides which shard a document lives in for the current migration state.
///
/// The router is stateless; the caller passes the [`MigrationState`] and the
/// open transaction it was read from so every decision in one operation sees
/// the same state.
#[derive(Clone, Copy)]
pub struct ShardRouter<'a> {
    settings: &'a SearchSettings,
    catalog: &'a dyn CourseCatalog,
}

impl<'a> ShardRouter<'a> {
    pub fn new(settings: &'a SearchSettings, catalog: &'a dyn CourseCatalog) -> Self {
        ShardRouter { settings, catalog }
    }

    /// Calendar year (UTC) of the course start date, clamped up to the
    /// oldest year shard.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::FutureYear`] when the course starts after the
    /// last year that has a shard.
    pub fn year_for_course(&self, course: &Course) -> Result<i32> {
        let started = Utc
            .timestamp_opt(course.start_date, 0)
            .single()
            .ok_or_else(|| {
                CourseSearchError::InvalidState(format!(
                    "course {} has an unrepresentable start date {}",
                    course.id, course.start_date
                ))
            })?;
        let year = started.year().max(self.settings.min_year);
        if year > self.settings.max_year {
            return Err(CourseSearchError::FutureYear {
                course_id: course.id,
                year,
                max_year: self.settings.max_year,
            });
        }
        if year == self.settings.max_year {
            tracing::warn!(
                "[router] Course {} ({}) uses the last year shard {}; extend maxYear",
                course.id,
                course.short_name,
                year
            );
        }
        Ok(year)
    }

    /// Year whose shard holds documents for `course` (or for course-less
    /// documents when `None`), or `None` while they still belong in the
    /// unpartitioned shard.
    pub fn year_for_tables(&self, state: &MigrationState, course: Option<&Course>) -> Result<Option<i32>> {
        match state.mode {
            MigrationMode::Off => Ok(None),
            MigrationMode::Transferring => match (course, state.transferring_course_id) {
                (None, Some(_)) => Ok(Some(self.settings.non_course_year)),
                (None, None) => Ok(None),
                (Some(course), Some(cursor)) if course.id < cursor => {
                    self.year_for_course(course).map(Some)
                }
                (Some(_), _) => Ok(None),
            },
            MigrationMode::On => match course {
                None => Ok(Some(self.settings.non_course_year)),
                Some(course) => self.year_for_course(course).map(Some),
            },
        }
    }

    /// Where new and updated documents for this course are written.
    pub fn home_shard(
        &self,
        txn: &mut dyn Transaction,
        state: &MigrationState,
        course_id: Option<CourseId>,
    ) -> Result<Shard> {
        let cursor = state.transferring_course_id;
        let shard = match (state.mode, course_id) {
            (MigrationMode::Off, _) => Shard::Unpartitioned,
            (MigrationMode::Transferring, None) if cursor.is_some() => {
                Shard::Year(self.settings.non_course_year)
            }
            (MigrationMode::Transferring, None) => Shard::Unpartitioned,
            (MigrationMode::Transferring, Some(id)) => match cursor {
                Some(cursor) if id < cursor => Shard::Year(self.recorded_year(txn, id)?),
                _ => Shard::Unpartitioned,
            },
            (MigrationMode::On, None) => Shard::Year(self.settings.non_course_year),
            (MigrationMode::On, Some(id)) => Shard::Year(self.recorded_year(txn, id)?),
        };
        Ok(shard)
    }

    /// Year shard the running split is filling for this course, when the
    /// split cursor is on it.
    pub fn split_target(&self, state: &MigrationState, course_id: Option<CourseId>) -> Result<Option<Shard>> {
        if !state.is_transferring() {
            return Ok(None);
        }
        match (course_id, state.transferring_course_id) {
            (None, None) => Ok(Some(Shard::Year(self.settings.non_course_year))),
            (Some(id), Some(cursor)) if id == cursor => Ok(self.catalog_year(id)?.map(Shard::Year)),
            _ => Ok(None),
        }
    }

    /// Every shard that may currently hold documents of this course: the home
    /// shard, the target of an in-progress split, and years still pending
    /// redate.
    pub fn document_shards(
        &self,
        txn: &mut dyn Transaction,
        state: &MigrationState,
        course_id: Option<CourseId>,
    ) -> Result<Vec<Shard>> {
        let mut shards = vec![self.home_shard(txn, state, course_id)?];

        if let Some(target) = self.split_target(state, course_id)? {
            shards.push(target);
        }

        let home_is_year = matches!(shards[0], Shard::Year(_));
        if let (Some(id), true) = (course_id, home_is_year) {
            if let Some(record) = txn.course_year(id)? {
                shards.extend(record.stale_years.iter().map(|&y| Shard::Year(y)));
            }
        }

        shards.sort();
        shards.dedup();
        Ok(shards)
    }

    /// Shards a search has to read. `course_ids` is the course restriction of
    /// the search scope, `None` for site-wide searches.
    pub fn search_shards(
        &self,
        txn: &mut dyn Transaction,
        state: &MigrationState,
        course_ids: Option<&[CourseId]>,
    ) -> Result<Vec<Shard>> {
        let mut shards = match course_ids {
            Some(ids) => {
                let mut shards = Vec::new();
                for &id in ids {
                    shards.extend(self.document_shards(txn, state, Some(id))?);
                }
                shards
            }
            None => {
                let years = self.settings.years().map(Shard::Year);
                match state.mode {
                    MigrationMode::Off => vec![Shard::Unpartitioned],
                    MigrationMode::Transferring => {
                        std::iter::once(Shard::Unpartitioned).chain(years).collect()
                    }
                    MigrationMode::On => years.collect(),
                }
            }
        };
        shards.sort();
        shards.dedup();
        Ok(shards)
    }

    /// All shards any document can be in, regardless of state.
    pub fn all_shards(&self) -> Vec<Shard> {
        std::iter::once(Shard::Unpartitioned)
            .chain(self.settings.years().map(Shard::Year))
            .collect()
    }

    /// Year from the course's year record, falling back to its start date.
    fn recorded_year(&self, txn: &mut dyn Transaction, course_id: CourseId) -> Result<i32> {
        if let Some(record) = txn.course_year(course_id)? {
            return Ok(record.year);
        }
        match self.catalog_year(course_id)? {
            Some(year) => Ok(year),
            None => {
                tracing::warn!(
                    "[router] Course {} is not in the catalog; using year {}",
                    course_id,
                    self.settings.non_course_year
                );
                Ok(self.settings.non_course_year)
            }
        }
    }

    fn catalog_year(&self, course_id: CourseId) -> Result<Option<i32>> {
        match self.catalog.get(course_id)? {
            Some(course) => self.year_for_course(&course).map(Some),
            None => Ok(None),
        }
    }
}
