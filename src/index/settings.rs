use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Tunables for search and migration.
///
/// Persisted as camelCase JSON; missing fields fall back to defaults so old
/// files keep loading after new settings are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchSettings {
    /// Ceiling on distinct positive words a single query may probe.
    pub max_terms: usize,

    /// Wall-clock budget for one run of the split loop.
    pub split_time_budget_secs: u64,

    /// Wall-clock budget for one run of the redate loop.
    pub redate_time_budget_secs: u64,

    pub split_chunk_size: usize,

    pub redate_chunk_size: usize,

    /// Courses starting earlier than this are filed under it.
    pub min_year: i32,

    /// Last year with a shard. Courses starting later are rejected.
    pub max_year: i32,

    /// Shard for documents that belong to no course.
    pub non_course_year: i32,

    /// Snippet window, in words.
    pub summary_length: usize,

    /// Most raw rows fetched in one pagination round.
    pub max_db_request: usize,

    pub scheduler_interval_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            max_terms: 20,
            split_time_budget_secs: 600,
            redate_time_budget_secs: 600,
            split_chunk_size: 1000,
            redate_chunk_size: 1000,
            min_year: 2011,
            max_year: 2020,
            non_course_year: 2011,
            summary_length: 50,
            max_db_request: 1000,
            scheduler_interval_secs: 60,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl SearchSettings {
    /// Defaults overridden by `COURSESEARCH_*` environment variables.
    pub fn from_env() -> Self {
        let d = SearchSettings::default();
        SearchSettings {
            max_terms: env_or("COURSESEARCH_MAX_TERMS", d.max_terms),
            split_time_budget_secs: env_or(
                "COURSESEARCH_SPLIT_TIME_BUDGET_SECS",
                d.split_time_budget_secs,
            ),
            redate_time_budget_secs: env_or(
                "COURSESEARCH_REDATE_TIME_BUDGET_SECS",
                d.redate_time_budget_secs,
            ),
            split_chunk_size: env_or("COURSESEARCH_SPLIT_CHUNK_SIZE", d.split_chunk_size),
            redate_chunk_size: env_or("COURSESEARCH_REDATE_CHUNK_SIZE", d.redate_chunk_size),
            min_year: env_or("COURSESEARCH_MIN_YEAR", d.min_year),
            max_year: env_or("COURSESEARCH_MAX_YEAR", d.max_year),
            non_course_year: env_or("COURSESEARCH_NON_COURSE_YEAR", d.non_course_year),
            summary_length: env_or("COURSESEARCH_SUMMARY_LENGTH", d.summary_length),
            max_db_request: env_or("COURSESEARCH_MAX_DB_REQUEST", d.max_db_request),
            scheduler_interval_secs: env_or(
                "COURSESEARCH_SCHEDULER_INTERVAL_SECS",
                d.scheduler_interval_secs,
            ),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: SearchSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CourseSearchError;

        if self.min_year > self.max_year {
            return Err(CourseSearchError::Config(format!(
                "minYear {} is after maxYear {}",
                self.min_year, self.max_year
            )));
        }
        if !(self.min_year..=self.max_year).contains(&self.non_course_year) {
            return Err(CourseSearchError::Config(format!(
                "nonCourseYear {} outside {}..={}",
                self.non_course_year, self.min_year, self.max_year
            )));
        }
        if self.split_chunk_size == 0 || self.redate_chunk_size == 0 {
            return Err(CourseSearchError::Config(
                "chunk sizes must be at least 1".to_string(),
            ));
        }
        if self.max_db_request == 0 || self.summary_length == 0 {
            return Err(CourseSearchError::Config(
                "maxDbRequest and summaryLength must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn split_time_budget(&self) -> Duration {
        Duration::from_secs(self.split_time_budget_secs)
    }

    pub fn redate_time_budget(&self) -> Duration {
        Duration::from_secs(self.redate_time_budget_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    /// Every year that has a shard, oldest first.
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.min_year..=self.max_year
    }
}
