use crate::types::CourseId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Everything lives in the unpartitioned shard.
    #[default]
    Off,
    /// The split cursor is walking the course catalog.
    Transferring,
    /// Every document lives in its course's year shard. Terminal.
    On,
}

/// Persisted migration progress.
///
/// Loaded from storage at the start of each migration step and written back
/// in the same transaction as the data it describes, so a crash never leaves
/// the cursor ahead of the moved rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    pub mode: MigrationMode,
    /// `None` while the course-less documents are being split.
    pub transferring_course_id: Option<CourseId>,
    /// Checkpoint inside the course currently being split.
    pub done_up_to: Option<i64>,
}

impl MigrationState {
    pub fn is_transferring(&self) -> bool {
        self.mode == MigrationMode::Transferring
    }

    pub fn is_on(&self) -> bool {
        self.mode == MigrationMode::On
    }

    /// Move the cursor to the next course with a fresh checkpoint.
    pub fn advance_to(&mut self, course_id: CourseId) {
        self.transferring_course_id = Some(course_id);
        self.done_up_to = None;
    }

    pub fn finish(&mut self) {
        self.mode = MigrationMode::On;
        self.transferring_course_id = None;
        self.done_up_to = None;
    }
}
