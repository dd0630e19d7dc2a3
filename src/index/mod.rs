//! Write path and persistence: storage seam, in-memory backend, settings,
//! the index writer and the [`manager::SearchIndex`] facade.

pub mod manager;
pub mod memory;
pub mod settings;
pub mod storage;
pub mod writer;

pub use manager::SearchIndex;
pub use settings::SearchSettings;
pub use storage::{Storage, Transaction};
pub use writer::{DeleteOutcome, DocumentScope, DocumentUpdate, IndexWriter};
