//! Durable stores: the dual SQLite/Postgres backend, the search log
//! (dedup store), the staging store, and the error journal.

pub mod backend;
pub mod error_log;
pub mod migrate;
pub mod search_log;
pub mod staging;

pub use backend::{Database, Dialect, Result, SqlRow, SqlValue, StoreError};
pub use error_log::{ErrorEntry, ErrorLog, ErrorSummary};
pub use migrate::{migrate, MigrationReport};
pub use search_log::{SearchLog, SearchLogStats};
pub use staging::{FindingStatus, StagedFinding, StagingStore, StagingSummary};
