//! Log storage and retrieval.
//!
//! # Data Flow
//! ```text
//! POST /logger  → record JSON (id stripped) → store.rs append(system, today)
//! GET  /logger  → query.rs (validate) → store.rs read → LogPage (search, slice)
//!               → signing/ (signed, compressed response)
//! ```

pub mod query;
pub mod store;

pub use query::{LogPage, LogQuery};
pub use store::{DateBucket, FsLogStore, LogStore, LogStoreError, LogSystem};
