//! Document store abstraction for the preprint review engine
//!
//! The engine runs against a key/value document store with optimistic
//! revisions: every write names the revision it is based on, stale writes
//! fail with a conflict, and replicated deployments may briefly hold
//! several divergent leaves per document. This crate defines that contract
//! ([`DocumentStore`]) plus the in-memory reference backend and the bounded
//! retry helper shared by the index fold and the rescore sweep.
//!
//! Backends are replaceable; anything with compare-and-swap per document
//! can host the engine. No cross-document transactions are assumed beyond
//! the single-batch atomicity of [`DocumentStore::bulk`].

pub mod error;
pub mod memory;
pub mod retry;
pub mod revision;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use retry::{with_retry, RetryPolicy};
pub use revision::Revision;
pub use traits::{BulkWrite, Document, DocumentStore};
