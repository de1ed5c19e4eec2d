//! Repositories and services of the preprint review engine
//!
//! Everything between the domain core and a deployment: typed repositories
//! over the document stores, the action dispatcher and its handlers, the
//! conflict-aware index fold, the periodic rescore sweep, and the search
//! projection consumed by read paths.
//!
//! The write path is `ActionService::post`: validate, authorize, persist,
//! then fold review/request actions into the preprint index. The fold and
//! the sweep share one concurrency discipline - optimistic reads, bounded
//! retries, losers merged forward and tombstoned - so concurrent writers
//! converge instead of corrupting each other.

pub mod db;
pub mod repos;
pub mod rescorer;
pub mod search;
pub mod services;
pub mod sync;

pub use db::{Database, MemoryStores};
pub use rescorer::{RescoreOutcome, Rescorer};
pub use search::{ActionProjection, FacetCounts, PreprintPage, PreprintQuery, PreprintSort, SearchService};
pub use services::{ActionService, AclResolver, Context, NullResolver, PostOutcome, PreprintResolver, StaticResolver};
pub use sync::IndexSynchronizer;
