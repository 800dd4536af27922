//! tally-core: per-user scan aggregates with incremental uniqueness tracking.
//!
//! Users scan codes; each scan carries a score and an optional location
//! fingerprint. This crate keeps every user's derived statistics (total
//! score, scan count, best-scoring code, best *unique* code) consistent as
//! individual scan records are created and deleted, without ever re-scanning
//! the full dataset.
//!
//! The moving parts, leaves first:
//!
//! - [`store`] — SQLite-backed document store with immediate transactions
//!   and bounded busy-retry.
//! - [`lookup`] — reverse owner lookup by (score, location) narrowing, since
//!   the store has no direct code → owner query.
//! - [`resolve`] — full recompute of a user's best unique code, chunking
//!   metadata fetches into batches of [`resolve::METADATA_BATCH`].
//! - [`protocol`] — the aggregate update protocol invoked on scan create and
//!   delete; the central component.
//! - [`rank`] — peripheral leaderboard batch job.
//! - [`verify`] — ground-truth invariant checker for tooling and tests.
//!
//! # Consistency model
//!
//! The acting user's aggregate, the scan record, and the code's shared
//! counter commit in one transaction. When a create or delete flips a code
//! between unique and shared, the *other* affected user's best-unique
//! recompute runs as a second, separate transaction: a best-effort
//! compensating step that is retried on failure but never rolls back the
//! first commit. Readers may briefly observe a code with `num_scanned == 2`
//! before either holder's best-unique reflects the demotion.

pub mod config;
pub mod error;
pub mod event;
pub mod lookup;
pub mod model;
pub mod protocol;
pub mod rank;
pub mod resolve;
pub mod store;
pub mod verify;

pub use error::StoreError;
pub use event::{ScanEvent, ScanEventKind};
pub use model::{BestItem, CodeMetadata, Ranks, ScanRecord, UserAggregate};
pub use protocol::{Applied, SideEffectStatus};
pub use store::Store;
