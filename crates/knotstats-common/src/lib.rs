//! Shared model for resolver statistics relayed by knotstats.
//!
//! The resolver owns its statistics schema, so snapshots are kept as raw JSON
//! maps. The only structure imposed here is the top-level shape: either one
//! flat map of dotted metric names, or one map per resolver instance.

pub mod aggregate;
pub mod error;
pub mod snapshot;

pub use aggregate::aggregate;
pub use error::Error;
pub use snapshot::{Selection, Shape, StatsMap, StatsSnapshot};

pub type Result<T> = std::result::Result<T, Error>;
