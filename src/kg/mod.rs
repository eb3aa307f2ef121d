//! Knowledge graph layer
//!
//! Label registry, the four triple cross-indices with cascading delete,
//! bulk loading and a read-only adapter, all working through a
//! [`Connection`](crate::persistence::Connection) and its transaction.

pub mod adapter;
pub mod error;
pub mod index;
pub mod labels;
pub mod loader;
pub mod triples;

pub use adapter::{KgAdapter, LabelView, ReadIndex, TripleView};
pub use error::{KgError, KgResult};
pub use index::{MergeMode, MergeOutcome, NestedIndex};
pub use labels::{LabelStatus, LabelRegistry};
pub use loader::{BulkLoader, ExternalGraph, LoadSummary};
pub use triples::{RemovalSummary, TripleStore};
