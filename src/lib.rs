//! Channel capacity enrichment for Lightning Network topology graphs.
//!
//! `build` resolves the capacity of every channel in a graph into a resumable
//! `scid,capacity_sat` store; `merge` writes those capacities back onto both
//! directed edges of each channel.

pub mod cli;
pub mod codec;
pub mod enrich;
pub mod errors;
pub mod resolver;
pub mod scid;
pub mod store;
pub mod topology;

pub use crate::codec::{GraphCodec, GraphFormat};
pub use crate::enrich::{
    BuildReport, CapacityEnricher, Confirm, MergeReport, OverwritePolicy, add_capacities,
    merge_capacities,
};
pub use crate::errors::CapacityError;
pub use crate::resolver::{CapacityResolver, HttpResolver};
pub use crate::scid::{UndirectedScid, canonicalize, pack};
pub use crate::store::{CacheStore, CapacityTable};
pub use crate::topology::{Attributes, TopologyEdge, TopologyGraph, TopologyNode};
