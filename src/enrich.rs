//! Build and merge passes over a topology graph.

use std::{fmt, path::Path};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    codec::{self, GraphFormat},
    errors::CapacityError,
    resolver::CapacityResolver,
    scid::{canonicalize, pack},
    store::{CacheStore, CapacityTable},
    topology::{CAPACITY_ATTR, TopologyGraph},
};

/// What to do when the build target already holds records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Refuse to touch a populated store.
    Abort,
    /// Ask the injected [`Confirm`] capability.
    Prompt,
    /// Extend the existing store.
    #[default]
    Force,
}

pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub edges_visited: usize,
    pub resolved: usize,
    pub already_cached: usize,
    pub total_records: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub edges_updated: usize,
    pub channels: usize,
}

pub struct CapacityEnricher<R> {
    resolver: R,
    policy: OverwritePolicy,
    confirm: Option<Box<dyn Confirm>>,
}

impl<R> fmt::Debug for CapacityEnricher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityEnricher")
            .field("policy", &self.policy)
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

impl<R: CapacityResolver> CapacityEnricher<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            policy: OverwritePolicy::default(),
            confirm: None,
        }
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_confirm<C: Confirm + 'static>(mut self, confirm: C) -> Self {
        self.confirm = Some(Box::new(confirm));
        self
    }

    /// Resolves every channel of `graph` missing from the store at `store_path`.
    ///
    /// Records are appended one at a time, so a failure part way through keeps
    /// everything resolved so far.
    pub fn build<P: AsRef<Path>>(
        &self,
        graph: &TopologyGraph,
        store_path: P,
    ) -> Result<BuildReport, CapacityError> {
        let store_path = store_path.as_ref();
        self.check_overwrite(store_path)?;
        let store = CacheStore::open_or_create(store_path)?;
        info!(
            store = %store_path.display(),
            cached = store.len(),
            edges = graph.edge_count(),
            "building capacity store"
        );

        let mut report = BuildReport::default();
        for edge in graph.edges() {
            report.edges_visited += 1;
            let undirected = canonicalize(edge.channel_id()?)?;
            if store.contains(&undirected) {
                report.already_cached += 1;
                continue;
            }
            let packed = pack(&undirected)?;
            let capacity = self.resolver.resolve(packed)?;
            store.append(&undirected, capacity)?;
            report.resolved += 1;
            debug!(scid = %undirected, packed, capacity, "resolved channel capacity");
        }
        report.total_records = store.len();
        info!(
            resolved = report.resolved,
            cached = report.already_cached,
            records = report.total_records,
            "capacity store up to date"
        );
        Ok(report)
    }

    /// Loads `input`, then builds the store at `store_path` from it.
    pub fn build_from_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        format: GraphFormat,
        store_path: Q,
    ) -> Result<BuildReport, CapacityError> {
        let graph = codec::load(input, format)?;
        self.build(&graph, store_path)
    }

    fn check_overwrite(&self, store_path: &Path) -> Result<(), CapacityError> {
        if !CacheStore::is_populated(store_path) {
            return Ok(());
        }
        let target = store_path.display().to_string();
        match self.policy {
            OverwritePolicy::Force => {
                warn!(store = %target, "extending existing capacity store");
                Ok(())
            }
            OverwritePolicy::Abort => Err(CapacityError::populated(target)),
            OverwritePolicy::Prompt => {
                let message = format!("WARNING: overwriting file {target}");
                match &self.confirm {
                    Some(confirm) if confirm.confirm(&message) => Ok(()),
                    _ => Err(CapacityError::populated(format!("{target} (declined)"))),
                }
            }
        }
    }
}

/// Writes the capacity of each edge's channel onto the edge.
///
/// Every edge is checked before any is modified, so a missing channel leaves
/// the graph untouched.
pub fn merge_capacities(
    graph: &mut TopologyGraph,
    capacities: &CapacityTable,
) -> Result<MergeReport, CapacityError> {
    let mut resolved = Vec::with_capacity(graph.edge_count());
    for edge in graph.edges() {
        let undirected = canonicalize(edge.channel_id()?)?;
        let capacity = capacities
            .get(&undirected)
            .copied()
            .ok_or_else(|| CapacityError::unresolved(undirected.clone()))?;
        resolved.push((undirected, capacity));
    }

    let mut channels = ahash::AHashSet::with_capacity(resolved.len());
    for (edge, (undirected, capacity)) in graph.edges_mut().zip(resolved) {
        edge.attributes.insert(CAPACITY_ATTR.into(), capacity.into());
        channels.insert(undirected);
    }
    Ok(MergeReport {
        edges_updated: graph.edge_count(),
        channels: channels.len(),
    })
}

/// Merges the store at `capacities_path` into `input` and writes `output`.
///
/// Nothing is written unless every edge resolved.
pub fn add_capacities<P, Q, S>(
    input: P,
    format: GraphFormat,
    output: Q,
    capacities_path: S,
) -> Result<MergeReport, CapacityError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    S: AsRef<Path>,
{
    let capacities = CacheStore::load_all(capacities_path)?;
    let mut graph = codec::load(input.as_ref(), format)?;
    let report = merge_capacities(&mut graph, &capacities)?;
    codec::save(&graph, output.as_ref(), format)?;
    info!(
        output = %output.as_ref().display(),
        edges = report.edges_updated,
        channels = report.channels,
        "wrote enriched graph"
    );
    Ok(report)
}
