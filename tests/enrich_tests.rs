use std::{cell::Cell, collections::HashMap, fs};

use lntopo_capacity::{
    CacheStore, CapacityEnricher, CapacityError, CapacityResolver, CapacityTable, GraphFormat,
    OverwritePolicy, TopologyEdge, TopologyGraph, add_capacities, codec, merge_capacities, pack,
};
use serde_json::json;
use tempfile::TempDir;

struct StubResolver {
    capacities: HashMap<u64, u64>,
    calls: Cell<usize>,
    fail_after: Option<usize>,
}

impl StubResolver {
    fn new() -> Self {
        let mut capacities = HashMap::new();
        capacities.insert(pack("100x2x0").unwrap(), 500_000);
        capacities.insert(pack("200x5x1").unwrap(), 100_000);
        Self {
            capacities,
            calls: Cell::new(0),
            fail_after: None,
        }
    }

    fn failing_after(calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::new()
        }
    }
}

impl CapacityResolver for StubResolver {
    fn resolve(&self, packed_scid: u64) -> Result<u64, CapacityError> {
        if self.fail_after.is_some_and(|limit| self.calls.get() >= limit) {
            return Err(CapacityError::resolution_failed("stub went away"));
        }
        self.calls.set(self.calls.get() + 1);
        self.capacities
            .get(&packed_scid)
            .copied()
            .ok_or_else(|| CapacityError::resolution_failed(format!("unknown {packed_scid}")))
    }
}

fn two_channel_graph() -> TopologyGraph {
    let mut graph = TopologyGraph::new(true, true);
    for (source, target, scid) in [
        ("A", "B", "100x2x0a"),
        ("B", "A", "100x2x0b"),
        ("A", "C", "200x5x1a"),
        ("C", "A", "200x5x1b"),
    ] {
        graph.add_edge(TopologyEdge::new(source, target).with_attr("scid", json!(scid)));
    }
    graph
}

fn scratch() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

const EXPECTED_STORE: &str = "scid,capacity_sat\n100x2x0,500000\n200x5x1,100000\n";

#[test]
fn test_build_writes_one_row_per_channel() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    let stub = StubResolver::new();
    let report = CapacityEnricher::new(&stub)
        .build(&two_channel_graph(), &store)
        .unwrap();

    assert_eq!(report.edges_visited, 4);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.already_cached, 2);
    assert_eq!(report.total_records, 2);
    assert_eq!(stub.calls.get(), 2);
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_second_build_resolves_nothing() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    let graph = two_channel_graph();
    CapacityEnricher::new(StubResolver::new())
        .build(&graph, &store)
        .unwrap();

    let stub = StubResolver::new();
    let report = CapacityEnricher::new(&stub).build(&graph, &store).unwrap();
    assert_eq!(report.resolved, 0);
    assert_eq!(stub.calls.get(), 0);
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_interrupted_build_resumes() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    let graph = two_channel_graph();

    let err = CapacityEnricher::new(StubResolver::failing_after(1))
        .build(&graph, &store)
        .unwrap_err();
    assert!(matches!(err, CapacityError::ResolutionFailed(_)));
    assert_eq!(CacheStore::load_all(&store).unwrap().len(), 1);

    let stub = StubResolver::new();
    let report = CapacityEnricher::new(&stub).build(&graph, &store).unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.total_records, 2);
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_build_rejects_edge_without_identifier() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    let mut graph = two_channel_graph();
    graph.add_edge(TopologyEdge::new("B", "C"));
    let err = CapacityEnricher::new(StubResolver::new())
        .build(&graph, &store)
        .unwrap_err();
    assert!(matches!(err, CapacityError::MalformedIdentifier(_)));
    // channels before the bad edge were still recorded
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_no_clobber_refuses_populated_store() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    fs::write(&store, "scid,capacity_sat\n100x2x0,500000\n").unwrap();
    let stub = StubResolver::new();
    let err = CapacityEnricher::new(&stub)
        .with_policy(OverwritePolicy::Abort)
        .build(&two_channel_graph(), &store)
        .unwrap_err();
    assert!(matches!(err, CapacityError::DestinationPopulated(_)));
    assert_eq!(stub.calls.get(), 0);
    assert_eq!(
        fs::read_to_string(&store).unwrap(),
        "scid,capacity_sat\n100x2x0,500000\n"
    );
}

#[test]
fn test_no_clobber_allows_fresh_store() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    CapacityEnricher::new(StubResolver::new())
        .with_policy(OverwritePolicy::Abort)
        .build(&two_channel_graph(), &store)
        .unwrap();
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_prompt_policy_follows_confirmation() {
    let dir = scratch();
    let store = dir.path().join("capacities.csv");
    fs::write(&store, "scid,capacity_sat\n100x2x0,500000\n").unwrap();
    let graph = two_channel_graph();

    let declined = CapacityEnricher::new(StubResolver::new())
        .with_policy(OverwritePolicy::Prompt)
        .with_confirm(|_: &str| false)
        .build(&graph, &store);
    assert!(matches!(declined, Err(CapacityError::DestinationPopulated(_))));

    let unanswered = CapacityEnricher::new(StubResolver::new())
        .with_policy(OverwritePolicy::Prompt)
        .build(&graph, &store);
    assert!(matches!(unanswered, Err(CapacityError::DestinationPopulated(_))));

    let report = CapacityEnricher::new(StubResolver::new())
        .with_policy(OverwritePolicy::Prompt)
        .with_confirm(|message: &str| message.contains("capacities.csv"))
        .build(&graph, &store)
        .unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(fs::read_to_string(&store).unwrap(), EXPECTED_STORE);
}

#[test]
fn test_merge_sets_capacity_on_both_directions() {
    let mut graph = two_channel_graph();
    let mut table = CapacityTable::new();
    table.insert("100x2x0".to_string(), 500_000);
    table.insert("200x5x1".to_string(), 100_000);

    let report = merge_capacities(&mut graph, &table).unwrap();
    assert_eq!(report.edges_updated, 4);
    assert_eq!(report.channels, 2);
    let capacities: Vec<_> = graph
        .edges()
        .iter()
        .map(|edge| edge.attributes["capacity"].clone())
        .collect();
    assert_eq!(
        capacities,
        vec![json!(500000), json!(500000), json!(100000), json!(100000)]
    );
    // other attributes survive
    assert_eq!(graph.edges()[1].attributes["scid"], json!("100x2x0b"));
}

#[test]
fn test_merge_missing_channel_leaves_graph_untouched() {
    let mut graph = two_channel_graph();
    let mut table = CapacityTable::new();
    table.insert("100x2x0".to_string(), 500_000);

    let err = merge_capacities(&mut graph, &table).unwrap_err();
    assert_eq!(err, CapacityError::UnresolvedIdentifier("200x5x1".to_string()));
    assert!(graph.edges().iter().all(|e| !e.attributes.contains_key("capacity")));
}

#[test]
fn test_add_capacities_round_trip() {
    let dir = scratch();
    let input = dir.path().join("topology.gml");
    let output = dir.path().join("enriched.gml");
    let store = dir.path().join("capacities.csv");
    codec::save(&two_channel_graph(), &input, GraphFormat::Gml).unwrap();

    CapacityEnricher::new(StubResolver::new())
        .build_from_file(&input, GraphFormat::Gml, &store)
        .unwrap();
    let report = add_capacities(&input, GraphFormat::Gml, &output, &store).unwrap();
    assert_eq!(report.edges_updated, 4);

    let enriched = codec::load(&output, GraphFormat::Gml).unwrap();
    assert_eq!(enriched.edge_count(), 4);
    for edge in enriched.edges() {
        let expected = if edge.channel_id().unwrap().starts_with("100x2x0") {
            500_000
        } else {
            100_000
        };
        assert_eq!(edge.attributes["capacity"], json!(expected));
    }
}

#[test]
fn test_add_capacities_writes_nothing_on_failure() {
    let dir = scratch();
    let input = dir.path().join("topology.gml");
    let output = dir.path().join("enriched.gml");
    let store = dir.path().join("capacities.csv");
    codec::save(&two_channel_graph(), &input, GraphFormat::Gml).unwrap();
    fs::write(&store, "scid,capacity_sat\n100x2x0,500000\n").unwrap();

    let err = add_capacities(&input, GraphFormat::Gml, &output, &store).unwrap_err();
    assert!(matches!(err, CapacityError::UnresolvedIdentifier(_)));
    assert!(!output.exists());
}

#[test]
fn test_add_capacities_requires_store() {
    let dir = scratch();
    let input = dir.path().join("topology.gml");
    codec::save(&two_channel_graph(), &input, GraphFormat::Gml).unwrap();
    let err = add_capacities(
        &input,
        GraphFormat::Gml,
        dir.path().join("out.gml"),
        dir.path().join("missing.csv"),
    )
    .unwrap_err();
    assert!(matches!(err, CapacityError::MissingStore(_)));
}
