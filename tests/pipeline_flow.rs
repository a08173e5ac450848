use indexmap::IndexSet;

use pipeview::contract::contract;
use pipeview::normalize::{normalize, parse_document, RawDocument};
use pipeview::run_status::{correlate, RunStatusFeed};
use pipeview::view::PipelineView;
use pipeview::visibility::{resolve_disabled, FilterState};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

const DOCUMENT: &str = r#"{
    "nodes": [
        {"id": "A", "name": "Ingest", "type": "task", "tags": ["etl"]},
        {"id": "B", "name": "Split", "type": "task", "tags": ["etl"],
         "modular_pipelines": ["Clean"]},
        {"id": "C", "name": "Impute", "type": "task",
         "modular_pipelines": ["Clean"]},
        {"id": "D", "name": "Model input", "type": "data", "layer": "primary"}
    ],
    "edges": [
        {"source": "A", "target": "B"},
        {"source": "B", "target": "C"},
        {"source": "C", "target": "D"}
    ],
    "tags": [{"id": "etl", "name": "ETL"}],
    "layers": ["raw", "primary"],
    "pipelines": [{"id": "__default__", "name": "Default"}],
    "modular_pipelines": {
        "Clean": {"name": "Clean", "children": ["B", "C"]}
    }
}"#;

#[test]
fn document_round_trip_through_the_whole_core() {
    init_logs();
    let state = parse_document(DOCUMENT).unwrap();
    assert_eq!(state.nodes.len(), 4);
    assert_eq!(state.edges.len(), 3);
    assert_eq!(state.layers.len(), 2);
    assert_eq!(state.active_pipeline.as_deref(), Some("__default__"));
    assert!(state.integrity_errors().is_empty());

    let mut view = PipelineView::new(state, false).unwrap();
    let graph = view.contracted();
    let ids: Vec<&str> = graph.nodes.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["A", "Clean", "D"]);
    let pairs: Vec<(&str, &str)> = graph
        .edges
        .values()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(pairs, vec![("A", "Clean"), ("Clean", "D")]);

    view.set_namespace_expanded("Clean", true);
    assert_eq!(view.contracted().nodes.len(), 4);
    assert_eq!(view.contracted().edges.len(), 3);
}

#[test]
fn shuffled_document_normalizes_to_the_same_state() {
    let baseline = parse_document(DOCUMENT).unwrap();

    let mut doc: RawDocument = serde_json::from_str(DOCUMENT).unwrap();
    doc.nodes.as_mut().unwrap().reverse();
    doc.edges.as_mut().unwrap().reverse();
    let shuffled = normalize(&doc).unwrap();

    assert_eq!(baseline.nodes, shuffled.nodes);
    assert_eq!(baseline.edges, shuffled.edges);
    assert_eq!(baseline.tags, shuffled.tags);
    assert_eq!(baseline.layers, shuffled.layers);
}

#[test]
fn re_ingesting_the_same_document_is_idempotent() {
    let first = parse_document(DOCUMENT).unwrap();
    let second = parse_document(DOCUMENT).unwrap();
    assert_eq!(first, second);
}

#[test]
fn every_collapse_set_keeps_the_graph_acyclic_and_smaller() {
    init_logs();
    let state = parse_document(DOCUMENT).unwrap();
    let collapse_sets: [&[&str]; 4] = [&[], &["Clean"], &["Clean", "Other"], &["Other"]];
    for set in collapse_sets {
        let collapsed: IndexSet<String> = set.iter().map(|s| s.to_string()).collect();
        let graph = contract(&state, &collapsed);
        assert!(graph.nodes.len() <= state.nodes.len());
        assert!(graph.edges.len() <= state.edges.len());
        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), graph.nodes.len());
    }
}

#[test]
fn edge_disablement_always_cascades_from_endpoints() {
    let state = parse_document(DOCUMENT).unwrap();
    let filter_states = [
        FilterState::default(),
        FilterState {
            enabled_tags: ["etl".to_string()].into_iter().collect(),
            ..FilterState::default()
        },
        FilterState {
            focus: Some("Clean".to_string()),
            ..FilterState::default()
        },
    ];
    for filters in filter_states {
        let flags = resolve_disabled(&state, &filters);
        for edge in state.edges.values() {
            assert_eq!(
                flags.edges[&edge.id],
                flags.nodes[&edge.source] || flags.nodes[&edge.target],
                "cascade violated for {}",
                edge.id
            );
        }
    }
}

#[test]
fn untagged_nodes_disappear_under_any_tag_filter() {
    let state = parse_document(DOCUMENT).unwrap();
    let filters = FilterState {
        enabled_tags: ["etl".to_string()].into_iter().collect(),
        ..FilterState::default()
    };
    let flags = resolve_disabled(&state, &filters);
    assert!(!flags.nodes["A"]);
    assert!(flags.nodes["C"], "node without tags must be disabled");
    assert!(flags.nodes["D"]);
}

#[test]
fn run_status_feed_partitions_completely() {
    let feed = RunStatusFeed::parse(
        r#"{
            "nodes": {
                "A": {"status": "success", "duration": 0.3},
                "B": {"status": "failed", "duration": 1.2, "error": "stage failed"}
            },
            "datasets": {
                "D": {"status": "success", "duration": 0.1}
            },
            "pipeline": {"run_id": "2026-08-07T10.00.00Z", "status": "failed"}
        }"#,
    )
    .unwrap();

    let summary = correlate(feed);
    assert!(summary.has_real_run());
    assert_eq!(summary.nodes.len(), 2);
    assert_eq!(summary.datasets.len(), 1);
    assert!(summary.nodes.success.contains_key("A"));
    assert!(summary.nodes.failed.contains_key("B"));
    assert!(summary.datasets.success.contains_key("D"));

    // Ids the graph has never seen stay in the summary untouched.
    assert!(!parse_document(DOCUMENT)
        .unwrap()
        .nodes
        .contains_key("ghost"));
    let feed = RunStatusFeed::parse(
        r#"{"nodes": {"ghost": {"status": "success"}}, "datasets": {},
            "pipeline": {"run_id": "default-run-id"}}"#,
    )
    .unwrap();
    let summary = correlate(feed);
    assert!(summary.nodes.success.contains_key("ghost"));
    assert!(!summary.has_real_run());
}
