use curricula_core::{analyze, CurriculumDraft, Node};

fn node(id: &str, minutes: f64, prereqs: &[&str]) -> Node {
    Node::new(id, format!("Node {id}"), format!("Explain {id}"))
        .with_estimate(minutes)
        .with_prerequisites(prereqs.iter().copied())
}

fn chain(nodes: Vec<Node>) -> CurriculumDraft {
    CurriculumDraft::new("graphs", nodes)
}

#[test]
fn mutual_prerequisite_is_reported_as_cycle() {
    let draft = chain(vec![node("A", 30.0, &["B"]), node("B", 30.0, &["A"])]);
    let view = analyze(&draft);

    assert!(view.cycles.cycles_detected);
    assert!(!view.is_acyclic());
    assert_eq!(
        view.cycles.unvisited.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
    assert!(view.layers.is_empty());
    assert!(view.critical_path.is_none());
}

#[test]
fn chain_critical_path_sums_estimates() {
    let draft = chain(vec![node("A", 30.0, &[]), node("B", 45.0, &["A"]), node("C", 60.0, &["B"])]);
    let view = analyze(&draft);

    let path = view.critical_path.as_ref().expect("acyclic chain has a critical path");
    assert_eq!(path.nodes, vec!["A", "B", "C"]);
    assert_eq!(path.total_minutes, 135.0);
    assert_eq!(view.topological_order, vec!["A", "B", "C"]);
    assert_eq!(view.max_depth(), 2);
}

#[test]
fn critical_path_weight_is_max_distance() {
    let draft = chain(vec![
        node("A", 20.0, &[]),
        node("B", 90.0, &[]),
        node("C", 30.0, &["A", "B"]),
        node("D", 15.0, &["A"]),
        node("E", 25.0, &["C", "D"]),
    ]);
    let view = analyze(&draft);

    let path = view.critical_path.expect("critical path");
    let max_distance = view.distances.values().copied().fold(0.0_f64, f64::max);
    assert_eq!(path.total_minutes, max_distance);
    assert_eq!(path.nodes, vec!["B", "C", "E"]);
    assert_eq!(path.total_minutes, 145.0);
}

#[test]
fn every_edge_goes_to_a_deeper_layer() {
    let draft = chain(vec![
        node("intro", 20.0, &[]),
        node("hashing", 30.0, &["intro"]),
        node("eviction", 40.0, &["intro"]),
        node("lru", 45.0, &["eviction", "hashing"]),
        node("ttl", 25.0, &["eviction"]),
        node("capstone", 60.0, &["lru", "ttl"]),
    ]);
    let view = analyze(&draft);
    assert!(view.is_acyclic());

    for node in &draft.nodes {
        let layer = view.layer(&node.id).expect("every node is layered");
        for prereq in &node.prerequisites {
            let prereq_layer = view.layer(prereq).expect("prerequisite is layered");
            assert!(
                prereq_layer < layer,
                "{prereq} (layer {prereq_layer}) should precede {} (layer {layer})",
                node.id
            );
        }
    }

    let layers: Vec<usize> = view.milestones.iter().map(|m| m.layer).collect();
    assert_eq!(layers, vec![0, 1, 2, 3]);
    assert_eq!(view.milestones[1].node_ids, vec!["eviction", "hashing"]);
}

#[test]
fn descendants_exclude_unrelated_branches() {
    let draft = chain(vec![
        node("A", 20.0, &[]),
        node("B", 20.0, &["A"]),
        node("C", 20.0, &["B"]),
        node("D", 20.0, &[]),
    ]);
    let view = analyze(&draft);

    let below_a: Vec<String> = view.descendants("A").into_iter().collect();
    assert_eq!(below_a, vec!["B", "C"]);
    assert!(view.descendants("D").is_empty());
    assert_eq!(view.roots(), vec!["A", "D"]);
}

#[test]
fn analysis_is_deterministic() {
    let draft = chain(vec![node("b", 10.0, &[]), node("a", 10.0, &[]), node("c", 10.0, &["a", "b"])]);
    assert_eq!(analyze(&draft), analyze(&draft));
    assert_eq!(analyze(&draft).topological_order, vec!["a", "b", "c"]);
}
