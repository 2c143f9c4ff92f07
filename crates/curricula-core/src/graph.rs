//! Deterministic prerequisite-graph analysis.
//!
//! An edge `p → n` means "`n` lists `p` as a prerequisite". Topological order
//! is computed with Kahn's algorithm over an ordered ready set, so ties among
//! zero-indegree nodes always resolve to the lexicographically smallest id.
//!
//! A cycle is a normal outcome: the unvisited remainder and the nodes that
//! actually sit on a cycle are reported, and the layer / critical-path /
//! milestone views are left empty.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::curriculum::CurriculumDraft;

/// Cycle detection outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycles_detected: bool,
    /// Nodes Kahn's algorithm could not visit. They sit on, or downstream of,
    /// at least one cycle.
    pub unvisited: BTreeSet<String>,
    /// Subset of `unvisited` that is its own transitive prerequisite.
    /// Rewiring one of these is what breaks a cycle.
    #[serde(default)]
    pub on_cycle: BTreeSet<String>,
}

/// Longest estimate-weighted path through the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    /// Root first.
    pub nodes: Vec<String>,
    pub total_minutes: f64,
}

/// All nodes sharing one layer value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub layer: usize,
    pub node_ids: Vec<String>,
}

/// Derived view of a draft. Never persisted as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    /// Visited nodes in Kahn order. Complete only when acyclic.
    pub topological_order: Vec<String>,
    /// Empty when a cycle was detected.
    pub layers: BTreeMap<String, usize>,
    pub dependents: BTreeMap<String, BTreeSet<String>>,
    /// Known prerequisites per node, deduplicated, in declared order.
    pub prerequisites: BTreeMap<String, Vec<String>>,
    /// Longest-path distance per node. Empty when a cycle was detected.
    pub distances: BTreeMap<String, f64>,
    pub critical_path: Option<CriticalPath>,
    pub cycles: CycleReport,
    pub milestones: Vec<Milestone>,
}

impl GraphView {
    pub fn is_acyclic(&self) -> bool {
        !self.cycles.cycles_detected
    }

    pub fn layer(&self, node_id: &str) -> Option<usize> {
        self.layers.get(node_id).copied()
    }

    /// Deepest layer, or 0 for an empty or cyclic graph.
    pub fn max_depth(&self) -> usize {
        self.layers.values().copied().max().unwrap_or(0)
    }

    /// Nodes with no known prerequisites, ascending.
    pub fn roots(&self) -> Vec<&str> {
        self.prerequisites
            .iter()
            .filter(|(_, prereqs)| prereqs.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Transitive prerequisites of `node_id` (excluding itself unless it sits
    /// on a cycle).
    pub fn ancestors(&self, node_id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(node_id);
        while let Some(current) = queue.pop_front() {
            for prereq in self.prerequisites.get(current).into_iter().flatten() {
                if seen.insert(prereq.clone()) {
                    queue.push_back(prereq);
                }
            }
        }
        seen
    }

    /// Nodes that transitively depend on `node_id`. Adding any of them as a
    /// prerequisite of `node_id` would close a cycle.
    pub fn descendants(&self, node_id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(node_id);
        while let Some(current) = queue.pop_front() {
            for child in self.dependents.get(current).into_iter().flatten() {
                if seen.insert(child.clone()) {
                    queue.push_back(child);
                }
            }
        }
        seen
    }
}

/// Analyze a draft. Pure; never fails on malformed structure.
///
/// Duplicate node ids resolve to the first occurrence and unknown prerequisite
/// ids are ignored here; the judge reports both.
pub fn analyze(draft: &CurriculumDraft) -> GraphView {
    let mut estimates: BTreeMap<String, f64> = BTreeMap::new();
    let mut prerequisites: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for node in &draft.nodes {
        if estimates.contains_key(&node.id) {
            continue;
        }
        let weight = if node.estimate_minutes.is_finite() {
            node.estimate_minutes.max(0.0)
        } else {
            0.0
        };
        estimates.insert(node.id.clone(), weight);
        prerequisites.insert(node.id.clone(), Vec::new());
    }

    let mut dependents: BTreeMap<String, BTreeSet<String>> = estimates
        .keys()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();
    let mut seen_ids = BTreeSet::new();
    for node in &draft.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            continue;
        }
        let mut resolved: Vec<String> = Vec::new();
        for prereq in &node.prerequisites {
            if !estimates.contains_key(prereq) || resolved.contains(prereq) {
                continue;
            }
            resolved.push(prereq.clone());
            if let Some(children) = dependents.get_mut(prereq) {
                children.insert(node.id.clone());
            }
        }
        prerequisites.insert(node.id.clone(), resolved);
    }

    let topological_order = kahn_order(&prerequisites, &dependents);
    let visited: BTreeSet<&str> = topological_order.iter().map(String::as_str).collect();
    let unvisited: BTreeSet<String> = prerequisites
        .keys()
        .filter(|id| !visited.contains(id.as_str()))
        .cloned()
        .collect();
    let cycles = CycleReport {
        cycles_detected: !unvisited.is_empty(),
        unvisited,
        on_cycle: BTreeSet::new(),
    };

    let mut view = GraphView {
        topological_order,
        layers: BTreeMap::new(),
        dependents,
        prerequisites,
        distances: BTreeMap::new(),
        critical_path: None,
        cycles,
        milestones: Vec::new(),
    };
    if view.cycles.cycles_detected {
        let on_cycle: BTreeSet<String> = view
            .cycles
            .unvisited
            .iter()
            .filter(|id| view.ancestors(id).contains(*id))
            .cloned()
            .collect();
        view.cycles.on_cycle = on_cycle;
        return view;
    }

    view.layers = compute_layers(&view.topological_order, &view.prerequisites);
    let (distances, critical_path) =
        compute_critical_path(&view.topological_order, &view.prerequisites, &estimates);
    view.distances = distances;
    view.critical_path = critical_path;
    view.milestones = group_milestones(&view.layers);
    view
}

fn kahn_order(
    prerequisites: &BTreeMap<String, Vec<String>>,
    dependents: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> = prerequisites
        .iter()
        .map(|(id, prereqs)| (id.as_str(), prereqs.len()))
        .collect();

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(prerequisites.len());
    while let Some(current) = ready.pop_first() {
        order.push(current.to_string());
        for child in dependents.get(current).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(child.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(child.as_str());
                }
            }
        }
    }
    order
}

fn compute_layers(
    order: &[String],
    prerequisites: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, usize> {
    let mut layers: BTreeMap<String, usize> = BTreeMap::new();
    for id in order {
        let layer = prerequisites
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|p| layers.get(p))
            .max()
            .map_or(0, |deepest| deepest + 1);
        layers.insert(id.clone(), layer);
    }
    layers
}

fn compute_critical_path(
    order: &[String],
    prerequisites: &BTreeMap<String, Vec<String>>,
    estimates: &BTreeMap<String, f64>,
) -> (BTreeMap<String, f64>, Option<CriticalPath>) {
    let mut distance: BTreeMap<String, f64> = BTreeMap::new();
    let mut predecessor: BTreeMap<&str, &str> = BTreeMap::new();

    for id in order {
        let mut best: Option<(&str, f64)> = None;
        for prereq in prerequisites.get(id).into_iter().flatten() {
            let d = distance.get(prereq).copied().unwrap_or(0.0);
            // Strict comparison keeps the first prerequisite in declared order.
            if best.map_or(true, |(_, current)| d > current) {
                best = Some((prereq.as_str(), d));
            }
        }
        let weight = estimates.get(id).copied().unwrap_or(0.0);
        let total = weight + best.map_or(0.0, |(_, d)| d);
        if let Some((p, _)) = best {
            predecessor.insert(id.as_str(), p);
        }
        distance.insert(id.clone(), total);
    }

    let mut end: Option<(&str, f64)> = None;
    for id in order {
        let d = distance[id];
        if end.map_or(true, |(_, current)| d > current) {
            end = Some((id.as_str(), d));
        }
    }

    let critical_path = end.map(|(last, total)| {
        let mut nodes = vec![last.to_string()];
        let mut cursor = last;
        while let Some(prev) = predecessor.get(cursor) {
            nodes.push(prev.to_string());
            cursor = prev;
        }
        nodes.reverse();
        CriticalPath {
            nodes,
            total_minutes: total,
        }
    });
    (distance, critical_path)
}

fn group_milestones(layers: &BTreeMap<String, usize>) -> Vec<Milestone> {
    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    // BTreeMap iteration already yields ids ascending within each layer.
    for (id, layer) in layers {
        groups.entry(*layer).or_default().push(id.clone());
    }
    groups
        .into_iter()
        .map(|(layer, node_ids)| Milestone { layer, node_ids })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::curriculum::Node;

    fn node(id: &str, prereqs: &[&str], minutes: f64) -> Node {
        Node::new(id, id, format!("Explain {id}"))
            .with_prerequisites(prereqs.iter().copied())
            .with_estimate(minutes)
    }

    #[test]
    fn test_kahn_ties_break_lexicographically() {
        let draft = CurriculumDraft::new(
            "t",
            vec![
                node("c", &[], 10.0),
                node("a", &[], 10.0),
                node("d", &["a"], 10.0),
                node("b", &[], 10.0),
            ],
        );
        let view = analyze(&draft);
        // "d" only becomes ready once "a" is emitted, and then sorts after "b" and "c".
        assert_eq!(view.topological_order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_ready_set_reorders_after_each_pop() {
        let draft = CurriculumDraft::new(
            "t",
            vec![node("b", &[], 1.0), node("z", &[], 1.0), node("c", &["b"], 1.0)],
        );
        let view = analyze(&draft);
        assert_eq!(view.topological_order, vec!["b", "c", "z"]);
    }

    #[test]
    fn test_self_prerequisite_is_a_cycle() {
        let draft = CurriculumDraft::new("t", vec![node("a", &["a"], 10.0)]);
        let view = analyze(&draft);
        assert!(view.cycles.cycles_detected);
        assert!(view.layers.is_empty());
        assert!(view.critical_path.is_none());
        assert!(view.milestones.is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_prerequisites_ignored() {
        let draft = CurriculumDraft::new(
            "t",
            vec![node("a", &[], 10.0), node("b", &["a", "a", "ghost"], 5.0)],
        );
        let view = analyze(&draft);
        assert!(view.is_acyclic());
        assert_eq!(view.prerequisites["b"], vec!["a".to_string()]);
        assert_eq!(view.layer("b"), Some(1));
    }

    #[test]
    fn test_critical_path_prefers_first_declared_prerequisite_on_tie() {
        let draft = CurriculumDraft::new(
            "t",
            vec![
                node("a", &[], 30.0),
                node("b", &[], 30.0),
                node("c", &["b", "a"], 10.0),
            ],
        );
        let view = analyze(&draft);
        let path = view.critical_path.expect("critical path");
        assert_eq!(path.nodes, vec!["b", "c"]);
        assert_eq!(path.total_minutes, 40.0);
    }

    #[test]
    fn test_ancestors_and_on_cycle() {
        let draft = CurriculumDraft::new(
            "t",
            vec![
                node("a", &[], 1.0),
                node("b", &["a"], 1.0),
                node("c", &["b"], 1.0),
                node("x", &["y"], 1.0),
                node("y", &["x"], 1.0),
            ],
        );
        let view = analyze(&draft);
        let ancestors: Vec<_> = view.ancestors("c").into_iter().collect();
        assert_eq!(ancestors, vec!["a", "b"]);
        let on_cycle: Vec<_> = view.cycles.on_cycle.iter().map(String::as_str).collect();
        assert_eq!(on_cycle, vec!["x", "y"]);
    }

    #[test]
    fn test_downstream_of_cycle_is_unvisited_but_not_on_cycle() {
        let draft = CurriculumDraft::new(
            "t",
            vec![
                node("a", &["x"], 1.0),
                node("x", &["y"], 1.0),
                node("y", &["x"], 1.0),
            ],
        );
        let view = analyze(&draft);
        let unvisited: Vec<_> = view.cycles.unvisited.iter().map(String::as_str).collect();
        assert_eq!(unvisited, vec!["a", "x", "y"]);
        let on_cycle: Vec<_> = view.cycles.on_cycle.iter().map(String::as_str).collect();
        assert_eq!(on_cycle, vec!["x", "y"]);
    }

    #[test]
    fn test_empty_draft() {
        let view = analyze(&CurriculumDraft::new("t", Vec::new()));
        assert!(view.is_acyclic());
        assert!(view.topological_order.is_empty());
        assert!(view.critical_path.is_none());
        assert_eq!(view.max_depth(), 0);
    }
}
