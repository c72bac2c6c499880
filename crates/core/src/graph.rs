//! Per-crawler graph builder (spec §4.5): degree computation, reachability
//! from the entry set, and the deterministic pre-emission sort.

use crate::model::{Certainty, EdgeKind, Graph, NodeState};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Finalizes a crawler's graph in place: computes in/out degrees, runs
/// reachability from `entrypoints`, assigns node states, and sorts nodes and
/// edges for deterministic emission. `js_side_effect_rule` enables the JS
/// special case where a reached file whose only incoming edges are
/// `side_effect` and which imports nothing itself is `side_effect_only`
/// rather than `used`.
pub fn finalize(graph: &mut Graph, entrypoints: &BTreeSet<String>, js_side_effect_rule: bool) {
    compute_degrees(graph);
    let reached = reachable_from(graph, entrypoints);
    assign_states(graph, &reached, js_side_effect_rule);
    sort_for_emission(graph);
}

fn compute_degrees(graph: &mut Graph) {
    for node in graph.nodes.values_mut() {
        node.in_deg = 0;
        node.out_deg = 0;
    }
    for edge in &graph.edges {
        if let Some(n) = graph.nodes.get_mut(&edge.source) {
            n.out_deg += 1;
        }
        if let Some(n) = graph.nodes.get_mut(&edge.target) {
            n.in_deg += 1;
        }
    }
}

/// BFS/DFS closure from the entry set; only `file` nodes are traversed
/// (externals are leaves, per the glossary's Reachability definition).
fn reachable_from(graph: &Graph, entrypoints: &BTreeSet<String>) -> HashSet<String> {
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adj.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
    }

    let mut reached: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    for e in entrypoints {
        if graph.nodes.contains_key(e) && reached.insert(e.clone()) {
            queue.push_back(e.clone());
        }
    }
    while let Some(cur) = queue.pop_front() {
        if let Some(targets) = adj.get(cur.as_str()) {
            for t in targets {
                let is_file = graph.nodes.get(*t).map(|n| n.node_type == crate::model::NodeType::File).unwrap_or(false);
                if is_file && reached.insert(t.to_string()) {
                    queue.push_back(t.to_string());
                }
            }
        }
    }
    reached
}

fn assign_states(graph: &mut Graph, reached: &HashSet<String>, js_side_effect_rule: bool) {
    // Incoming edge kinds per target, and whether a node has any outgoing edge.
    let mut incoming_kinds: HashMap<&str, Vec<EdgeKind>> = HashMap::new();
    let mut has_outgoing: HashSet<&str> = HashSet::new();
    for e in &graph.edges {
        incoming_kinds.entry(e.target.as_str()).or_default().push(e.kind);
        has_outgoing.insert(e.source.as_str());
    }

    let ids: Vec<String> = graph.nodes.keys().cloned().collect();
    for id in ids {
        let node = graph.nodes.get(&id).unwrap();
        let is_external = node.node_type == crate::model::NodeType::External;
        if is_external {
            graph.nodes.get_mut(&id).unwrap().state = NodeState::Used;
            continue;
        }
        if reached.contains(&id) {
            let state = if js_side_effect_rule {
                let kinds = incoming_kinds.get(id.as_str());
                let only_side_effect = kinds.map(|ks| !ks.is_empty() && ks.iter().all(|k| *k == EdgeKind::SideEffect)).unwrap_or(false);
                let imports_nothing = !has_outgoing.contains(id.as_str());
                if only_side_effect && imports_nothing {
                    NodeState::SideEffectOnly
                } else {
                    NodeState::Used
                }
            } else {
                NodeState::Used
            };
            graph.nodes.get_mut(&id).unwrap().state = state;
        } else {
            graph.nodes.get_mut(&id).unwrap().state = NodeState::Unused;
        }
    }
}

/// Escalates unreached file nodes with `inDeg+outDeg > 0` to `used` — the
/// L-self crawler variant mentioned in spec §4.5 ("some crawlers
/// additionally escalate").
pub fn escalate_connected_unused(graph: &mut Graph) {
    let ids: Vec<String> = graph.nodes.keys().cloned().collect();
    for id in ids {
        let n = graph.nodes.get_mut(&id).unwrap();
        if n.state == NodeState::Unused && n.in_deg + n.out_deg > 0 {
            n.state = NodeState::Used;
        }
    }
}

fn sort_for_emission(graph: &mut Graph) {
    graph
        .edges
        .sort_by(|a, b| a.source.cmp(&b.source).then(a.target.cmp(&b.target)).then(a.kind.cmp(&b.kind)));
    // nodes is a BTreeMap<String, Node>, already sorted by id on iteration.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Lang, Node};

    fn file(id: &str) -> Node {
        Node::file(id, Lang::Javascript)
    }

    #[test]
    fn reachability_marks_used_and_unused() {
        let mut g = Graph::new();
        g.upsert_node(file("src/main.ts"));
        g.upsert_node(file("src/util.ts"));
        g.upsert_node(file("src/dead.ts"));
        g.add_edge(Edge {
            source: "src/main.ts".into(),
            target: "src/util.ts".into(),
            kind: EdgeKind::Import,
            certainty: Certainty::Static,
        });
        let mut entries = BTreeSet::new();
        entries.insert("src/main.ts".to_string());
        finalize(&mut g, &entries, false);

        assert_eq!(g.nodes["src/main.ts"].state, NodeState::Used);
        assert_eq!(g.nodes["src/util.ts"].state, NodeState::Used);
        assert_eq!(g.nodes["src/dead.ts"].state, NodeState::Unused);
        assert_eq!(g.nodes["src/util.ts"].in_deg, 1);
        assert_eq!(g.nodes["src/main.ts"].out_deg, 1);
    }

    #[test]
    fn js_side_effect_only_state() {
        let mut g = Graph::new();
        g.upsert_node(file("src/main.ts"));
        g.upsert_node(file("src/boot.ts"));
        g.add_edge(Edge {
            source: "src/main.ts".into(),
            target: "src/boot.ts".into(),
            kind: EdgeKind::SideEffect,
            certainty: Certainty::Static,
        });
        let mut entries = BTreeSet::new();
        entries.insert("src/main.ts".to_string());
        finalize(&mut g, &entries, true);
        assert_eq!(g.nodes["src/boot.ts"].state, NodeState::SideEffectOnly);
    }

    #[test]
    fn external_nodes_are_always_used() {
        let mut g = Graph::new();
        g.upsert_node(file("src/main.ts"));
        g.upsert_node(Node::external("left-pad"));
        g.add_edge(Edge {
            source: "src/main.ts".into(),
            target: "left-pad".into(),
            kind: EdgeKind::Import,
            certainty: Certainty::Static,
        });
        finalize(&mut g, &BTreeSet::new(), false);
        assert_eq!(g.nodes["left-pad"].state, NodeState::Used);
    }
}
