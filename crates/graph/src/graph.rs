//! Immutable directed graph of labels with named edges.
//!
//! Edges point from a dependent node to the node it depends on. Operations
//! never mutate; anything that would is expressed as a new graph. Petgraph
//! supplies toposort and cycle detection underneath the label-keyed facade.

use kindling_core::{Error, Result};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A named dependency edge `(from, to, name)`: `from` depends on `to`.
pub type Edge = (String, String, String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    nodes: BTreeSet<String>,
    edges: BTreeSet<Edge>,
}

impl Graph {
    pub fn new(nodes: BTreeSet<String>, edges: BTreeSet<Edge>) -> Result<Self> {
        for (from, to, name) in &edges {
            if !nodes.contains(from) || !nodes.contains(to) {
                return Err(Error::dependency(format!(
                    "edge '{name}' ({from} -> {to}) references a node outside the graph"
                )));
            }
        }
        Ok(Graph { nodes, edges })
    }

    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    pub fn contains(&self, label: &str) -> bool {
        self.nodes.contains(label)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Labels reachable from `roots` following dependency edges, including
    /// the roots themselves. With `reverse`, edges are followed against
    /// their direction, yielding dependents instead of dependencies.
    pub fn transitive_closure(&self, roots: &BTreeSet<String>, reverse: bool) -> BTreeSet<String> {
        let mut reached: BTreeSet<String> = roots
            .iter()
            .filter(|root| self.nodes.contains(*root))
            .cloned()
            .collect();
        let mut queue: VecDeque<String> = reached.iter().cloned().collect();
        while let Some(label) = queue.pop_front() {
            for (from, to, _) in &self.edges {
                let next = if reverse {
                    if *to == label { from } else { continue }
                } else if *from == label {
                    to
                } else {
                    continue;
                };
                if reached.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        reached
    }

    /// The sub-graph induced by `keep`: nodes in `keep` plus the edges whose
    /// endpoints both survive.
    pub fn restrict(&self, keep: &BTreeSet<String>) -> Graph {
        let nodes: BTreeSet<String> = self.nodes.intersection(keep).cloned().collect();
        let edges = self
            .edges
            .iter()
            .filter(|(from, to, _)| nodes.contains(from) && nodes.contains(to))
            .cloned()
            .collect();
        Graph { nodes, edges }
    }

    /// Labels in topological order, dependencies before dependents.
    /// Fails when the graph contains a cycle, naming a label on it.
    pub fn visit_postorder(&self) -> Result<Vec<String>> {
        let (petgraph, labels) = self.to_petgraph();
        let sorted = algo::toposort(&petgraph, None).map_err(|cycle| {
            Error::dependency(format!(
                "cycle in task graph involving '{}'",
                labels[&cycle.node_id()]
            ))
        })?;
        // Toposort yields dependents first; postorder wants leaves first.
        Ok(sorted.into_iter().rev().map(|ix| labels[&ix].clone()).collect())
    }

    /// Labels in topological order, dependents before dependencies.
    pub fn visit_preorder(&self) -> Result<Vec<String>> {
        let mut order = self.visit_postorder()?;
        order.reverse();
        Ok(order)
    }

    /// For each node, the mapping edge-name → dependency label.
    pub fn links_dict(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut links: BTreeMap<String, BTreeMap<String, String>> = self
            .nodes
            .iter()
            .map(|node| (node.clone(), BTreeMap::new()))
            .collect();
        for (from, to, name) in &self.edges {
            links
                .get_mut(from)
                .expect("edge endpoints validated at construction")
                .insert(name.clone(), to.clone());
        }
        links
    }

    /// Direct reverse dependents of `label` (nodes with an edge into it).
    pub fn dependents_of(&self, label: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|(_, to, _)| to == label)
            .map(|(from, _, _)| from.as_str())
            .collect()
    }

    fn to_petgraph(&self) -> (DiGraph<(), ()>, BTreeMap<NodeIndex, String>) {
        let mut petgraph = DiGraph::new();
        let mut index_of = BTreeMap::new();
        let mut label_of = BTreeMap::new();
        for node in &self.nodes {
            let ix = petgraph.add_node(());
            index_of.insert(node.clone(), ix);
            label_of.insert(ix, node.clone());
        }
        for (from, to, _) in &self.edges {
            petgraph.add_edge(index_of[from], index_of[to], ());
        }
        (petgraph, label_of)
    }

    /// Leaves-first levels of nodes whose dependencies all sit in earlier
    /// levels. Used for the kind-dependency ordering.
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>> {
        let order = self.visit_postorder()?;
        let links = self.links_dict();
        let mut level_of: BTreeMap<&str, usize> = BTreeMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        for label in &order {
            let level = links[label]
                .values()
                .map(|dep| level_of[dep.as_str()] + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(label, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(label.clone());
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str, &str)]) -> Graph {
        Graph::new(
            nodes.iter().map(|node| node.to_string()).collect(),
            edges
                .iter()
                .map(|(from, to, name)| (from.to_string(), to.to_string(), name.to_string()))
                .collect(),
        )
        .unwrap()
    }

    fn labels(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn rejects_dangling_edges() {
        let result = Graph::new(
            labels(&["a"]),
            [("a".to_string(), "ghost".to_string(), "dep".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(matches!(result, Err(Error::Dependency { .. })));
    }

    #[test]
    fn transitive_closure_forward() {
        let graph = graph(
            &["a", "b", "c", "d"],
            &[("a", "b", "e1"), ("b", "c", "e2"), ("d", "c", "e3")],
        );
        assert_eq!(
            graph.transitive_closure(&labels(&["a"]), false),
            labels(&["a", "b", "c"])
        );
    }

    #[test]
    fn transitive_closure_reverse_finds_dependents() {
        let graph = graph(
            &["a", "b", "c", "d"],
            &[("a", "b", "e1"), ("b", "c", "e2"), ("d", "c", "e3")],
        );
        assert_eq!(
            graph.transitive_closure(&labels(&["c"]), true),
            labels(&["a", "b", "c", "d"])
        );
    }

    #[test]
    fn postorder_puts_leaves_first() {
        let graph = graph(&["a", "b", "c"], &[("a", "b", "e1"), ("b", "c", "e2")]);
        assert_eq!(graph.visit_postorder().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn cycle_is_detected() {
        let graph = graph(&["a", "b"], &[("a", "b", "e1"), ("b", "a", "e2")]);
        let err = graph.visit_postorder().unwrap_err();
        assert!(matches!(err, Error::Dependency { .. }));
    }

    #[test]
    fn links_dict_maps_edge_names() {
        let graph = graph(&["a", "b", "c"], &[("a", "b", "build"), ("a", "c", "docs")]);
        let links = graph.links_dict();
        assert_eq!(links["a"]["build"], "b");
        assert_eq!(links["a"]["docs"], "c");
        assert!(links["b"].is_empty());
    }

    #[test]
    fn restrict_drops_severed_edges() {
        let graph = graph(&["a", "b", "c"], &[("a", "b", "e1"), ("b", "c", "e2")]);
        let restricted = graph.restrict(&labels(&["a", "c"]));
        assert_eq!(restricted.nodes(), &labels(&["a", "c"]));
        assert!(restricted.edges().is_empty());
    }

    #[test]
    fn equality_is_structural() {
        let first = graph(&["a", "b"], &[("a", "b", "e1")]);
        let second = graph(&["b", "a"], &[("a", "b", "e1")]);
        assert_eq!(first, second);
    }

    #[test]
    fn execution_levels_group_independent_nodes() {
        let graph = graph(
            &["a", "b", "c"],
            &[("c", "a", "e1"), ("c", "b", "e2")],
        );
        let levels = graph.execution_levels().unwrap();
        assert_eq!(levels, vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]);
    }
}
