//! Equality edges between join members.

use crate::ast::NodeId;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

/// The `a.x = b.y` edges of one slave table.
///
/// Entry `i` of the `a_*` and `b_*` vectors describes one edge. After
/// alignment every `a_indexes[i]` equals `slave_index` and every
/// `b_indexes[i]` is in `parents`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinContext {
    pub a_indexes: Vec<usize>,
    pub a_names: Vec<String>,
    pub a_nodes: Vec<NodeId>,
    pub b_indexes: Vec<usize>,
    pub b_names: Vec<String>,
    pub b_nodes: Vec<NodeId>,
    /// Higher-ordered table of every edge.
    pub slave_index: usize,
    /// Lower-ordered tables the slave depends on.
    pub parents: BTreeSet<usize>,
    /// Unresolved parents during topological ordering.
    pub in_count: usize,
}

impl JoinContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.a_indexes.len()
    }

    /// Returns whether the context has no edges.
    pub fn is_empty(&self) -> bool {
        self.a_indexes.is_empty()
    }

    /// Appends an edge.
    pub fn add_edge(
        &mut self,
        a: (usize, &str, NodeId),
        b: (usize, &str, NodeId),
    ) {
        self.a_indexes.push(a.0);
        self.a_names.push(a.1.into());
        self.a_nodes.push(a.2);
        self.b_indexes.push(b.0);
        self.b_names.push(b.1.into());
        self.b_nodes.push(b.2);
    }

    /// Swaps the sides of edge `i`.
    pub fn swap_sides(&mut self, i: usize) {
        core::mem::swap(&mut self.a_indexes[i], &mut self.b_indexes[i]);
        core::mem::swap(&mut self.a_names[i], &mut self.b_names[i]);
        core::mem::swap(&mut self.a_nodes[i], &mut self.b_nodes[i]);
    }

    /// Removes edge `i`.
    pub fn remove_edge(&mut self, i: usize) {
        self.a_indexes.remove(i);
        self.a_names.remove(i);
        self.a_nodes.remove(i);
        self.b_indexes.remove(i);
        self.b_names.remove(i);
        self.b_nodes.remove(i);
    }

    /// Returns whether edge `i` touches table `index`.
    pub fn touches(&self, i: usize, index: usize) -> bool {
        self.a_indexes[i] == index || self.b_indexes[i] == index
    }
}
