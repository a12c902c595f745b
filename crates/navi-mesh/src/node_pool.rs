//! Node pool and open list used by the graph searches
//!
//! Nodes are addressed by 1-based [`NodeIndex`] values so that zero can mean
//! "no parent". A node is keyed by polygon reference and a small state value;
//! the A* search uses the state to tell apart arrivals from different tile
//! sides.

use super::PolyRef;

/// Node flags for search state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const OPEN: NodeFlags = NodeFlags(0x01);
    pub const CLOSED: NodeFlags = NodeFlags(0x02);

    pub fn contains(&self, flag: NodeFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: NodeFlags) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: NodeFlags) {
        self.0 &= !flag.0;
    }
}

/// 1-based node index, 0 is the null index
pub type NodeIndex = u16;

/// Null node index
pub const NULL_NODE: NodeIndex = 0;

/// Search node
#[derive(Debug, Clone)]
pub struct Node {
    /// Position of the node
    pub pos: [f32; 3],
    /// Cost from the start to this node
    pub cost: f32,
    /// Cost plus heuristic
    pub total: f32,
    /// Parent node index
    pub pidx: NodeIndex,
    /// Extra state (0-3)
    pub state: u8,
    pub flags: NodeFlags,
    /// Polygon the node stands for
    pub id: PolyRef,
}

impl Node {
    fn new(id: PolyRef, state: u8) -> Self {
        Self {
            pos: [0.0; 3],
            cost: 0.0,
            total: 0.0,
            pidx: NULL_NODE,
            state,
            flags: NodeFlags::default(),
            id,
        }
    }
}

/// Fixed-capacity node storage with hash lookup by polygon reference
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Node>,
    /// First node (0-based) in each hash bucket
    first: Vec<Option<u16>>,
    /// Next node (0-based) in the same bucket
    next: Vec<Option<u16>>,
    max_nodes: usize,
}

impl NodePool {
    /// Creates a pool holding at most `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        let max_nodes = max_nodes.clamp(1, u16::MAX as usize - 1);
        let hash_size = (navi_common::next_pow2(max_nodes as u32 / 4) as usize).max(1);
        Self {
            nodes: Vec::with_capacity(max_nodes),
            first: vec![None; hash_size],
            next: Vec::with_capacity(max_nodes),
            max_nodes,
        }
    }

    /// Removes every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next.clear();
        self.first.fill(None);
    }

    fn bucket(&self, id: PolyRef) -> usize {
        let mut a = id.id();
        a = a.wrapping_add(!(a << 15));
        a ^= a >> 10;
        a = a.wrapping_add(a << 3);
        a ^= a >> 6;
        a = a.wrapping_add(!(a << 11));
        a ^= a >> 16;
        a as usize & (self.first.len() - 1)
    }

    /// Finds the node for a polygon and state
    pub fn find_node(&self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        let mut cur = self.first[self.bucket(id)];
        while let Some(i) = cur {
            let node = &self.nodes[i as usize];
            if node.id == id && node.state == state {
                return Some(i + 1);
            }
            cur = self.next[i as usize];
        }
        None
    }

    /// Finds or allocates the node for a polygon and state.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn get_node(&mut self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(id, state) {
            return Some(idx);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }

        let i = self.nodes.len() as u16;
        let bucket = self.bucket(id);
        self.nodes.push(Node::new(id, state));
        self.next.push(self.first[bucket]);
        self.first[bucket] = Some(i);
        Some(i + 1)
    }

    /// Gets a node by index
    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.nodes.get((idx as usize).checked_sub(1)?)
    }

    /// Gets a mutable node by index
    pub fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut((idx as usize).checked_sub(1)?)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }
}

/// Binary min-heap of node indices ordered by node total cost
#[derive(Debug, Default)]
pub struct NodeQueue {
    heap: Vec<(f32, NodeIndex)>,
}

impl NodeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pushes a node with its current total cost
    pub fn push(&mut self, idx: NodeIndex, total: f32) {
        self.heap.push((total, idx));
        self.bubble_up(self.heap.len() - 1);
    }

    /// Pops the node with the lowest total cost
    pub fn pop(&mut self) -> Option<NodeIndex> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.trickle_down(0);
        }
        Some(top.1)
    }

    /// Updates the cost of a queued node whose total decreased
    pub fn modify(&mut self, idx: NodeIndex, total: f32) {
        if let Some(i) = self.heap.iter().position(|&(_, n)| n == idx) {
            self.heap[i].0 = total;
            self.bubble_up(i);
        }
    }

    fn bubble_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].0 >= self.heap[parent].0 {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn trickle_down(&mut self, mut i: usize) {
        let size = self.heap.len();
        loop {
            let child1 = 2 * i + 1;
            if child1 >= size {
                break;
            }
            let child2 = child1 + 1;
            let min_child = if child2 < size && self.heap[child2].0 < self.heap[child1].0 {
                child2
            } else {
                child1
            };
            if self.heap[i].0 <= self.heap[min_child].0 {
                break;
            }
            self.heap.swap(i, min_child);
            i = min_child;
        }
    }
}
