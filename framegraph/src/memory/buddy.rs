//! Power-of-two buddy allocator over offset-addressable memory.
//!
//! The tree lives in a flat arena of nodes addressed by index. A split node
//! stores the index of its left child; the right child always sits right
//! after it, so children are allocated and reclaimed in pairs. Pairs freed by
//! a merge go to a free list and are reused by the next split, which keeps
//! both allocation and deallocation at O(log(capacity / min_block)).
//!
//! The allocator never touches the memory it manages; it only hands out
//! offsets.

use crate::error::graph_assert;

const NO_PARENT: u32 = u32::MAX;

/// Largest supported tree height.
const MAX_ORDER: u8 = 62;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Free,
    Split,
    Allocated,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    state: NodeState,
    /// Block size is `min_block << order`.
    order: u8,
    offset: u64,
    parent: u32,
    /// Left child index while split.
    children: u32,
    /// Order of the largest free block in this subtree.
    largest_free: Option<u8>,
}

impl Node {
    fn free(order: u8, offset: u64, parent: u32) -> Self {
        Self {
            state: NodeState::Free,
            order,
            offset,
            parent,
            children: NO_PARENT,
            largest_free: Some(order),
        }
    }
}

/// Buddy allocator handing out power-of-two blocks.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::memory::BuddyAllocator;
///
/// let mut buddy = BuddyAllocator::new(1024, 64);
/// let a = buddy.allocate(100).unwrap();
/// let b = buddy.allocate(64).unwrap();
/// assert_eq!(a, 0);
/// assert_eq!(b, 128);
///
/// buddy.deallocate(a);
/// buddy.deallocate(b);
/// assert_eq!(buddy.allocate(1024), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    min_block: u64,
    nodes: Vec<Node>,
    free_pairs: Vec<u32>,
    allocated_bytes: u64,
    allocation_count: usize,
}

impl BuddyAllocator {
    /// Create an allocator of at least `capacity` bytes.
    ///
    /// `min_block` and the capacity are rounded up to powers of two, and the
    /// capacity to at least one block.
    pub fn new(capacity: u64, min_block: u64) -> Self {
        let min_block = min_block.max(1).next_power_of_two();
        let blocks = capacity.div_ceil(min_block).max(1).next_power_of_two();
        let order = blocks.trailing_zeros() as u8;
        graph_assert!(
            order <= MAX_ORDER,
            "buddy capacity {} with block {} is too large",
            capacity,
            min_block
        );
        Self {
            min_block,
            nodes: vec![Node::free(order, 0, NO_PARENT)],
            free_pairs: Vec::new(),
            allocated_bytes: 0,
            allocation_count: 0,
        }
    }

    /// Smallest block size.
    pub fn min_block(&self) -> u64 {
        self.min_block
    }

    /// Total managed bytes.
    pub fn capacity(&self) -> u64 {
        self.min_block << self.nodes[0].order
    }

    /// Bytes in allocated blocks.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Bytes not in allocated blocks.
    pub fn free_bytes(&self) -> u64 {
        self.capacity() - self.allocated_bytes
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of nodes currently in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 2 * self.free_pairs.len()
    }

    /// Size of the largest block that can be allocated without growing.
    pub fn largest_free_block(&self) -> u64 {
        self.nodes[0]
            .largest_free
            .map_or(0, |order| self.min_block << order)
    }

    /// Size of the block a request of `size` bytes occupies.
    pub fn block_size(&self, size: u64) -> u64 {
        self.min_block << self.order_for(size)
    }

    fn order_for(&self, size: u64) -> u8 {
        size.div_ceil(self.min_block)
            .max(1)
            .next_power_of_two()
            .trailing_zeros() as u8
    }

    /// Allocate a block for `size` bytes and return its offset.
    ///
    /// Blocks are aligned to their own size. Returns `None` when no free
    /// block is large enough. Requests larger than the whole capacity are an
    /// invariant violation.
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        graph_assert!(
            size <= self.capacity(),
            "buddy request of {} bytes exceeds capacity {}",
            size,
            self.capacity()
        );
        let order = self.order_for(size);
        if self.nodes[0].largest_free < Some(order) {
            return None;
        }

        let mut index = 0usize;
        loop {
            let node = self.nodes[index];
            match node.state {
                NodeState::Free if node.order == order => break,
                NodeState::Free => self.split(index),
                NodeState::Split => {
                    let left = node.children as usize;
                    let right = left + 1;
                    let fits = |i: usize| self.nodes[i].largest_free >= Some(order);
                    index = match (fits(left), fits(right)) {
                        (true, true) => {
                            if self.nodes[right].largest_free < self.nodes[left].largest_free {
                                right
                            } else {
                                left
                            }
                        }
                        (true, false) => left,
                        (false, true) => right,
                        (false, false) => {
                            graph_assert!(false, "buddy tree summary out of date at node {}", index);
                            return None;
                        }
                    };
                }
                NodeState::Allocated => {
                    graph_assert!(false, "descended into allocated buddy node {}", index);
                    return None;
                }
            }
        }

        let node = &mut self.nodes[index];
        node.state = NodeState::Allocated;
        node.largest_free = None;
        let offset = node.offset;
        self.allocated_bytes += self.min_block << order;
        self.allocation_count += 1;
        self.update_upwards(index);
        Some(offset)
    }

    /// Free the block allocated at `offset`.
    ///
    /// Buddies that become free together are merged back into their parent.
    pub fn deallocate(&mut self, offset: u64) {
        let mut index = 0usize;
        loop {
            let node = self.nodes[index];
            match node.state {
                NodeState::Allocated => {
                    graph_assert!(
                        node.offset == offset,
                        "buddy offset {} is inside the block at {}, not its start",
                        offset,
                        node.offset
                    );
                    break;
                }
                NodeState::Split => {
                    let right = node.children as usize + 1;
                    index = if offset >= self.nodes[right].offset {
                        right
                    } else {
                        node.children as usize
                    };
                }
                NodeState::Free => {
                    graph_assert!(false, "buddy offset {} is not allocated", offset);
                    return;
                }
            }
        }

        let order = self.nodes[index].order;
        self.nodes[index].state = NodeState::Free;
        self.nodes[index].largest_free = Some(order);
        self.allocated_bytes -= self.min_block << order;
        self.allocation_count -= 1;

        // Merge upwards while both buddies are free.
        let mut parent = self.nodes[index].parent;
        while parent != NO_PARENT {
            let parent_index = parent as usize;
            let left = self.nodes[parent_index].children as usize;
            if self.nodes[left].state != NodeState::Free
                || self.nodes[left + 1].state != NodeState::Free
            {
                break;
            }
            self.free_pairs.push(left as u32);
            let node = &mut self.nodes[parent_index];
            node.state = NodeState::Free;
            node.children = NO_PARENT;
            node.largest_free = Some(node.order);
            index = parent_index;
            parent = node.parent;
        }
        self.update_upwards(index);
    }

    /// Double the capacity, keeping every existing allocation in place.
    ///
    /// The current tree becomes the left child of a new root and the new
    /// right half is free.
    pub fn grow(&mut self) {
        let root = self.nodes[0];
        graph_assert!(
            root.order < MAX_ORDER,
            "buddy allocator cannot grow past order {}",
            MAX_ORDER
        );
        if root.state == NodeState::Free {
            self.nodes[0].order += 1;
            self.nodes[0].largest_free = Some(root.order + 1);
            return;
        }

        let old_capacity = self.capacity();
        let pair = self.take_pair();
        self.nodes[pair] = Node {
            parent: 0,
            ..root
        };
        self.nodes[pair + 1] = Node::free(root.order, old_capacity, 0);
        if root.state == NodeState::Split {
            let children = root.children as usize;
            self.nodes[children].parent = pair as u32;
            self.nodes[children + 1].parent = pair as u32;
        }
        self.nodes[0] = Node {
            state: NodeState::Split,
            order: root.order + 1,
            offset: 0,
            parent: NO_PARENT,
            children: pair as u32,
            largest_free: Some(root.order),
        };
        self.update_upwards(0);
    }

    fn split(&mut self, index: usize) {
        let node = self.nodes[index];
        graph_assert!(node.order > 0, "cannot split a minimum-size buddy block");
        let pair = self.take_pair();
        let child_order = node.order - 1;
        let half = self.min_block << child_order;
        self.nodes[pair] = Node::free(child_order, node.offset, index as u32);
        self.nodes[pair + 1] = Node::free(child_order, node.offset + half, index as u32);
        let node = &mut self.nodes[index];
        node.state = NodeState::Split;
        node.children = pair as u32;
        node.largest_free = Some(child_order);
    }

    fn take_pair(&mut self) -> usize {
        if let Some(pair) = self.free_pairs.pop() {
            return pair as usize;
        }
        let pair = self.nodes.len();
        let placeholder = Node::free(0, 0, NO_PARENT);
        self.nodes.push(placeholder);
        self.nodes.push(placeholder);
        pair
    }

    fn update_upwards(&mut self, mut index: usize) {
        loop {
            let node = self.nodes[index];
            let largest_free = match node.state {
                NodeState::Free => Some(node.order),
                NodeState::Allocated => None,
                NodeState::Split => {
                    let left = node.children as usize;
                    self.nodes[left]
                        .largest_free
                        .max(self.nodes[left + 1].largest_free)
                }
            };
            self.nodes[index].largest_free = largest_free;
            if node.parent == NO_PARENT {
                break;
            }
            index = node.parent as usize;
        }
    }
}
