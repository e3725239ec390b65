use super::base_node::{BaseNode, Node, NodeIter, NodeType};
use super::node_ptr::NodePtr;

pub(crate) const EMPTY_MARKER: u8 = 48;

/// Maps each branch byte to a slot in the compact `children` array. Vacant
/// slots are threaded into a free chain: each one stores the index of the
/// next vacancy as a payload word, starting at `next_empty`.
#[repr(C)]
#[repr(align(8))]
pub(crate) struct Node48 {
    base: BaseNode,
    pub(crate) child_idx: [u8; 256],
    next_empty: u8,
    children: [NodePtr; 48],
}

const _: () = assert!(std::mem::size_of::<Node48>() == 664);
const _: () = assert!(std::mem::align_of::<Node48>() == 8);

impl Node48 {
    pub(crate) fn init_empty(&mut self) {
        for v in self.child_idx.iter_mut() {
            *v = EMPTY_MARKER;
        }
        self.next_empty = 0;
        for (i, child) in self.children.iter_mut().enumerate() {
            *child = NodePtr::from_payload(i + 1);
        }
    }
}

pub(crate) struct Node48Iter<'a> {
    start: u16,
    end: u16,
    node: &'a Node48,
}

impl Iterator for Node48Iter<'_> {
    type Item = (u8, NodePtr);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.start > self.end {
                return None;
            }

            let key = self.start as usize;
            self.start += 1;

            let child_loc = self.node.child_idx[key];
            if child_loc != EMPTY_MARKER {
                return Some((key as u8, self.node.children[child_loc as usize]));
            }
        }
    }
}

impl Node for Node48 {
    fn get_type() -> NodeType {
        NodeType::N48
    }

    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseNode {
        &mut self.base
    }

    fn is_full(&self) -> bool {
        self.base.meta.count() == 48
    }

    fn insert(&mut self, key: u8, child: NodePtr) {
        let pos = self.next_empty as usize;
        debug_assert!(pos < 48);
        self.next_empty = unsafe { self.children[pos].as_payload_unchecked() } as u8;

        self.children[pos] = child;
        self.child_idx[key as usize] = pos as u8;
        self.base.meta.inc_count();
    }

    fn get_child(&self, key: u8) -> Option<NodePtr> {
        let pos = unsafe { self.child_idx.get_unchecked(key as usize) };
        if *pos == EMPTY_MARKER {
            None
        } else {
            let child = unsafe { self.children.get_unchecked(*pos as usize) };
            Some(*child)
        }
    }

    fn get_child_mut(&mut self, key: u8) -> Option<&mut NodePtr> {
        let pos = self.child_idx[key as usize];
        if pos == EMPTY_MARKER {
            None
        } else {
            Some(&mut self.children[pos as usize])
        }
    }

    fn get_children(&self, start: u8, end: u8) -> NodeIter<'_> {
        NodeIter::N48(Node48Iter {
            start: start as u16,
            end: end as u16,
            node: self,
        })
    }

    fn remove(&mut self, key: u8) {
        debug_assert!(self.child_idx[key as usize] != EMPTY_MARKER);
        let pos = self.child_idx[key as usize];
        self.children[pos as usize] = NodePtr::from_payload(self.next_empty as usize);
        self.child_idx[key as usize] = EMPTY_MARKER;
        self.next_empty = pos;
        self.base.meta.dec_count();
        debug_assert!(self.get_child(key).is_none());
    }

    fn copy_to<N: Node>(&self, dst: &mut N) {
        for (key, pos) in self.child_idx.iter().enumerate() {
            if *pos != EMPTY_MARKER {
                dst.insert(key as u8, self.children[*pos as usize]);
            }
        }
    }
}
