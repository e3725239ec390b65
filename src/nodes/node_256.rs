use super::base_node::{BaseNode, Node, NodeIter, NodeType};
use super::node_ptr::NodePtr;

/// Direct-indexed node; a null child word marks an empty slot.
#[repr(C)]
#[repr(align(8))]
pub(crate) struct Node256 {
    base: BaseNode,
    children: [NodePtr; 256],
}

const _: () = assert!(std::mem::size_of::<Node256>() == 2064);
const _: () = assert!(std::mem::align_of::<Node256>() == 8);

pub(crate) struct Node256Iter<'a> {
    cur: u16,
    end: u16,
    node: &'a Node256,
}

impl Iterator for Node256Iter<'_> {
    type Item = (u8, NodePtr);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cur > self.end {
                return None;
            }

            let key = self.cur as usize;
            self.cur += 1;

            let child = self.node.children[key];
            if !child.is_null() {
                return Some((key as u8, child));
            }
        }
    }
}

impl Node for Node256 {
    fn get_type() -> NodeType {
        NodeType::N256
    }

    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseNode {
        &mut self.base
    }

    fn is_full(&self) -> bool {
        false
    }

    fn insert(&mut self, key: u8, child: NodePtr) {
        debug_assert!(self.children[key as usize].is_null());
        self.children[key as usize] = child;
        self.base.meta.inc_count();
    }

    fn get_child(&self, key: u8) -> Option<NodePtr> {
        let child = unsafe { self.children.get_unchecked(key as usize) };
        if child.is_null() {
            None
        } else {
            Some(*child)
        }
    }

    fn get_child_mut(&mut self, key: u8) -> Option<&mut NodePtr> {
        if self.children[key as usize].is_null() {
            None
        } else {
            Some(&mut self.children[key as usize])
        }
    }

    fn get_children(&self, start: u8, end: u8) -> NodeIter<'_> {
        NodeIter::N256(Node256Iter {
            cur: start as u16,
            end: end as u16,
            node: self,
        })
    }

    // The slot may already be null when a collapsed subtree is unlinked.
    fn remove(&mut self, key: u8) {
        self.children[key as usize] = NodePtr::null();
        self.base.meta.dec_count();
    }

    fn copy_to<N: Node>(&self, dst: &mut N) {
        for (key, child) in self.children.iter().enumerate() {
            if !child.is_null() {
                dst.insert(key as u8, *child);
            }
        }
    }
}
