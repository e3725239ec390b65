use std::ptr::NonNull;

use crate::{
    error::OOMError,
    nodes::{
        node_16::{Node16, Node16Iter},
        node_256::{Node256, Node256Iter},
        node_4::{Node4, Node4Iter},
        node_48::{Node48, Node48Iter},
        node_linear::{NodeLinear, NodeLinearIter},
        node_ptr::{AllocatedNode, NodePtr},
    },
    Allocator,
};

pub(crate) const MAX_KEY_LEN: usize = 8;

/// Inline budget for the compressed path. Longer logical prefixes keep only
/// their first 9 bytes inline; the rest is reconstructed from the minimum
/// descendant leaf.
pub(crate) const MAX_PREFIX_LEN: usize = 9;
pub(crate) type Prefix = [u8; MAX_PREFIX_LEN];

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum NodeType {
    N4 = 0,
    N16 = 1,
    N48 = 2,
    N256 = 3,
    NLinear = 4,
}

impl NodeType {
    pub(crate) fn node_layout(&self) -> std::alloc::Layout {
        match *self {
            NodeType::N4 => std::alloc::Layout::new::<Node4>(),
            NodeType::N16 => std::alloc::Layout::new::<Node16>(),
            NodeType::N48 => std::alloc::Layout::new::<Node48>(),
            NodeType::N256 => std::alloc::Layout::new::<Node256>(),
            NodeType::NLinear => std::alloc::Layout::new::<NodeLinear>(),
        }
    }
}

pub(crate) trait Node {
    fn get_type() -> NodeType;
    fn base(&self) -> &BaseNode;
    fn base_mut(&mut self) -> &mut BaseNode;
    fn is_full(&self) -> bool;
    fn insert(&mut self, key: u8, child: NodePtr);
    fn get_child(&self, key: u8) -> Option<NodePtr>;
    fn get_child_mut(&mut self, key: u8) -> Option<&mut NodePtr>;
    fn get_children(&self, start: u8, end: u8) -> NodeIter<'_>;
    fn remove(&mut self, key: u8);
    fn copy_to<N: Node>(&self, dst: &mut N);
}

pub(crate) enum NodeIter<'a> {
    N4(Node4Iter<'a>),
    N16(Node16Iter<'a>),
    N48(Node48Iter<'a>),
    N256(Node256Iter<'a>),
    NLinear(NodeLinearIter<'a>),
}

impl Iterator for NodeIter<'_> {
    type Item = (u8, NodePtr);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            NodeIter::N4(iter) => iter.next(),
            NodeIter::N16(iter) => iter.next(),
            NodeIter::N48(iter) => iter.next(),
            NodeIter::N256(iter) => iter.next(),
            NodeIter::NLinear(iter) => iter.next(),
        }
    }
}

#[repr(C)]
pub(crate) struct BaseNode {
    pub(crate) meta: NodeMeta,
}

#[repr(C)]
pub(crate) struct NodeMeta {
    prefix_len: u32,
    count: u16,
    node_type: NodeType,
    prefix: Prefix,
}

mod layout_assertion {
    use super::*;
    const _: () = assert!(std::mem::size_of::<NodeMeta>() == 16);
    const _: () = assert!(std::mem::align_of::<NodeMeta>() == 4);
    const _: () = assert!(std::mem::size_of::<BaseNode>() == 16);
}

impl NodeMeta {
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub(crate) fn inc_count(&mut self) {
        self.count += 1;
    }

    #[inline]
    pub(crate) fn dec_count(&mut self) {
        debug_assert!(self.count > 0);
        self.count -= 1;
    }

    #[inline]
    pub(crate) fn set_count(&mut self, count: u16) {
        self.count = count;
    }
}

macro_rules! gen_method {
    ($method_name:ident, ($($arg_n:ident : $args:ty),*), $return:ty) => {
        impl BaseNode {
            pub(crate) fn $method_name(&self, $($arg_n : $args),*) -> $return {
                match self.get_type() {
                    NodeType::N4 => self.as_n4().$method_name($($arg_n),*),
                    NodeType::N16 => self.as_n16().$method_name($($arg_n),*),
                    NodeType::N48 => self.as_n48().$method_name($($arg_n),*),
                    NodeType::N256 => self.as_n256().$method_name($($arg_n),*),
                    NodeType::NLinear => self.as_nlinear().$method_name($($arg_n),*),
                }
            }
        }
    };
}

macro_rules! gen_method_mut {
    ($method_name:ident, ($($arg_n:ident : $args:ty),*), $return:ty) => {
        impl BaseNode {
            pub(crate) fn $method_name(&mut self, $($arg_n : $args),*) -> $return {
                match self.get_type() {
                    NodeType::N4 => self.as_n4_mut().$method_name($($arg_n),*),
                    NodeType::N16 => self.as_n16_mut().$method_name($($arg_n),*),
                    NodeType::N48 => self.as_n48_mut().$method_name($($arg_n),*),
                    NodeType::N256 => self.as_n256_mut().$method_name($($arg_n),*),
                    NodeType::NLinear => self.as_nlinear_mut().$method_name($($arg_n),*),
                }
            }
        }
    };
}

gen_method!(get_child, (k: u8), Option<NodePtr>);
gen_method!(get_children, (start: u8, end: u8), NodeIter<'_>);
gen_method_mut!(get_child_mut, (k: u8), Option<&mut NodePtr>);
gen_method_mut!(remove, (k: u8), ());

macro_rules! gen_casts {
    ($as_ref:ident, $as_mut:ident, $concrete:ty, $type_tag:expr) => {
        impl BaseNode {
            pub(crate) fn $as_ref(&self) -> &$concrete {
                debug_assert!(self.get_type() == $type_tag);
                unsafe { &*(self as *const BaseNode as *const $concrete) }
            }

            pub(crate) fn $as_mut(&mut self) -> &mut $concrete {
                debug_assert!(self.get_type() == $type_tag);
                unsafe { &mut *(self as *mut BaseNode as *mut $concrete) }
            }
        }
    };
}

gen_casts!(as_n4, as_n4_mut, Node4, NodeType::N4);
gen_casts!(as_n16, as_n16_mut, Node16, NodeType::N16);
gen_casts!(as_n48, as_n48_mut, Node48, NodeType::N48);
gen_casts!(as_n256, as_n256_mut, Node256, NodeType::N256);
gen_casts!(as_nlinear, as_nlinear_mut, NodeLinear, NodeType::NLinear);

impl BaseNode {
    pub(crate) fn new(node_type: NodeType, prefix: &[u8]) -> Self {
        assert!(prefix.len() <= MAX_PREFIX_LEN);
        let mut prefix_v: Prefix = [0; MAX_PREFIX_LEN];
        prefix_v[..prefix.len()].copy_from_slice(prefix);

        BaseNode {
            meta: NodeMeta {
                prefix_len: prefix.len() as u32,
                count: 0,
                node_type,
                prefix: prefix_v,
            },
        }
    }

    pub(crate) fn make_node<'a, N: Node, A: Allocator>(
        prefix: &[u8],
        allocator: &'a A,
    ) -> Result<AllocatedNode<'a, N, A>, OOMError> {
        let layout = N::get_type().node_layout();
        let ptr = allocator.allocate_zeroed(layout)?;
        let base_ptr = ptr.as_ptr() as *mut BaseNode;
        let node = BaseNode::new(N::get_type(), prefix);
        unsafe {
            std::ptr::write(base_ptr, node);

            if matches!(N::get_type(), NodeType::N48) {
                (*(base_ptr as *mut Node48)).init_empty();
            }

            Ok(AllocatedNode::new(
                NonNull::new_unchecked(base_ptr as *mut N),
                allocator,
            ))
        }
    }

    /// # Safety
    /// `node` must point to a node made by `make_node` with the same
    /// allocator, and no references into it may outlive this call.
    pub(crate) unsafe fn drop_node<A: Allocator>(node: NonNull<BaseNode>, allocator: &A) {
        let layout = node.as_ref().get_type().node_layout();
        allocator.deallocate(node.cast::<u8>(), layout);
    }

    #[inline]
    pub(crate) fn get_type(&self) -> NodeType {
        self.meta.node_type
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.meta.count()
    }

    /// Logical length of the compressed path, which can exceed the number of
    /// bytes stored inline.
    #[inline]
    pub(crate) fn prefix_len(&self) -> usize {
        self.meta.prefix_len as usize
    }

    /// The inline prefix bytes: the first `min(prefix_len, MAX_PREFIX_LEN)`
    /// bytes of the compressed path.
    #[inline]
    pub(crate) fn prefix(&self) -> &[u8] {
        let stored = (self.meta.prefix_len as usize).min(MAX_PREFIX_LEN);
        unsafe { self.meta.prefix.get_unchecked(..stored) }
    }

    pub(crate) fn set_prefix(&mut self, bytes: &[u8], prefix_len: usize) {
        debug_assert!(bytes.len() == prefix_len.min(MAX_PREFIX_LEN));
        self.meta.prefix_len = prefix_len as u32;
        self.meta.prefix[..bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn copy_prefix(src: &BaseNode, dst: &mut BaseNode) {
        dst.meta.prefix_len = src.meta.prefix_len;
        dst.meta.prefix = src.meta.prefix;
    }

    /// Add a child under `key`, replacing `*node_ref` with the next larger
    /// node type when the current one is full. The old node is freed at the
    /// point of replacement.
    pub(crate) fn insert_and_grow<A: Allocator>(
        node_ref: &mut NodePtr,
        key: u8,
        val: NodePtr,
        allocator: &A,
    ) -> Result<(), OOMError> {
        let node_type = unsafe { node_ref.as_sub_node_unchecked().as_ref().get_type() };
        match node_type {
            NodeType::N4 => Self::insert_grow::<Node4, Node16, A>(node_ref, key, val, allocator),
            NodeType::N16 => Self::insert_grow::<Node16, Node48, A>(node_ref, key, val, allocator),
            NodeType::N48 => Self::insert_grow::<Node48, Node256, A>(node_ref, key, val, allocator),
            // N256 and the learned node cannot overflow
            NodeType::N256 => Self::insert_grow::<Node256, Node256, A>(node_ref, key, val, allocator),
            NodeType::NLinear => {
                let mut sub = unsafe { node_ref.as_sub_node_unchecked() };
                unsafe { sub.as_mut() }.as_nlinear_mut().insert(key, val);
                Ok(())
            }
        }
    }

    fn insert_grow<CurT: Node, BiggerT: Node, A: Allocator>(
        node_ref: &mut NodePtr,
        key: u8,
        val: NodePtr,
        allocator: &A,
    ) -> Result<(), OOMError> {
        let sub = unsafe { node_ref.as_sub_node_unchecked() };
        let cur = unsafe { &mut *sub.cast::<CurT>().as_ptr() };

        if !cur.is_full() {
            cur.insert(key, val);
            return Ok(());
        }

        let mut bigger = BaseNode::make_node::<BiggerT, A>(&[], allocator)?;
        BaseNode::copy_prefix(cur.base(), bigger.as_mut().base_mut());
        cur.copy_to(bigger.as_mut());
        bigger.as_mut().insert(key, val);

        *node_ref = bigger.into_node_ptr();
        unsafe {
            BaseNode::drop_node(sub, allocator);
        }
        Ok(())
    }

    /// Replace `*node_ref` with the next smaller node type, moving the
    /// children over. Called exactly when the count hits the shrink
    /// threshold so repeated erases cannot thrash.
    pub(crate) fn shrink<CurT: Node, SmallerT: Node, A: Allocator>(
        node_ref: &mut NodePtr,
        allocator: &A,
    ) -> Result<(), OOMError> {
        let sub = unsafe { node_ref.as_sub_node_unchecked() };
        let cur = unsafe { &*sub.cast::<CurT>().as_ptr() };

        let mut smaller = BaseNode::make_node::<SmallerT, A>(&[], allocator)?;
        BaseNode::copy_prefix(cur.base(), smaller.as_mut().base_mut());
        cur.copy_to(smaller.as_mut());

        *node_ref = smaller.into_node_ptr();
        unsafe {
            BaseNode::drop_node(sub, allocator);
        }
        Ok(())
    }
}
