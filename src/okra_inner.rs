use std::ptr::NonNull;

use crate::{
    error::OOMError,
    key::load_key,
    nodes::{
        BaseNode, Node, Node16, Node256, Node4, Node48, NodePtr, NodeType, PtrType, MAX_KEY_LEN,
        MAX_PREFIX_LEN,
    },
    Allocator, DefaultAllocator,
};

/// The tree proper: a single owned object graph hanging off `root`. A null
/// root is the empty tree. Mutation goes through `&mut self`, so there is
/// never a concurrent reader to worry about.
pub(crate) struct OkraInner<A: Allocator = DefaultAllocator> {
    pub(crate) root: NodePtr,
    pub(crate) allocator: A,
}

// The raw child words are exclusively owned by the tree, so moving the tree
// between threads or sharing it for reads is sound.
unsafe impl<A: Allocator + Send> Send for OkraInner<A> {}
unsafe impl<A: Allocator + Sync> Sync for OkraInner<A> {}

impl Default for OkraInner {
    fn default() -> Self {
        Self::new(DefaultAllocator {})
    }
}

/// Read-only walk over the tree. Payload visits see the tuple id; sub-node
/// visits bracket the children.
pub(crate) trait TreeVisitor {
    fn visit_payload(&mut self, _payload: usize) {}
    fn pre_visit_sub_node(&mut self, _node: NonNull<BaseNode>, _tree_level: usize) {}
    fn post_visit_sub_node(&mut self, _node: NonNull<BaseNode>, _tree_level: usize) {}
}

struct DropVisitor<'a, A: Allocator> {
    allocator: &'a A,
}

impl<A: Allocator> TreeVisitor for DropVisitor<'_, A> {
    fn post_visit_sub_node(&mut self, node: NonNull<BaseNode>, _tree_level: usize) {
        unsafe {
            BaseNode::drop_node(node, self.allocator);
        }
    }
}

struct PayloadCollector {
    payloads: Vec<usize>,
}

impl TreeVisitor for PayloadCollector {
    fn visit_payload(&mut self, payload: usize) {
        self.payloads.push(payload);
    }
}

struct PayloadCounter {
    count: usize,
}

impl TreeVisitor for PayloadCounter {
    fn visit_payload(&mut self, _payload: usize) {
        self.count += 1;
    }
}

impl<A: Allocator> Drop for OkraInner<A> {
    fn drop(&mut self) {
        let mut visitor = DropVisitor {
            allocator: &self.allocator,
        };
        if !self.root.is_null() {
            Self::recursive_dfs(self.root, 0, &mut visitor);
        }
    }
}

impl<A: Allocator> OkraInner<A> {
    pub(crate) fn new(allocator: A) -> Self {
        OkraInner {
            root: NodePtr::null(),
            allocator,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Optimistic lookup: inline prefixes are verified during the descent,
    /// prefixes beyond the inline budget are skipped and settled by one
    /// byte-wise comparison against the reached leaf.
    pub(crate) fn get(&self, key: &[u8; MAX_KEY_LEN]) -> Option<usize> {
        if self.root.is_null() {
            return None;
        }

        let mut node = self.root;
        let mut depth = 0usize;
        let mut skipped_prefix = false;

        loop {
            match node.downcast() {
                PtrType::Payload(tid) => {
                    if !skipped_prefix && depth == MAX_KEY_LEN {
                        return Some(tid);
                    }
                    let leaf_key = load_key(tid);
                    let start = if skipped_prefix { 0 } else { depth };
                    if leaf_key[start..] != key[start..] {
                        return None;
                    }
                    return Some(tid);
                }
                PtrType::SubNode(sub) => {
                    let inner = unsafe { sub.as_ref() };
                    let prefix_len = inner.prefix_len();
                    if prefix_len > 0 {
                        if prefix_len <= MAX_PREFIX_LEN {
                            for (pos, p) in inner.prefix().iter().enumerate() {
                                if key[depth + pos] != *p {
                                    return None;
                                }
                            }
                        } else {
                            skipped_prefix = true;
                        }
                        depth += prefix_len;
                    }

                    debug_assert!(depth < MAX_KEY_LEN);
                    node = inner.get_child(key[depth])?;
                    // a learned node peeks at the byte without consuming it
                    if inner.get_type() != NodeType::NLinear {
                        depth += 1;
                    }
                }
            }
        }
    }

    /// Pessimistic lookup: every prefix byte is verified, reconstructing
    /// from the minimum leaf where the inline budget was exceeded.
    pub(crate) fn get_verified(&self, key: &[u8; MAX_KEY_LEN]) -> Option<usize> {
        if self.root.is_null() {
            return None;
        }

        let mut node = self.root;
        let mut depth = 0usize;

        loop {
            match node.downcast() {
                PtrType::Payload(tid) => {
                    return if Self::leaf_matches(tid, key, depth) {
                        Some(tid)
                    } else {
                        None
                    };
                }
                PtrType::SubNode(sub) => {
                    let inner = unsafe { sub.as_ref() };
                    let prefix_len = inner.prefix_len();
                    if prefix_len > 0 {
                        if Self::prefix_mismatch(inner, key, depth) < prefix_len {
                            return None;
                        }
                        depth += prefix_len;
                    }

                    node = inner.get_child(key[depth])?;
                    if inner.get_type() != NodeType::NLinear {
                        depth += 1;
                    }
                }
            }
        }
    }

    pub(crate) fn insert(
        &mut self,
        key: &[u8; MAX_KEY_LEN],
        tid: usize,
    ) -> Result<Option<usize>, OOMError> {
        let OkraInner { root, allocator } = self;
        Self::insert_rec(root, allocator, key, 0, tid)
    }

    pub(crate) fn insert_rec(
        node_ref: &mut NodePtr,
        allocator: &A,
        key: &[u8; MAX_KEY_LEN],
        mut depth: usize,
        tid: usize,
    ) -> Result<Option<usize>, OOMError> {
        if node_ref.is_null() {
            *node_ref = NodePtr::from_payload(tid);
            return Ok(None);
        }

        match node_ref.downcast() {
            PtrType::Payload(existing) => {
                let existing_key = load_key(existing);
                if existing_key == *key {
                    *node_ref = NodePtr::from_payload(tid);
                    return Ok(Some(existing));
                }

                // Split the leaf: both keys agree on everything up to
                // `depth`, so scan forward for the first differing byte and
                // hang both leaves off a fresh Node4.
                let mut mismatch = 0;
                while existing_key[depth + mismatch] == key[depth + mismatch] {
                    mismatch += 1;
                    debug_assert!(depth + mismatch < MAX_KEY_LEN);
                }

                let mut n4 =
                    BaseNode::make_node::<Node4, A>(&key[depth..depth + mismatch], allocator)?;
                n4.as_mut()
                    .insert(existing_key[depth + mismatch], NodePtr::from_payload(existing));
                n4.as_mut()
                    .insert(key[depth + mismatch], NodePtr::from_payload(tid));
                *node_ref = n4.into_node_ptr();
                Ok(None)
            }
            PtrType::SubNode(mut sub) => {
                let inner = unsafe { sub.as_mut() };
                let prefix_len = inner.prefix_len();
                if prefix_len > 0 {
                    let mismatch = Self::prefix_mismatch(inner, key, depth);
                    if mismatch < prefix_len {
                        return Self::split_prefix(node_ref, allocator, key, depth, mismatch, tid);
                    }
                    depth += prefix_len;
                }

                let key_byte = key[depth];
                let next_depth = if inner.get_type() == NodeType::NLinear {
                    depth
                } else {
                    depth + 1
                };

                match inner.get_child_mut(key_byte) {
                    Some(child_ref) => Self::insert_rec(child_ref, allocator, key, next_depth, tid),
                    None => {
                        BaseNode::insert_and_grow(
                            node_ref,
                            key_byte,
                            NodePtr::from_payload(tid),
                            allocator,
                        )?;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// The key diverges inside this node's compressed path. Introduce a
    /// Node4 holding the matching part; the original node keeps the tail of
    /// its prefix and hangs off the byte where the paths separate.
    fn split_prefix(
        node_ref: &mut NodePtr,
        allocator: &A,
        key: &[u8; MAX_KEY_LEN],
        depth: usize,
        mismatch: usize,
        tid: usize,
    ) -> Result<Option<usize>, OOMError> {
        let original = *node_ref;
        let mut sub = unsafe { original.as_sub_node_unchecked() };
        let inner = unsafe { sub.as_mut() };

        let prefix_len = inner.prefix_len();
        let mut old_prefix = [0u8; MAX_PREFIX_LEN];
        let inline_len = inner.prefix().len();
        old_prefix[..inline_len].copy_from_slice(inner.prefix());

        let mut n4 =
            BaseNode::make_node::<Node4, A>(&old_prefix[..mismatch.min(MAX_PREFIX_LEN)], allocator)?;
        if mismatch > MAX_PREFIX_LEN {
            n4.as_mut()
                .base_mut()
                .set_prefix(&old_prefix[..MAX_PREFIX_LEN], mismatch);
        }

        let remaining = prefix_len - mismatch - 1;
        let branch_byte = if prefix_len <= MAX_PREFIX_LEN {
            let byte = old_prefix[mismatch];
            inner.set_prefix(&old_prefix[mismatch + 1..prefix_len], remaining);
            byte
        } else {
            // the tail of the path is only materialized in the leaves
            let min_key = load_key(Self::minimum_payload(inner));
            let start = depth + mismatch + 1;
            let stored = remaining.min(MAX_PREFIX_LEN);
            inner.set_prefix(&min_key[start..start + stored], remaining);
            min_key[depth + mismatch]
        };

        n4.as_mut().insert(branch_byte, original);
        n4.as_mut().insert(key[depth + mismatch], NodePtr::from_payload(tid));
        *node_ref = n4.into_node_ptr();
        Ok(None)
    }

    pub(crate) fn remove(&mut self, key: &[u8; MAX_KEY_LEN]) -> Option<usize> {
        let OkraInner { root, allocator } = self;
        Self::erase_rec(root, allocator, key, 0)
    }

    fn erase_rec(
        node_ref: &mut NodePtr,
        allocator: &A,
        key: &[u8; MAX_KEY_LEN],
        mut depth: usize,
    ) -> Option<usize> {
        if node_ref.is_null() {
            return None;
        }

        match node_ref.downcast() {
            PtrType::Payload(tid) => {
                if load_key(tid) == *key {
                    *node_ref = NodePtr::null();
                    Some(tid)
                } else {
                    None
                }
            }
            PtrType::SubNode(mut sub) => {
                let inner = unsafe { sub.as_mut() };
                let prefix_len = inner.prefix_len();
                if prefix_len > 0 {
                    if Self::prefix_mismatch(inner, key, depth) < prefix_len {
                        return None;
                    }
                    depth += prefix_len;
                }

                let key_byte = key[depth];
                let next_depth = if inner.get_type() == NodeType::NLinear {
                    depth
                } else {
                    depth + 1
                };

                let child_ref = inner.get_child_mut(key_byte)?;
                if let PtrType::Payload(tid) = child_ref.downcast() {
                    return if load_key(tid) == *key {
                        Self::remove_child(node_ref, allocator, key_byte);
                        Some(tid)
                    } else {
                        None
                    };
                }

                let removed = Self::erase_rec(child_ref, allocator, key, next_depth);
                if removed.is_some() && child_ref.is_null() {
                    // a learned subtree emptied out below us
                    Self::remove_child(node_ref, allocator, key_byte);
                }
                removed
            }
        }
    }

    /// Remove the edge for `key_byte` and apply the structural transition
    /// the new count calls for. Thresholds fire on the exact transition
    /// count only, so re-erasing cannot thrash between sizes.
    fn remove_child(node_ref: &mut NodePtr, allocator: &A, key_byte: u8) {
        let mut sub = unsafe { node_ref.as_sub_node_unchecked() };
        let inner = unsafe { sub.as_mut() };

        match inner.get_type() {
            NodeType::N4 => {
                inner.remove(key_byte);
                if inner.count() == 1 {
                    Self::dissolve_n4(node_ref, allocator);
                }
            }
            NodeType::N16 => {
                inner.remove(key_byte);
                if inner.count() == 3 {
                    BaseNode::shrink::<Node16, Node4, A>(node_ref, allocator)
                        .expect("allocator failed while shrinking a node");
                }
            }
            NodeType::N48 => {
                inner.remove(key_byte);
                if inner.count() == 12 {
                    BaseNode::shrink::<Node48, Node16, A>(node_ref, allocator)
                        .expect("allocator failed while shrinking a node");
                }
            }
            NodeType::N256 => {
                inner.remove(key_byte);
                if inner.count() == 36 {
                    BaseNode::shrink::<Node256, Node48, A>(node_ref, allocator)
                        .expect("allocator failed while shrinking a node");
                }
            }
            NodeType::NLinear => {
                // learned nodes never rebalance, but an empty one dissolves
                // so that erasing every key empties the tree
                inner.remove(key_byte);
                if inner.count() == 0 {
                    *node_ref = NodePtr::null();
                    unsafe {
                        BaseNode::drop_node(sub, allocator);
                    }
                }
            }
        }
    }

    /// A one-way Node4 is spliced out: its prefix, its single branch byte
    /// and the surviving child's prefix become the child's new compressed
    /// path. A surviving leaf needs no prefix at all.
    fn dissolve_n4(node_ref: &mut NodePtr, allocator: &A) {
        let sub = unsafe { node_ref.as_sub_node_unchecked() };
        let inner = unsafe { sub.as_ref() };
        debug_assert!(inner.get_type() == NodeType::N4);

        let (branch_byte, child) = inner
            .get_children(0, 255)
            .next()
            .expect("a one-way node has exactly one child");

        if let PtrType::SubNode(mut child_sub) = child.downcast() {
            let child_node = unsafe { child_sub.as_mut() };

            let parent_len = inner.prefix_len();
            let mut joined = [0u8; MAX_PREFIX_LEN];
            let inline_len = inner.prefix().len();
            joined[..inline_len].copy_from_slice(inner.prefix());

            let mut stored = parent_len;
            if stored < MAX_PREFIX_LEN {
                joined[stored] = branch_byte;
                stored += 1;
            }
            if stored < MAX_PREFIX_LEN {
                let child_inline = child_node.prefix();
                let take = child_inline.len().min(MAX_PREFIX_LEN - stored);
                joined[stored..stored + take].copy_from_slice(&child_inline[..take]);
                stored += take;
            }

            let joined_len = child_node.prefix_len() + parent_len + 1;
            child_node.set_prefix(&joined[..stored.min(MAX_PREFIX_LEN)], joined_len);
        }

        *node_ref = child;
        unsafe {
            BaseNode::drop_node(sub, allocator);
        }
    }

    /// Length of the agreement between `key[depth..]` and this node's
    /// compressed path. Positions beyond the inline budget are compared
    /// against the minimum descendant leaf, which shares the full path.
    fn prefix_mismatch(node: &BaseNode, key: &[u8; MAX_KEY_LEN], depth: usize) -> usize {
        let prefix_len = node.prefix_len();

        for (pos, p) in node.prefix().iter().enumerate() {
            if key[depth + pos] != *p {
                return pos;
            }
        }

        if prefix_len > MAX_PREFIX_LEN {
            let min_key = load_key(Self::minimum_payload(node));
            for pos in MAX_PREFIX_LEN..prefix_len {
                if key[depth + pos] != min_key[depth + pos] {
                    return pos;
                }
            }
        }

        prefix_len
    }

    /// Payload of the leaf with the smallest key below `node`. Never
    /// allocates; every inner node has at least one descendant leaf.
    fn minimum_payload(node: &BaseNode) -> usize {
        let (_key, mut child) = node
            .get_children(0, 255)
            .next()
            .expect("inner nodes always have a child");
        loop {
            match child.downcast() {
                PtrType::Payload(tid) => return tid,
                PtrType::SubNode(sub) => {
                    child = unsafe { sub.as_ref() }
                        .get_children(0, 255)
                        .next()
                        .expect("inner nodes always have a child")
                        .1;
                }
            }
        }
    }

    #[inline]
    fn leaf_matches(tid: usize, key: &[u8; MAX_KEY_LEN], depth: usize) -> bool {
        depth == MAX_KEY_LEN || load_key(tid)[depth..] == key[depth..]
    }

    pub(crate) fn dfs_visitor<V: TreeVisitor>(&self, visitor: &mut V) {
        if !self.root.is_null() {
            Self::recursive_dfs(self.root, 0, visitor);
        }
    }

    fn recursive_dfs<V: TreeVisitor>(node: NodePtr, tree_level: usize, visitor: &mut V) {
        match node.downcast() {
            PtrType::Payload(tid) => visitor.visit_payload(tid),
            PtrType::SubNode(sub) => {
                visitor.pre_visit_sub_node(sub, tree_level);
                for (_key, child) in unsafe { sub.as_ref() }.get_children(0, 255) {
                    Self::recursive_dfs(child, tree_level + 1, visitor);
                }
                visitor.post_visit_sub_node(sub, tree_level);
            }
        }
    }

    /// All stored tuple ids in ascending key order.
    pub(crate) fn payloads(&self) -> Vec<usize> {
        let mut visitor = PayloadCollector {
            payloads: Vec::new(),
        };
        self.dfs_visitor(&mut visitor);
        visitor.payloads
    }

    pub(crate) fn value_count(&self) -> usize {
        let mut visitor = PayloadCounter { count: 0 };
        self.dfs_visitor(&mut visitor);
        visitor.count
    }
}

#[cfg(test)]
impl<A: Allocator> OkraInner<A> {
    /// Walks the whole tree and panics on any structural inconsistency:
    /// counts, key ordering, prefix agreement with the stored leaves, and
    /// bucket prediction in learned nodes.
    pub(crate) fn verify_structure(&self) {
        if !self.root.is_null() {
            Self::verify_rec(self.root, 0, true);
        }
    }

    fn verify_rec(node: NodePtr, depth: usize, is_root: bool) {
        let sub = match node.downcast() {
            PtrType::Payload(_) => return,
            PtrType::SubNode(sub) => sub,
        };
        let inner = unsafe { sub.as_ref() };

        let children: Vec<(u8, NodePtr)> = inner.get_children(0, 255).collect();
        assert_eq!(children.len(), inner.count(), "count does not match children");

        let (capacity, is_linear) = match inner.get_type() {
            NodeType::N4 => (4, false),
            NodeType::N16 => (16, false),
            NodeType::N48 => (48, false),
            NodeType::N256 => (256, false),
            NodeType::NLinear => (crate::nodes::LINEAR_FANOUT, true),
        };
        assert!(inner.count() <= capacity);
        if !is_root && !is_linear {
            assert!(inner.count() >= 2, "one-way radix node survived");
        }

        // N4/N16/N48/N256 iterate in ascending branch-byte order
        for pair in children.windows(2) {
            assert!(pair[0].0 < pair[1].0, "branch keys out of order");
        }

        let prefix_len = inner.prefix_len();
        let inline = inner.prefix();
        if prefix_len > 0 {
            let min_key = load_key(Self::minimum_payload(inner));
            assert_eq!(
                &min_key[depth..depth + inline.len()],
                inline,
                "inline prefix disagrees with the minimum leaf"
            );
        }
        let edge_pos = depth + prefix_len;
        assert!(edge_pos < MAX_KEY_LEN);

        for (edge, child) in children {
            assert!(!child.is_null());
            match child.downcast() {
                PtrType::Payload(tid) => {
                    let leaf_key = load_key(tid);
                    assert_eq!(&leaf_key[depth..depth + inline.len()], inline);
                    if is_linear {
                        let bucket = inner.as_nlinear().bucket(leaf_key[edge_pos]);
                        assert_eq!(bucket, edge as usize, "leaf in the wrong bucket");
                    } else {
                        assert_eq!(leaf_key[edge_pos], edge, "leaf under the wrong edge");
                    }
                }
                PtrType::SubNode(_) => {
                    let next_depth = if is_linear { edge_pos } else { edge_pos + 1 };
                    Self::verify_rec(child, next_depth, false);
                }
            }
        }
    }
}
