use super::base_node::{BaseNode, Node, NodeIter, NodeType};
use super::node_ptr::NodePtr;

/// Fan-out of the learned node.
pub(crate) const LINEAR_FANOUT: usize = 10;

/// A learned inner node. Instead of a stored byte-to-slot mapping, the child
/// slot for a branch byte `b` is `clamp(floor(slope * b + intercept), 0, 9)`.
/// The model is fitted once by the bulk loader; the node never grows or
/// shrinks afterwards. The fitted slope is non-negative, so bucket order
/// agrees with branch-byte order.
///
/// A learned node does not consume a key byte on descent: the byte it
/// inspects is branched on again by the radix subtree inside the bucket.
#[repr(C)]
#[repr(align(8))]
pub(crate) struct NodeLinear {
    base: BaseNode,
    slope: f64,
    intercept: f64,
    children: [NodePtr; LINEAR_FANOUT],
}

const _: () = assert!(std::mem::size_of::<NodeLinear>() == 112);
const _: () = assert!(std::mem::align_of::<NodeLinear>() == 8);

impl NodeLinear {
    #[inline]
    pub(crate) fn bucket(&self, key: u8) -> usize {
        let predicted = (self.slope * key as f64 + self.intercept).floor();
        if predicted < 0.0 {
            0
        } else if predicted >= LINEAR_FANOUT as f64 {
            LINEAR_FANOUT - 1
        } else {
            predicted as usize
        }
    }

    pub(crate) fn set_model(&mut self, slope: f64, intercept: f64) {
        debug_assert!(slope >= 0.0);
        self.slope = slope;
        self.intercept = intercept;
    }

    pub(crate) fn bucket_slot_mut(&mut self, bucket: usize) -> &mut NodePtr {
        &mut self.children[bucket]
    }

    /// The bulk loader fills bucket slots directly; this re-derives the
    /// child count afterwards.
    pub(crate) fn recount(&mut self) {
        let count = self.children.iter().filter(|c| !c.is_null()).count();
        self.base.meta.set_count(count as u16);
    }
}

pub(crate) struct NodeLinearIter<'a> {
    cur: usize,
    end: usize,
    node: &'a NodeLinear,
}

impl Iterator for NodeLinearIter<'_> {
    type Item = (u8, NodePtr);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cur > self.end {
                return None;
            }

            let bucket = self.cur;
            self.cur += 1;

            let child = self.node.children[bucket];
            if !child.is_null() {
                // the yielded key is the bucket index, not a branch byte
                return Some((bucket as u8, child));
            }
        }
    }
}

impl Node for NodeLinear {
    fn get_type() -> NodeType {
        NodeType::NLinear
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
        let bucket = self.bucket(key);
        debug_assert!(self.children[bucket].is_null());
        self.children[bucket] = child;
        self.base.meta.inc_count();
    }

    fn get_child(&self, key: u8) -> Option<NodePtr> {
        let child = self.children[self.bucket(key)];
        if child.is_null() {
            None
        } else {
            Some(child)
        }
    }

    fn get_child_mut(&mut self, key: u8) -> Option<&mut NodePtr> {
        let bucket = self.bucket(key);
        if self.children[bucket].is_null() {
            None
        } else {
            Some(&mut self.children[bucket])
        }
    }

    fn get_children(&self, start: u8, end: u8) -> NodeIter<'_> {
        NodeIter::NLinear(NodeLinearIter {
            cur: start as usize,
            end: (end as usize).min(LINEAR_FANOUT - 1),
            node: self,
        })
    }

    // The slot may already be null when a collapsed subtree is unlinked.
    fn remove(&mut self, key: u8) {
        let bucket = self.bucket(key);
        self.children[bucket] = NodePtr::null();
        self.base.meta.dec_count();
    }

    fn copy_to<N: Node>(&self, _dst: &mut N) {
        unreachable!("learned nodes never change size")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_node(slope: f64, intercept: f64) -> NodeLinear {
        NodeLinear {
            base: BaseNode::new(NodeType::NLinear, &[]),
            slope,
            intercept,
            children: [NodePtr::null(); LINEAR_FANOUT],
        }
    }

    #[test]
    fn test_bucket_clamping() {
        // a model that predicts below 0 for small bytes and above 9 for
        // large ones must clamp to the edge buckets
        let node = create_test_node(0.1, -5.0);
        assert_eq!(node.bucket(0), 0);
        assert_eq!(node.bucket(40), 0);
        assert_eq!(node.bucket(255), 9);

        let node = create_test_node(1.0, 0.0);
        assert_eq!(node.bucket(0), 0);
        assert_eq!(node.bucket(9), 9);
        assert_eq!(node.bucket(200), 9);
    }

    #[test]
    fn test_bucket_is_monotone() {
        let node = create_test_node(10.0 / 256.0, 0.0);
        let mut last = 0;
        for byte in 0..=255u8 {
            let bucket = node.bucket(byte);
            assert!(bucket >= last);
            last = bucket;
        }
        assert_eq!(last, 9);
    }

    #[test]
    fn test_node_operations() {
        let mut node = create_test_node(10.0 / 256.0, 0.0);

        assert_eq!(NodeLinear::get_type(), NodeType::NLinear);
        assert!(!node.is_full());

        // bytes 0 and 200 predict distinct buckets under this model
        node.insert(0, NodePtr::from_payload(0x1000));
        node.insert(200, NodePtr::from_payload(0x2000));

        assert_eq!(node.base().meta.count(), 2);
        assert!(node.get_child(0).is_some());
        assert!(node.get_child(200).is_some());
        // byte 100 predicts bucket 3, which is empty
        assert!(node.get_child(100).is_none());

        node.remove(200);
        assert_eq!(node.base().meta.count(), 1);
        assert!(node.get_child(200).is_none());
    }

    #[test]
    fn test_recount() {
        let mut node = create_test_node(0.0, 0.0);
        *node.bucket_slot_mut(0) = NodePtr::from_payload(1);
        *node.bucket_slot_mut(4) = NodePtr::from_payload(2);
        *node.bucket_slot_mut(9) = NodePtr::from_payload(3);
        node.recount();
        assert_eq!(node.base().meta.count(), 3);
    }

    #[test]
    fn test_iterator_skips_empty_buckets() {
        let mut node = create_test_node(0.0, 0.0);
        *node.bucket_slot_mut(2) = NodePtr::from_payload(1);
        *node.bucket_slot_mut(7) = NodePtr::from_payload(2);
        node.recount();

        let buckets: Vec<u8> = node.get_children(0, 255).map(|(b, _)| b).collect();
        assert_eq!(buckets, vec![2, 7]);
    }
}
