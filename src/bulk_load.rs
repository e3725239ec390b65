//! Bulk construction through learned nodes.
//!
//! Instead of point-inserting a dense dataset key by key, the loader fits a
//! linear model over the histogram of the discriminating key byte and
//! splits the input into ten buckets in one pass, recursing per bucket.
//! Small buckets fall back to point insertion, which produces ordinary
//! radix subtrees under the learned spine.

use crate::{
    error::OOMError,
    key::load_key,
    nodes::{BaseNode, Node, NodeLinear, NodePtr, LINEAR_FANOUT, MAX_KEY_LEN, MAX_PREFIX_LEN},
    okra_inner::OkraInner,
    Allocator,
};

/// A bucket holds at most this many keys before it gets its own learned
/// node; at or below it, keys are point-inserted around a seed leaf.
const POINT_INSERT_LIMIT: usize = 8;

impl<A: Allocator> OkraInner<A> {
    /// Builds the tree over `values`. The tree must be empty.
    pub(crate) fn bulk_load(&mut self, values: &[u64]) -> Result<(), OOMError> {
        debug_assert!(self.root.is_null());
        let OkraInner { root, allocator } = self;
        Self::bulk_rec(root, allocator, values, 0)
    }

    fn bulk_rec(
        node_ref: &mut NodePtr,
        allocator: &A,
        values: &[u64],
        mut depth: usize,
    ) -> Result<(), OOMError> {
        let n = values.len();
        match n {
            0 => return Ok(()),
            1 => {
                if node_ref.is_null() {
                    *node_ref = NodePtr::from_payload(values[0] as usize);
                }
                return Ok(());
            }
            2..=POINT_INSERT_LIMIT => {
                // the seed leaf, if any, is values[0]; re-inserting it is a
                // no-op replace
                for v in values {
                    let key = load_key(*v as usize);
                    Self::insert_rec(node_ref, allocator, &key, depth, *v as usize)?;
                }
                return Ok(());
            }
            _ => {}
        }

        // absorb the bytes every key agrees on into the node's prefix
        let first_key = load_key(values[0] as usize);
        let limit = MAX_PREFIX_LEN.min(MAX_KEY_LEN - depth);
        let mut shared = 0;
        'extend: while shared < limit {
            let byte = first_key[depth + shared];
            for v in &values[1..] {
                if load_key(*v as usize)[depth + shared] != byte {
                    break 'extend;
                }
            }
            shared += 1;
        }

        if depth + shared >= MAX_KEY_LEN {
            // the whole partition is one key, repeated
            if node_ref.is_null() {
                *node_ref = NodePtr::from_payload(values[0] as usize);
            }
            return Ok(());
        }

        if node_ref.is_null() {
            *node_ref = BaseNode::make_node::<NodeLinear, A>(&[], allocator)?.into_node_ptr();
        }
        let mut sub = unsafe { node_ref.as_sub_node_unchecked() };
        let linear = unsafe { sub.as_mut() }.as_nlinear_mut();

        linear
            .base_mut()
            .set_prefix(&first_key[depth..depth + shared], shared);
        depth += shared;

        let (slope, intercept) = fit_buckets(values, depth);
        linear.set_model(slope, intercept);

        let mut buckets: [Vec<u64>; LINEAR_FANOUT] = Default::default();
        for v in values {
            let byte = load_key(*v as usize)[depth];
            buckets[linear.bucket(byte)].push(*v);
        }

        if shared == 0 && buckets.iter().any(|b| b.len() == n) {
            // the model failed to separate anything and no prefix was
            // consumed; recursing would not make progress
            for v in values {
                let key = load_key(*v as usize);
                Self::insert_rec(node_ref, allocator, &key, depth, *v as usize)?;
            }
            return Ok(());
        }

        for (bucket, bucket_values) in buckets.iter().enumerate() {
            if bucket_values.is_empty() {
                continue;
            }
            let slot = linear.bucket_slot_mut(bucket);
            if bucket_values.len() <= POINT_INSERT_LIMIT {
                *slot = NodePtr::from_payload(bucket_values[0] as usize);
            }
            Self::bulk_rec(slot, allocator, bucket_values, depth)?;
        }
        linear.recount();

        Ok(())
    }
}

/// Fits `bucket = slope * byte + intercept` by weighted least squares. The
/// target for the sample of rank `j` (in ascending byte order) is the
/// quantile `j * 10 / n`, so an exact fit would pack `n / 10` keys per
/// bucket.
pub(crate) fn fit_buckets(values: &[u64], depth: usize) -> (f64, f64) {
    let mut counts = [0usize; 256];
    for v in values {
        counts[load_key(*v as usize)[depth] as usize] += 1;
    }

    let n = values.len();
    let mut rank = 0usize;
    let (mut s_x, mut s_y, mut s_xy, mut s_xx) = (0f64, 0f64, 0f64, 0f64);
    for (byte, count) in counts.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let x = byte as f64;
        s_x += x * *count as f64;
        s_xx += x * x * *count as f64;
        for _ in 0..*count {
            let y = ((rank * LINEAR_FANOUT) / n).min(LINEAR_FANOUT - 1) as f64;
            s_y += y;
            s_xy += x * y;
            rank += 1;
        }
    }

    let n = n as f64;
    let denominator = n * s_xx - s_x * s_x;
    if denominator == 0.0 {
        // a single distinct byte; everything lands in bucket 0
        return (0.0, 0.0);
    }
    let slope = (n * s_xy - s_x * s_y) / denominator;
    let intercept = (s_y - slope * s_x) / n;
    (slope, intercept)
}
