use std::fmt::Display;
use std::ptr::NonNull;

use crate::{
    nodes::{BaseNode, NodeType, LINEAR_FANOUT},
    okra_inner::{OkraInner, TreeVisitor},
    Allocator,
};

#[derive(Default, Debug, serde::Serialize)]
pub struct NodeStats(Vec<LevelStats>);

impl Display for NodeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn calc_load_factor(n: (usize, usize), scale: usize) -> f64 {
            if n.0 == 0 {
                return 0.0;
            }
            (n.1 as f64) / (n.0 as f64 * scale as f64)
        }

        let mut total_node = 0;
        let mut total_f = 0.0;

        for l in self.0.iter() {
            total_node += l.n4.0;
            total_node += l.n16.0;
            total_node += l.n48.0;
            total_node += l.n256.0;
            total_node += l.nlinear.0;

            total_f += l.n4.1 as f64 / 4.0;
            total_f += l.n16.1 as f64 / 16.0;
            total_f += l.n48.1 as f64 / 48.0;
            total_f += l.n256.1 as f64 / 256.0;
            total_f += l.nlinear.1 as f64 / LINEAR_FANOUT as f64;

            writeln!(
                f,
                "Level: {} --- || N4: {:8}, {:8.2} || N16: {:8}, {:8.2} || N48: {:8}, {:8.2} || N256: {:8}, {:8.2} || NL: {:8}, {:8.2} ||",
                l.level,
                l.n4.0,
                calc_load_factor(l.n4, 4),
                l.n16.0,
                calc_load_factor(l.n16, 16),
                l.n48.0,
                calc_load_factor(l.n48, 48),
                l.n256.0,
                calc_load_factor(l.n256, 256),
                l.nlinear.0,
                calc_load_factor(l.nlinear, LINEAR_FANOUT),
            )?;
        }

        let load_factor = total_f / (total_node as f64);
        if load_factor < 0.5 {
            writeln!(f, "Load factor: {:.2} (too low)", load_factor)?;
        } else {
            writeln!(f, "Load factor: {:.2}", load_factor)?;
        }

        Ok(())
    }
}

#[derive(Debug, serde::Serialize, Clone)]
pub struct LevelStats {
    level: usize,
    n4: (usize, usize), // (node count, child count)
    n16: (usize, usize),
    n48: (usize, usize),
    n256: (usize, usize),
    nlinear: (usize, usize),
}

impl LevelStats {
    fn new_level(level: usize) -> Self {
        Self {
            level,
            n4: (0, 0),
            n16: (0, 0),
            n48: (0, 0),
            n256: (0, 0),
            nlinear: (0, 0),
        }
    }
}

impl NodeStats {
    pub fn total_nodes(&self) -> usize {
        self.0
            .iter()
            .map(|l| l.n4.0 + l.n16.0 + l.n48.0 + l.n256.0 + l.nlinear.0)
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn nodes_of(&self, node_type: NodeType) -> usize {
        self.0
            .iter()
            .map(|l| match node_type {
                NodeType::N4 => l.n4.0,
                NodeType::N16 => l.n16.0,
                NodeType::N48 => l.n48.0,
                NodeType::N256 => l.n256.0,
                NodeType::NLinear => l.nlinear.0,
            })
            .sum()
    }
}

struct StatsVisitor {
    stats: NodeStats,
}

impl TreeVisitor for StatsVisitor {
    fn pre_visit_sub_node(&mut self, node: NonNull<BaseNode>, tree_level: usize) {
        if self.stats.0.len() <= tree_level {
            self.stats.0.push(LevelStats::new_level(tree_level));
        }

        let node = unsafe { node.as_ref() };
        let slot = match node.get_type() {
            NodeType::N4 => &mut self.stats.0[tree_level].n4,
            NodeType::N16 => &mut self.stats.0[tree_level].n16,
            NodeType::N48 => &mut self.stats.0[tree_level].n48,
            NodeType::N256 => &mut self.stats.0[tree_level].n256,
            NodeType::NLinear => &mut self.stats.0[tree_level].nlinear,
        };
        slot.0 += 1;
        slot.1 += node.count();
    }
}

impl<A: Allocator> OkraInner<A> {
    /// Returns the node stats for the tree.
    pub(crate) fn stats(&self) -> NodeStats {
        let mut visitor = StatsVisitor {
            stats: NodeStats::default(),
        };
        self.dfs_visitor(&mut visitor);
        visitor.stats
    }
}
