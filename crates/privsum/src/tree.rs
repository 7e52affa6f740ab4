//! Binary aggregation tree for continual release of private prefix sums.
//!
//! The tree is stored as a flat heap of `2L - 1` nodes where `L` is the
//! smallest power of two that is at least the declared capacity. Node `0` is
//! the root, the children of node `c` are `2c + 1` and `2c + 2`, and the `L`
//! leaves occupy the last `L` slots. Every node is seeded with one Gaussian
//! draw before any value arrives, so a prefix query that combines `O(log n)`
//! nodes carries `O(log² n)` noise variance instead of `O(n)`.

use privsum_traits::NoiseSource;

use crate::{Error, Result};

/// Array-backed binary aggregation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationTree {
    nodes: Box<[f64]>,
    capacity: usize,
    height: u32,
}

impl AggregationTree {
    /// Creates a tree able to hold `capacity` values, every node seeded with
    /// noise of standard deviation `sigma` drawn from `noise`.
    ///
    /// Returns an error if the capacity is zero or if `sigma` is negative or
    /// not finite.
    pub fn new<N: NoiseSource + ?Sized>(
        capacity: usize,
        sigma: f64,
        noise: &mut N,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_configuration("n must be positive"));
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(Error::invalid_configuration(format!(
                "sigma must be non-negative and finite, got {sigma}"
            )));
        }
        let leaves = capacity
            .checked_next_power_of_two()
            .ok_or_else(|| Error::invalid_configuration("capacity is too large"))?;
        let nodes = noise.sample_vec(sigma, 2 * leaves - 1).into_boxed_slice();
        Ok(Self {
            nodes,
            capacity,
            height: leaves.trailing_zeros(),
        })
    }

    /// The number of values this tree accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of leaves, a power of two.
    pub fn leaves(&self) -> usize {
        1 << self.height
    }

    /// The number of edges from the root to any leaf.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The current value of every node, root first.
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Adds `value` at position `index` and returns the private prefix sum
    /// over positions `0..=index`.
    ///
    /// The returned sum is only the intended estimate when exactly the
    /// positions `0..=index` have been filled.
    pub fn insert(&mut self, index: usize, value: f64) -> Result<f64> {
        if index >= self.capacity {
            return Err(Error::IndexOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        self.propagate(index, value);
        Ok(self.prefix_sum(index))
    }

    /// Adds `value` to the leaf of `index` and to each of its ancestors.
    fn propagate(&mut self, index: usize, value: f64) {
        let mut node = self.leaves() - 1 + index;
        while node > 0 {
            self.nodes[node] += value;
            node = (node - 1) / 2;
        }
        self.nodes[0] += value;
    }

    /// Sums the nodes of the canonical dyadic decomposition of `0..=index`.
    ///
    /// Walks from the root towards leaf `index`; at level `l` the bit `l` of
    /// `index + 1` (on `height + 1` bits) selects whether the left sibling of
    /// the cursor contributes, and bit `l` of `index` (on `height` bits)
    /// selects the child to descend into.
    fn prefix_sum(&self, index: usize) -> f64 {
        let height = self.height;
        let count = index + 1;
        let mut sum = 0.0;
        let mut cursor = 0usize;
        for level in 0..=height {
            if (count >> (height - level)) & 1 == 1 {
                sum += self.nodes[left_sibling(cursor)];
            }
            if level < height {
                cursor = if (index >> (height - 1 - level)) & 1 == 0 {
                    2 * cursor + 1
                } else {
                    2 * cursor + 2
                };
            }
        }
        sum
    }
}

/// The root is its own left sibling, as is every left (odd) child.
#[inline]
fn left_sibling(node: usize) -> usize {
    if node == 0 || node % 2 == 1 {
        node
    } else {
        node - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GaussianNoise;
    use proptest::collection::vec as prop_vec;
    use proptest::prelude::*;

    fn exact_tree(capacity: usize) -> AggregationTree {
        AggregationTree::new(capacity, 0.0, &mut GaussianNoise::with_seed(0)).unwrap()
    }

    #[test]
    fn test_shape() {
        for (capacity, leaves, height) in [
            (1, 1, 0),
            (2, 2, 1),
            (3, 4, 2),
            (4, 4, 2),
            (5, 8, 3),
            (1024, 1024, 10),
        ] {
            let tree = exact_tree(capacity);
            assert_eq!(tree.capacity(), capacity);
            assert_eq!(tree.leaves(), leaves);
            assert_eq!(tree.height(), height);
            assert_eq!(tree.nodes().len(), 2 * leaves - 1);
        }
    }

    #[test]
    fn test_invalid_configuration() {
        let mut noise = GaussianNoise::with_seed(0);
        assert!(matches!(
            AggregationTree::new(0, 1.0, &mut noise),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            AggregationTree::new(8, -0.5, &mut noise),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            AggregationTree::new(8, f64::NAN, &mut noise),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut tree = exact_tree(5);
        assert_eq!(
            tree.insert(5, 1.0),
            Err(Error::IndexOutOfRange {
                index: 5,
                capacity: 5
            })
        );
        // Position 5 has a leaf but lies beyond the declared capacity.
        assert_eq!(tree.leaves(), 8);
    }

    #[test]
    fn test_propagation_reaches_root() {
        let mut tree = exact_tree(4);
        tree.insert(2, 3.0).unwrap();
        // Leaf 2 is node 5, its parent is node 2.
        assert_eq!(tree.nodes(), &[3.0, 0.0, 3.0, 0.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_single_slot_tree() {
        let mut tree = exact_tree(1);
        assert_eq!(tree.insert(0, 4.5), Ok(4.5));
        assert_eq!(tree.nodes(), &[4.5]);
    }

    #[test]
    fn test_prefix_sums_without_noise() {
        let mut tree = exact_tree(4);
        let results: Vec<f64> = [1.0, 2.0, 3.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, v)| tree.insert(i, *v).unwrap())
            .collect();
        assert_eq!(results, vec![1.0, 3.0, 6.0, 10.0]);
    }

    #[test]
    fn test_query_uses_canonical_nodes() {
        // Tag every node with a distinct power of two so the sum identifies
        // exactly which nodes the query combined.
        struct Tags(f64);
        impl NoiseSource for Tags {
            fn sample(&mut self, _std_dev: f64) -> f64 {
                self.0 *= 2.0;
                self.0
            }
        }
        let tree = AggregationTree::new(8, 1.0, &mut Tags(0.5)).unwrap();
        let tag = |node: usize| 2f64.powi(node as i32);

        // [0, 0] is leaf 0 (node 7).
        assert_eq!(tree.prefix_sum(0), tag(7));
        // [0, 2] is node 3 (leaves 0..2) plus leaf 2 (node 9).
        assert_eq!(tree.prefix_sum(2), tag(3) + tag(9));
        // [0, 6] is node 1 (0..4), node 5 (4..6) and leaf 6 (node 13).
        assert_eq!(tree.prefix_sum(6), tag(1) + tag(5) + tag(13));
        // [0, 7] is the root alone.
        assert_eq!(tree.prefix_sum(7), tag(0));
    }

    #[test]
    fn test_noise_is_unbiased() {
        let values: Vec<f64> = (1..=6).map(f64::from).collect();
        let trials = 4000;
        let mut noise = GaussianNoise::with_seed(99);
        let mut means = vec![0.0; values.len()];
        for _ in 0..trials {
            let mut tree = AggregationTree::new(values.len(), 1.0, &mut noise).unwrap();
            for (i, v) in values.iter().enumerate() {
                means[i] += tree.insert(i, *v).unwrap() / trials as f64;
            }
        }
        let mut prefix = 0.0;
        for (i, v) in values.iter().enumerate() {
            prefix += v;
            // At most 4 unit-variance nodes per query: standard error < 0.04.
            assert!((means[i] - prefix).abs() < 0.2, "position {i}: {} vs {prefix}", means[i]);
        }
    }

    proptest! {
        #[test]
        fn prop_noise_free_prefix_sums(values in prop_vec(-1000i32..1000, 1..200)) {
            let mut tree = exact_tree(values.len());
            let mut expected = 0.0;
            for (i, v) in values.iter().enumerate() {
                expected += f64::from(*v);
                prop_assert_eq!(tree.insert(i, f64::from(*v)).unwrap(), expected);
            }
        }

        #[test]
        fn prop_totals_ignore_insertion_order(
            values in prop_vec(-1000i32..1000, 1..64),
            seed in any::<u64>()
        ) {
            let mut noise = GaussianNoise::with_seed(seed);
            let mut forward = AggregationTree::new(values.len(), 0.5, &mut noise).unwrap();
            let mut backward = forward.clone();
            for (i, v) in values.iter().enumerate() {
                forward.insert(i, f64::from(*v)).unwrap();
            }
            for (i, v) in values.iter().enumerate().rev() {
                backward.insert(i, f64::from(*v)).unwrap();
            }
            for (a, b) in forward.nodes().iter().zip(backward.nodes()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
