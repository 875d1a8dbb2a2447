use itertools::Itertools;

/// Type alias for sets, we use this to hide which type of set we are actually using.
/// Iteration follows insertion order; seeded generation relies on that.
pub type Set<S> = indexmap::IndexSet<S, fxhash::FxBuildHasher>;
/// Type alias for maps, we use this to hide which type of map we are actually using.
/// Iteration follows insertion order; seeded generation relies on that.
pub type Map<K, V> = indexmap::IndexMap<K, V, fxhash::FxBuildHasher>;

/// Distributes `items` over `count` sublists whose sizes differ by at most one.
/// The first `items.len() % count` buckets are the larger ones and concatenating
/// all buckets yields the input in its original order.
///
/// # Example
///
/// ```
/// use raben::math::bucketed;
///
/// assert_eq!(bucketed(vec![1, 2, 3, 4, 5], 3), vec![vec![1, 2], vec![3, 4], vec![5]]);
/// ```
pub fn bucketed<T>(items: Vec<T>, count: usize) -> Vec<Vec<T>> {
    assert!(count > 0, "need at least one bucket");
    let larger = items.len() % count;
    let base = items.len() / count;

    let mut items = items.into_iter();
    (0..count)
        .map(|i| {
            let size = if i < larger { base + 1 } else { base };
            items.by_ref().take(size).collect()
        })
        .collect()
}

/// Flat ordered cartesian product of the given dimensions, in lexicographic
/// order on the index tuple. Generation tasks use this to iterate every
/// combination of their parameter ranges.
pub fn cartesian_product<T: Clone>(dimensions: &[Vec<T>]) -> Vec<Vec<T>> {
    dimensions
        .iter()
        .map(|dim| dim.iter().cloned())
        .multi_cartesian_product()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{bucketed, cartesian_product};

    #[test]
    fn bucketed_spreads_remainder_over_leading_buckets() {
        assert_eq!(bucketed(vec![1, 2, 3, 4, 5], 3), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(bucketed(vec![1, 2, 3], 5), vec![vec![1], vec![2], vec![3], vec![], vec![]]);
        assert_eq!(bucketed(Vec::<u8>::new(), 2), vec![vec![], vec![]]);
    }

    #[test]
    fn bucketed_concatenation_is_identity() {
        for n in 0..20usize {
            for k in 1..6usize {
                let input: Vec<usize> = (0..n).collect();
                let buckets = bucketed(input.clone(), k);
                assert_eq!(buckets.len(), k);
                let (min, max) = buckets
                    .iter()
                    .fold((usize::MAX, 0), |(lo, hi), b| (lo.min(b.len()), hi.max(b.len())));
                assert!(max - min <= 1);
                assert_eq!(buckets.concat(), input);
            }
        }
    }

    #[test]
    fn cartesian_product_is_lexicographic() {
        let product = cartesian_product(&[vec![1, 2], vec![10, 20, 30]]);
        assert_eq!(
            product,
            vec![
                vec![1, 10],
                vec![1, 20],
                vec![1, 30],
                vec![2, 10],
                vec![2, 20],
                vec![2, 30]
            ]
        );
    }
}
