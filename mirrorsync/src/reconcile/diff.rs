/// Partition of two sorted sequences into their exclusive and shared elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult<T> {
    pub only_in_a: Vec<T>,
    pub only_in_b: Vec<T>,
    pub common: Vec<T>,
}

impl<T> DiffResult<T> {
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

impl<T> Default for DiffResult<T> {
    fn default() -> Self {
        Self {
            only_in_a: Vec::new(),
            only_in_b: Vec::new(),
            common: Vec::new(),
        }
    }
}

/// Diffs two ascending, duplicate-free sequences in a single merge pass.
///
/// The smaller head goes to its exclusive side; equal heads go to `common` and both advance.
pub fn diff_sorted<T>(a: &[T], b: &[T]) -> DiffResult<T>
where
    T: Ord + Clone,
{
    let mut result = DiffResult::default();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                result.only_in_a.push(a[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.only_in_b.push(b[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                result.common.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }

    result.only_in_a.extend_from_slice(&a[i..]);
    result.only_in_b.extend_from_slice(&b[j..]);

    result
}

/// Sorts `values` ascending and removes duplicates, the precondition of [`diff_sorted`].
pub fn sorted_unique<T: Ord>(mut values: Vec<T>) -> Vec<T> {
    values.sort_unstable();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn diff_partitions_keys() {
        let a = keys(&["000001", "000002", "000005"]);
        let b = keys(&["000002", "000005", "000009"]);

        let diff = diff_sorted(&a, &b);
        assert_eq!(diff.only_in_a, keys(&["000001"]));
        assert_eq!(diff.only_in_b, keys(&["000009"]));
        assert_eq!(diff.common, keys(&["000002", "000005"]));
        assert!(!diff.is_identical());
    }

    #[test]
    fn diff_handles_empty_sides() {
        let a = vec![1, 2, 3];
        let diff = diff_sorted(&a, &[]);
        assert_eq!(diff.only_in_a, a);
        assert!(diff.only_in_b.is_empty() && diff.common.is_empty());

        let diff = diff_sorted::<i64>(&[], &[]);
        assert!(diff.is_identical());
    }

    #[test]
    fn diff_is_a_partition_and_symmetric() {
        let a = sorted_unique(vec![20240331, 20231231, 20230630, 20231231, 20220101]);
        let b = sorted_unique(vec![20231231, 20240630, 20220101, 20210101]);

        let forward = diff_sorted(&a, &b);
        let backward = diff_sorted(&b, &a);
        assert_eq!(forward.only_in_a, backward.only_in_b);
        assert_eq!(forward.only_in_b, backward.only_in_a);
        assert_eq!(forward.common, backward.common);
        assert_eq!(forward, diff_sorted(&a, &b));

        let only_a: BTreeSet<_> = forward.only_in_a.iter().collect();
        let only_b: BTreeSet<_> = forward.only_in_b.iter().collect();
        assert!(only_a.is_disjoint(&only_b));

        let mut left: Vec<_> = forward.only_in_a.iter().chain(&forward.common).copied().collect();
        left.sort_unstable();
        assert_eq!(left, a);
        let mut right: Vec<_> = forward.only_in_b.iter().chain(&forward.common).copied().collect();
        right.sort_unstable();
        assert_eq!(right, b);
    }
}
