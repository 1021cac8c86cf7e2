//! Bounded subset-sum search used by the split-transaction phase.
//!
//! Two strategies, tried in order: a greedy O(n^2) scan for the common
//! two-item case, then a sparse DP over reachable partial sums for three or
//! more items. Both return the first feasible combination under the given
//! items' iteration order, so results are reproducible for a fixed input.

use std::collections::HashSet;

/// `(min_sum_cents, max_sum_cents)` inclusive window around `target_cents`
/// under fractional tolerance `r`, with a floor of 1 cent of width so a
/// zero-tolerance target still admits an exact match.
pub fn tolerance_window(target_cents: i64, tolerance: f64) -> (i64, i64) {
    let t = target_cents as f64;
    let min_sum = (t * (1.0 - tolerance)).floor() as i64;
    let mut max_sum = (t * (1.0 + tolerance)).ceil() as i64;
    if max_sum <= min_sum {
        max_sum = min_sum + 1;
    }
    (min_sum, max_sum)
}

/// Searches `items` (each `(row_id, amount_cents)`, amounts positive) for a
/// subset of size 2..=max_components whose sum falls within
/// `tolerance_window(target_cents, tolerance)`. Returns the matched row ids
/// in the order they were combined, and the achieved sum.
pub fn find_subset(items: &[(u64, i64)], target_cents: i64, tolerance: f64, max_components: usize) -> Option<(Vec<u64>, i64)> {
    let (min_sum, max_sum) = tolerance_window(target_cents, tolerance);

    // Greedy fast path for the overwhelmingly common two-item split.
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let sum = items[i].1 + items[j].1;
            if sum >= min_sum && sum <= max_sum {
                return Some((vec![items[i].0, items[j].0], sum));
            }
        }
    }

    if max_components < 3 {
        return None;
    }

    // Sparse DP: states are partial sums reachable so far, each carrying the
    // first (in insertion order) combination of item indices that reaches
    // it. Indices considered per item are snapshotted before the item is
    // folded in, so each item contributes to a state at most once.
    let mut states: Vec<(i64, Vec<usize>)> = vec![(0, Vec::new())];
    let mut seen_sums: HashSet<i64> = HashSet::from([0]);

    for (idx, &(_, amount)) in items.iter().enumerate() {
        let snapshot_len = states.len();
        for s in 0..snapshot_len {
            let (sum, indices) = &states[s];
            if indices.len() >= max_components {
                continue;
            }
            let new_sum = sum + amount;
            if new_sum > max_sum || seen_sums.contains(&new_sum) {
                continue;
            }
            let mut new_indices = indices.clone();
            new_indices.push(idx);

            if new_sum >= min_sum && new_indices.len() >= 2 {
                let row_ids = new_indices.iter().map(|&i| items[i].0).collect();
                return Some((row_ids, new_sum));
            }

            seen_sums.insert(new_sum);
            states.push((new_sum, new_indices));
        }
    }

    None
}
