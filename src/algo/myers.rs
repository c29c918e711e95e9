//! Myers LCS over identity keys
//!
//! Finds the longest common subsequence of two key sequences. Elements in
//! the LCS keep their relative order and need no move; everything else is
//! inserted, deleted or moved by [`diff`](super::diff).
//!
//! # Algorithm Choice: Why Myers?
//!
//! | Algorithm | Time | Space | Best for |
//! |-----------|------|-------|----------|
//! | DP | O(n*m) | O(n*m) | Tiny lists |
//! | **Myers** | O((n+m)*d) | O(d*(n+m)) | **Small edits to long lists** |
//! | Patience | O(n log n) | O(n) | Code diffs |
//!
//! List updates are usually a handful of edits against a long list, so
//! `d` stays small and the search is close to linear.
//!
//! # Tie-breaking
//!
//! The common prefix and suffix are stripped before the search, so when
//! several minimal scripts exist the one preserving the longest common
//! prefix/suffix wins. Within the middle, the diagonal choice is fixed,
//! so identical inputs always produce identical pairs.
//!
//! # Space Complexity Note
//!
//! The backtrack needs the diagonal state of every round. Round `d` can only
//! have touched diagonals `-d..=d`, so each snapshot keeps just that window
//! (plus one guard diagonal per side) instead of the whole `O(n+m)` array.
//! The trace is therefore **O(d²)**, and `max_edit_distance` bounds it: at the
//! default cap of 512 it stays around 2 MB regardless of list length. The
//! working array itself is still `O(n+m)`.
//!
//! # References
//!
//! - Myers, E.W. "An O(ND) Difference Algorithm and Its Variations" (1986)

/// Both sides at or below this length use the DP table instead of Myers.
const SMALL_SEQUENCE: usize = 8;

/// Compute LCS pairs `(old_idx, new_idx)` in increasing order.
///
/// If the middle section needs more than `max_edit_distance` edits, it is
/// treated as having no common subsequence. The caller then moves every
/// matched element there, which is correct but not minimal.
pub fn lcs_pairs<K: Eq>(old: &[K], new: &[K], max_edit_distance: usize) -> Vec<(usize, usize)> {
    let n = old.len();
    let m = new.len();

    let mut prefix_len = 0;
    while prefix_len < n && prefix_len < m && old[prefix_len] == new[prefix_len] {
        prefix_len += 1;
    }

    let mut suffix_len = 0;
    while suffix_len < n - prefix_len
        && suffix_len < m - prefix_len
        && old[n - 1 - suffix_len] == new[m - 1 - suffix_len]
    {
        suffix_len += 1;
    }

    let mut lcs: Vec<(usize, usize)> = (0..prefix_len).map(|i| (i, i)).collect();

    let old_mid = &old[prefix_len..n - suffix_len];
    let new_mid = &new[prefix_len..m - suffix_len];

    if !old_mid.is_empty() && !new_mid.is_empty() {
        let mid = if old_mid.len() <= SMALL_SEQUENCE && new_mid.len() <= SMALL_SEQUENCE {
            small_lcs_dp(old_mid, new_mid)
        } else {
            myers_core(old_mid, new_mid, max_edit_distance).unwrap_or_default()
        };
        lcs.extend(mid.into_iter().map(|(oi, ni)| (oi + prefix_len, ni + prefix_len)));
    }

    lcs.extend((0..suffix_len).map(|i| (n - suffix_len + i, m - suffix_len + i)));
    lcs
}

/// Myers forward search.
///
/// `v[k + offset]` holds the furthest x reached on diagonal `k = x - y`.
/// A windowed snapshot of `v` is kept per round for the backtrack. Returns
/// `None` once the edit distance exceeds `max_edit_distance`.
fn myers_core<K: Eq>(old: &[K], new: &[K], max_edit_distance: usize) -> Option<Vec<(usize, usize)>> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    let max_d = old.len() + new.len();
    let offset = max_d as isize + 1;

    let mut v = vec![0isize; 2 * max_d + 3];
    let mut trace: Vec<Vec<isize>> = Vec::with_capacity(max_d.min(max_edit_distance) + 1);

    for d in 0..=max_d as isize {
        if d as usize > max_edit_distance {
            return None;
        }
        trace.push(round_snapshot(&v, offset, d));

        let mut k = -d;
        while k <= d {
            let kk = (k + offset) as usize;

            // At k=-d we can only come from k+1 (insert), at k=d only from
            // k-1 (delete); otherwise take whichever reached further.
            let mut x = if k == -d || (k != d && v[kk - 1] < v[kk + 1]) {
                v[kk + 1]
            } else {
                v[kk - 1] + 1
            };
            let mut y = x - k;

            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }

            v[kk] = x;

            if x >= n && y >= m {
                return Some(backtrack(&trace, n, m));
            }
            k += 2;
        }
    }

    Some(Vec::new())
}

/// Diagonals `-d-1..=d+1` of `v`, the only ones round `d` reads.
fn round_snapshot(v: &[isize], offset: isize, d: isize) -> Vec<isize> {
    let lo = (offset - d - 1) as usize;
    let hi = (offset + d + 1) as usize;
    v[lo..=hi].to_vec()
}

/// Walk the trace from `(n, m)` back to the origin, collecting snakes.
///
/// `trace[d]` is the diagonal state *before* round `d`, i.e. the state round
/// `d` read from when it picked its predecessor. Diagonal `k` sits at
/// `k + d + 1` in that snapshot.
fn backtrack(trace: &[Vec<isize>], n: isize, m: isize) -> Vec<(usize, usize)> {
    let mut x = n;
    let mut y = m;
    let mut lcs = Vec::new();

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let offset = d + 1;
        let k = x - y;
        let kk = (k + offset) as usize;

        let prev_k = if k == -d || (k != d && v[kk - 1] < v[kk + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        // Diagonal steps are matches
        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            lcs.push((x as usize, y as usize));
        }

        if d > 0 {
            x = prev_x;
            y = prev_y;
        }
    }

    lcs.reverse();
    lcs
}

/// Simple O(n*m) DP for small sequences (≤8 elements).
///
/// Beats Myers at this size: no trace allocation, and the table lives on
/// the stack.
fn small_lcs_dp<K: Eq>(old: &[K], new: &[K]) -> Vec<(usize, usize)> {
    let n = old.len();
    let m = new.len();

    // dp[i][j] = LCS length of old[0..i] and new[0..j]
    let mut dp = [[0u8; SMALL_SEQUENCE + 1]; SMALL_SEQUENCE + 1];

    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = if old[i - 1] == new[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let mut lcs = Vec::with_capacity(dp[n][m] as usize);
    let mut i = n;
    let mut j = m;

    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            lcs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] > dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    lcs.reverse();
    lcs
}

// =============================================================================
// Tests
// =============================================================================
