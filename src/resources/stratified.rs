//! Stratified Coverage-Mask Table
//!
//! For `n` sample slots there are `2^n` coverage masks. The table groups them
//! by popcount so that a kernel can first choose *how many* slots a fragment
//! claims and then pick uniformly *which* ones:
//!
//! ```text
//!  indices:  [ 0 | C(n,0) | C(n,0)+C(n,1) | ... ]   (n + 1 entries)
//!  lookup:   [ 0 | popcount-1 masks | popcount-2 masks | ... | 2^n - 1 ]
//!              ^ class 0           ^ class 1
//! ```
//!
//! Class `k` occupies `lookup[indices[k] .. indices[k] + C(n, k)]`, and
//! inside a class masks appear in increasing numeric order.

/// Binomial coefficients `C(n, 0..=n)` from one Pascal-triangle row.
#[must_use]
pub fn binomial_row(n: u32) -> Vec<u32> {
    let mut row = vec![1u32];
    for _ in 0..n {
        let mut next = Vec::with_capacity(row.len() + 1);
        next.push(1);
        for pair in row.windows(2) {
            next.push(pair[0] + pair[1]);
        }
        next.push(1);
        row = next;
    }
    row
}

/// Prefix-index and permutation tables for `n` sample slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratifiedTable {
    sample_count: u32,
    /// `indices[k]` = number of masks with popcount < `k`.
    pub indices: Vec<u32>,
    /// All masks of `[0, 2^n)`, grouped by ascending popcount.
    pub lookup: Vec<u32>,
}

impl StratifiedTable {
    /// Builds the table for `n` slots. Callers keep `n` within `1..=16`;
    /// larger values are not checked here.
    #[must_use]
    pub fn generate(n: u32) -> Self {
        let binomials = binomial_row(n);

        let mut indices = Vec::with_capacity(n as usize + 1);
        indices.push(0);
        for k in 1..=n as usize {
            indices.push(indices[k - 1] + binomials[k - 1]);
        }

        let total = 1usize << n;
        let mut lookup = vec![0u32; total];
        let mut cursor = indices.clone();
        for mask in 0..total as u32 {
            let class = mask.count_ones() as usize;
            lookup[cursor[class] as usize] = mask;
            cursor[class] += 1;
        }

        Self {
            sample_count: n,
            indices,
            lookup,
        }
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Index range of the masks with popcount `k`.
    #[must_use]
    pub fn class_range(&self, k: u32) -> std::ops::Range<usize> {
        let start = self.indices[k as usize] as usize;
        let end = if k == self.sample_count {
            self.lookup.len()
        } else {
            self.indices[k as usize + 1] as usize
        };
        start..end
    }

    /// The `rank`-th mask (wrapping) with exactly `k` bits set.
    #[must_use]
    pub fn mask_for(&self, k: u32, rank: u32) -> u32 {
        let range = self.class_range(k);
        let len = range.len().max(1);
        self.lookup[range.start + rank as usize % len]
    }

    /// Flat buffer layout uploaded for kernels: indices then lookup.
    #[must_use]
    pub fn to_buffer(&self) -> Vec<u32> {
        let mut data = Vec::with_capacity(self.indices.len() + self.lookup.len());
        data.extend_from_slice(&self.indices);
        data.extend_from_slice(&self.lookup);
        data
    }

    /// Reads back a table written by [`to_buffer`](Self::to_buffer).
    #[must_use]
    pub fn from_buffer(sample_count: u32, data: &[u32]) -> Option<Self> {
        let index_len = sample_count as usize + 1;
        let total = 1usize << sample_count;
        if data.len() != index_len + total {
            return None;
        }
        Some(Self {
            sample_count,
            indices: data[..index_len].to_vec(),
            lookup: data[index_len..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_row() {
        assert_eq!(binomial_row(0), vec![1]);
        assert_eq!(binomial_row(4), vec![1, 4, 6, 4, 1]);
    }

    #[test]
    fn three_slot_table_layout() {
        let table = StratifiedTable::generate(3);
        assert_eq!(table.indices, vec![0, 1, 4, 7]);
        assert_eq!(table.lookup, vec![0, 1, 2, 4, 3, 5, 6, 7]);
    }

    #[test]
    fn mask_for_wraps_within_class() {
        let table = StratifiedTable::generate(4);
        assert_eq!(table.mask_for(1, 0), 1);
        assert_eq!(table.mask_for(1, 4), 1);
        assert_eq!(table.mask_for(4, 7), 15);
        assert_eq!(table.mask_for(2, 1).count_ones(), 2);
    }

    #[test]
    fn buffer_round_trip() {
        let table = StratifiedTable::generate(5);
        let back = StratifiedTable::from_buffer(5, &table.to_buffer()).unwrap();
        assert_eq!(table, back);
    }
}
