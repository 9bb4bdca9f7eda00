//! Permutation generation: seeded shuffles, strata restriction, and
//! exhaustive enumeration of distinct arrangements.

use std::collections::BTreeMap;

/// Simple deterministic random number generator for permutations.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9e3779b97f4a7c15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        for i in (1..n).rev() {
            let j = (self.next_u64() as usize) % (i + 1);
            slice.swap(i, j);
        }
    }
}

/// One random arrangement: `p[position] = sample index placed there`.
///
/// With blocks, each block's positions receive a shuffle of that block's
/// own members only, so block membership is invariant across draws.
pub fn draw_arrangement(blocks: &[Vec<usize>], n: usize, rng: &mut SimpleRng) -> Vec<usize> {
    let mut p: Vec<usize> = (0..n).collect();
    for members in blocks {
        let mut vals = members.clone();
        rng.shuffle(&mut vals);
        for (&pos, &val) in members.iter().zip(vals.iter()) {
            p[pos] = val;
        }
    }
    p
}

/// Count the distinct arrangements of the design keys, `None` when the
/// count exceeds `cap`.
///
/// Samples sharing a design key are exchangeable, so the distinct count
/// per block is the multinomial `n_b! / prod(multiplicity!)`, and blocks
/// multiply.
pub fn count_distinct(blocks: &[Vec<usize>], keys: &[Vec<usize>], cap: u64) -> Option<u64> {
    let mut total: u64 = 1;
    for members in blocks {
        let mut counts: BTreeMap<&[usize], u64> = BTreeMap::new();
        for &m in members {
            *counts.entry(keys[m].as_slice()).or_insert(0) += 1;
        }
        let mut block_count: u64 = 1;
        let mut cum: u64 = 0;
        for &mult in counts.values() {
            // binomial C(cum + mult, mult), built incrementally and exact
            let mut c: u64 = 1;
            for i in 1..=mult {
                c = c.checked_mul(cum + i)? / i;
                if c > cap {
                    return None;
                }
            }
            block_count = block_count.checked_mul(c)?;
            if block_count > cap {
                return None;
            }
            cum += mult;
        }
        total = total.checked_mul(block_count)?;
        if total > cap {
            return None;
        }
    }
    Some(total)
}

/// Enumerate every distinct arrangement (the identity is among them).
///
/// The test statistic only depends on which set of samples occupies each
/// design cell (the positions sharing a key), so distinct arrangements
/// are the ways of partitioning each block's samples across that block's
/// cells. One representative sample order per partition is generated,
/// deterministically (cells in sorted key order, samples in index order).
pub fn enumerate_arrangements(
    blocks: &[Vec<usize>],
    keys: &[Vec<usize>],
    n: usize,
) -> Vec<Vec<usize>> {
    let per_block: Vec<Vec<Vec<usize>>> = blocks
        .iter()
        .map(|members| enumerate_block(members, keys))
        .collect();

    // Cartesian product across blocks.
    let mut arrangements = vec![(0..n).collect::<Vec<usize>>()];
    for (members, block_arrs) in blocks.iter().zip(per_block.iter()) {
        let mut next = Vec::with_capacity(arrangements.len() * block_arrs.len());
        for base in &arrangements {
            for block_arr in block_arrs {
                let mut p = base.clone();
                for (&pos, &val) in members.iter().zip(block_arr.iter()) {
                    p[pos] = val;
                }
                next.push(p);
            }
        }
        arrangements = next;
    }
    arrangements
}

/// Distinct cell partitions of one block, as sequences of sample indices
/// aligned with the block's position list.
fn enumerate_block(members: &[usize], keys: &[Vec<usize>]) -> Vec<Vec<usize>> {
    // Positions grouped into design cells by their key.
    let mut by_key: BTreeMap<&[usize], Vec<usize>> = BTreeMap::new();
    for &pos in members {
        by_key.entry(keys[pos].as_slice()).or_default().push(pos);
    }
    let cells: Vec<Vec<usize>> = by_key.into_values().collect();

    let mut partitions = Vec::new();
    let mut acc: Vec<Vec<usize>> = Vec::new();
    assign_cells(&cells, 0, members, &mut acc, &mut partitions);

    // Each partition becomes one position -> sample map; ordering within
    // a cell is immaterial to the statistic, so the sorted pairing is the
    // representative.
    let mut out = Vec::with_capacity(partitions.len());
    for chosen in &partitions {
        let mut at_position: BTreeMap<usize, usize> = BTreeMap::new();
        for (cell, samples) in cells.iter().zip(chosen.iter()) {
            for (&pos, &s) in cell.iter().zip(samples.iter()) {
                at_position.insert(pos, s);
            }
        }
        out.push(members.iter().map(|pos| at_position[pos]).collect());
    }
    out
}

/// Recursively pick which samples fill each cell.
fn assign_cells(
    cells: &[Vec<usize>],
    idx: usize,
    available: &[usize],
    acc: &mut Vec<Vec<usize>>,
    out: &mut Vec<Vec<Vec<usize>>>,
) {
    if idx == cells.len() {
        out.push(acc.clone());
        return;
    }
    for combo in combinations(available, cells[idx].len()) {
        let rest: Vec<usize> = available
            .iter()
            .copied()
            .filter(|s| !combo.contains(s))
            .collect();
        acc.push(combo);
        assign_cells(cells, idx + 1, &rest, acc, out);
        acc.pop();
    }
}

/// All k-subsets of `items`, in lexicographic order.
fn combinations(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn helper(
        items: &[usize],
        start: usize,
        k: usize,
        current: &mut Vec<usize>,
        result: &mut Vec<Vec<usize>>,
    ) {
        if current.len() == k {
            result.push(current.clone());
            return;
        }
        for i in start..items.len() {
            current.push(items[i]);
            helper(items, i + 1, k, current, result);
            current.pop();
        }
    }
    helper(items, 0, k, &mut current, &mut result);
    result
}
