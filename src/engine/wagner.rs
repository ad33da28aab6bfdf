//! Wagner's generalized-birthday search for Equihash solutions.
//!
//! Round `r` sorts the current row table by digit `r` and XORs every pair of
//! rows inside a bucket into the next table, keeping a back link to both
//! parents. The last round collides on the final two digits at once, so a
//! pair that XORs to zero there is a candidate. Candidates are unwound through
//! the links into leaf indices, put into canonical order and re-verified.
use super::hash::{digit, LeafHasher};
use super::params::Params;
use super::verify::{has_duplicates, verify_solution, xor_into};
use crate::error::EngineFailure;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
struct Link {
    left: u32,
    right: u32,
}

/// Reusable solver state for one parameter set.
///
/// The row tables are kept between calls so repeated solves do not go back to
/// the allocator.
#[derive(Debug)]
pub struct Wagner {
    params: Params,
    max_rows: usize,
    rows: Vec<u8>,
    next: Vec<u8>,
    links: Vec<Vec<Link>>,
    digits: Vec<u32>,
    order: Vec<u32>,
    bucket_starts: Vec<u32>,
    bucket_fill: Vec<u32>,
}

impl Wagner {
    /// `max_rows` caps every intermediate table; rows past the cap are dropped.
    pub fn new(params: Params, max_rows: usize) -> Self {
        Self {
            params,
            max_rows,
            rows: Vec::new(),
            next: Vec::new(),
            links: Vec::new(),
            digits: Vec::new(),
            order: Vec::new(),
            bucket_starts: Vec::new(),
            bucket_fill: Vec::new(),
        }
    }

    pub fn params(&self) -> Params {
        self.params
    }

    /// Reserve the scratch tables up front.
    pub fn preallocate(&mut self) -> Result<(), EngineFailure> {
        let len = self.params.leaf_hash_len();
        let leaves = self.params.leaf_count() as usize;
        let rows = leaves.max(self.max_rows);
        reserve(&mut self.rows, rows * len)?;
        reserve(&mut self.next, self.max_rows * len)?;
        reserve(&mut self.digits, rows)?;
        reserve(&mut self.order, rows)?;
        let buckets = 1usize << self.params.collision_bits();
        reserve(&mut self.bucket_starts, buckets + 1)?;
        reserve(&mut self.bucket_fill, buckets)?;
        let rounds = self.params.k() as usize - 1;
        self.links.resize_with(rounds, Vec::new);
        for table in &mut self.links {
            reserve(table, self.max_rows)?;
        }
        Ok(())
    }

    /// Find all distinct solutions for `input`, each in canonical order.
    pub fn solve(&mut self, input: &[u8]) -> Result<Vec<Vec<u32>>, EngineFailure> {
        let params = self.params;
        let len = params.leaf_hash_len();
        let leaves = params.leaf_count() as usize;

        self.rows.clear();
        reserve(&mut self.rows, leaves * len)?;
        self.rows.resize(leaves * len, 0);
        LeafHasher::new(params, input).fill_all(&mut self.rows);

        let rounds = params.k() as usize - 1;
        self.links.resize_with(rounds, Vec::new);
        let mut count = leaves;
        for round in 0..rounds {
            self.bucket_by_digit(count, round as u32)?;
            count = self.collide_round(round)?;
            std::mem::swap(&mut self.rows, &mut self.next);
            trace!(round, rows = count, "equihash round done");
            if count < 2 {
                return Ok(Vec::new());
            }
        }

        self.bucket_by_digit(count, rounds as u32)?;
        let candidates = self.final_pairs();
        let mut solutions: Vec<Vec<u32>> = Vec::new();
        let mut rejected = 0usize;
        for (left, right) in candidates {
            let indices = self.unwind(left, right);
            if has_duplicates(&indices) {
                rejected += 1;
                continue;
            }
            if let Err(reason) = verify_solution(&params, input, &indices) {
                warn!(%reason, "discarding candidate that failed re-verification");
                rejected += 1;
                continue;
            }
            if !solutions.contains(&indices) {
                solutions.push(indices);
            }
        }
        debug!(
            found = solutions.len(),
            rejected,
            "equihash search finished"
        );
        Ok(solutions)
    }

    /// Counting sort of the first `count` rows by digit `index`.
    fn bucket_by_digit(&mut self, count: usize, index: u32) -> Result<(), EngineFailure> {
        let len = self.params.leaf_hash_len();
        let bits = self.params.collision_bits();
        let buckets = 1usize << bits;

        self.digits.clear();
        reserve(&mut self.digits, count)?;
        self.digits.extend(
            self.rows[..count * len]
                .chunks_exact(len)
                .map(|row| digit(row, index, bits)),
        );

        self.bucket_starts.clear();
        self.bucket_starts.resize(buckets + 1, 0);
        for &d in &self.digits {
            self.bucket_starts[d as usize + 1] += 1;
        }
        for b in 0..buckets {
            self.bucket_starts[b + 1] += self.bucket_starts[b];
        }

        self.bucket_fill.clear();
        self.bucket_fill
            .extend_from_slice(&self.bucket_starts[..buckets]);
        self.order.clear();
        self.order.resize(count, 0);
        for (row, &d) in self.digits.iter().enumerate() {
            let slot = &mut self.bucket_fill[d as usize];
            self.order[*slot as usize] = row as u32;
            *slot += 1;
        }
        Ok(())
    }

    /// XOR colliding pairs into `next`, linking them in `links[round]`.
    fn collide_round(&mut self, round: usize) -> Result<usize, EngineFailure> {
        let len = self.params.leaf_hash_len();
        let max_rows = self.max_rows;
        let Wagner {
            rows,
            next,
            links,
            order,
            bucket_starts,
            ..
        } = self;
        let table = &mut links[round];
        table.clear();
        next.clear();
        let mut scratch = vec![0u8; len];
        let mut capped = false;

        'buckets: for bucket in bucket_starts.windows(2) {
            let group = &order[bucket[0] as usize..bucket[1] as usize];
            for (x, &a) in group.iter().enumerate() {
                for &b in &group[x + 1..] {
                    let ra = &rows[a as usize * len..(a as usize + 1) * len];
                    let rb = &rows[b as usize * len..(b as usize + 1) * len];
                    scratch.copy_from_slice(ra);
                    xor_into(&mut scratch, rb);
                    // Identical remaining hashes only lead to repeated leaves.
                    if scratch.iter().all(|&v| v == 0) {
                        continue;
                    }
                    if table.len() == max_rows {
                        capped = true;
                        break 'buckets;
                    }
                    if table.len() == table.capacity() {
                        let target = (table.len() + table.len().max(1024)).min(max_rows);
                        reserve(table, target)?;
                        reserve(next, target * len)?;
                    }
                    next.extend_from_slice(&scratch);
                    table.push(Link { left: a, right: b });
                }
            }
        }
        if capped {
            debug!(round, max_rows, "row table capped");
        }
        Ok(table.len())
    }

    /// Pairs in the last table whose hashes cancel completely.
    fn final_pairs(&self) -> Vec<(u32, u32)> {
        let len = self.params.leaf_hash_len();
        let mut out = Vec::new();
        for bucket in self.bucket_starts.windows(2) {
            let group = &self.order[bucket[0] as usize..bucket[1] as usize];
            for (x, &a) in group.iter().enumerate() {
                let ra = &self.rows[a as usize * len..(a as usize + 1) * len];
                for &b in &group[x + 1..] {
                    let rb = &self.rows[b as usize * len..(b as usize + 1) * len];
                    if ra == rb {
                        out.push((a, b));
                    }
                }
            }
        }
        out
    }

    fn unwind(&self, left: u32, right: u32) -> Vec<u32> {
        let level = self.links.len();
        let mut out = self.subtree(level, left);
        let mut other = self.subtree(level, right);
        if out[0] > other[0] {
            std::mem::swap(&mut out, &mut other);
        }
        out.extend_from_slice(&other);
        out
    }

    /// Leaf indices under `row` of the table built after `level` rounds.
    fn subtree(&self, level: usize, row: u32) -> Vec<u32> {
        if level == 0 {
            return vec![row];
        }
        let link = self.links[level - 1][row as usize];
        let mut out = self.subtree(level - 1, link.left);
        let mut other = self.subtree(level - 1, link.right);
        if out[0] > other[0] {
            std::mem::swap(&mut out, &mut other);
        }
        out.extend_from_slice(&other);
        out
    }
}

fn reserve<T>(buf: &mut Vec<T>, total: usize) -> Result<(), EngineFailure> {
    let additional = total.saturating_sub(buf.len());
    match buf.try_reserve(additional) {
        Ok(()) => Ok(()),
        Err(err) => Err(EngineFailure::new(format!(
            "cannot reserve {total} scratch entries: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tag: &[u8], nonce: u32) -> Vec<u8> {
        let mut v = tag.to_vec();
        v.extend_from_slice(&nonce.to_le_bytes());
        v
    }

    #[test]
    fn small_parameters_yield_valid_solutions() {
        let params = Params::new(48, 5).expect("params");
        let mut wagner = Wagner::new(params, 2048);
        let mut total = 0usize;
        for nonce in 0..32 {
            let data = input(b"wagner", nonce);
            let sols = wagner.solve(&data).expect("solve");
            for sol in &sols {
                assert_eq!(sol.len(), 32);
                verify_solution(&params, &data, sol).expect("solver output verifies");
            }
            total += sols.len();
        }
        assert!(total > 0, "expected at least one solution across 32 nonces");
    }

    #[test]
    fn some_inputs_have_no_solutions() {
        let params = Params::new(48, 5).expect("params");
        let mut wagner = Wagner::new(params, 2048);
        let mut empty = false;
        for nonce in 0..256 {
            let sols = wagner.solve(&input(b"empty", nonce)).expect("solve");
            empty |= sols.is_empty();
        }
        assert!(empty, "some nonce should produce zero solutions");
    }

    #[test]
    fn repeated_solves_are_deterministic() {
        let params = Params::new(96, 5).expect("params");
        let mut wagner = Wagner::new(params, params.leaf_count() as usize * 2);
        let data = input(b"repeat", 3);
        let other_data = input(b"repeat", 4);
        let first = wagner.solve(&data).expect("first");
        let other = wagner.solve(&other_data).expect("other input");
        let again = wagner.solve(&data).expect("again");
        assert_eq!(first, again);
        for sol in &other {
            verify_solution(&params, &other_data, sol).expect("verifies against its input");
        }
    }

    #[test]
    fn tiny_row_cap_does_not_fail() {
        let params = Params::new(48, 5).expect("params");
        let mut wagner = Wagner::new(params, 4);
        let data = input(b"cap", 0);
        let sols = wagner.solve(&data).expect("capped solve still runs");
        for sol in &sols {
            verify_solution(&params, &data, sol).expect("valid");
        }
    }

    #[test]
    fn preallocate_reserves_tables() {
        let params = Params::new(48, 5).expect("params");
        let mut wagner = Wagner::new(params, 1024);
        assert_eq!(wagner.params(), params);
        wagner.preallocate().expect("small tables fit");
        assert!(wagner.rows.capacity() >= 512 * 6);
        assert_eq!(wagner.links.len(), 4);
    }
}
