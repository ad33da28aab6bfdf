//! The Equihash validity predicate.
use super::hash::{digit, LeafHasher};
use super::params::Params;
use crate::error::InvalidSolution;

/// Check `indices` against `input` under `params`.
///
/// A valid solution has `2^k` distinct in-range indices. Building the binary
/// tree bottom-up, the two subtrees merged at level `l` must have
/// XOR-colliding hashes on digit `l - 1`, and the left subtree's first index
/// must be below the right one's. The root hash must be all zero.
pub fn verify_solution(
    params: &Params,
    input: &[u8],
    indices: &[u32],
) -> Result<(), InvalidSolution> {
    let count = params.solution_indices();
    if indices.len() != count {
        return Err(InvalidSolution::WrongLength {
            expected: count,
            actual: indices.len(),
        });
    }
    if let Some(&value) = indices.iter().find(|&&v| v >= params.leaf_count()) {
        return Err(InvalidSolution::IndexOutOfRange { value });
    }
    if has_duplicates(indices) {
        return Err(InvalidSolution::DuplicateIndices);
    }

    let hasher = LeafHasher::new(*params, input);
    let len = params.leaf_hash_len();
    let bits = params.collision_bits();
    let mut hashes = vec![0u8; count * len];
    for (slot, &index) in hashes.chunks_mut(len).zip(indices) {
        hasher.leaf(index, slot);
    }

    // Subtree `start..start + 2*width` keeps its running XOR in slot `start`.
    for level in 1..=params.k() {
        let width = 1usize << (level - 1);
        for start in (0..count).step_by(2 * width) {
            let right = start + width;
            if indices[start] >= indices[right] {
                return Err(InvalidSolution::OutOfOrder { level });
            }
            let (lo, hi) = hashes.split_at_mut(right * len);
            let acc = &mut lo[start * len..(start + 1) * len];
            xor_into(acc, &hi[..len]);
            if digit(acc, level - 1, bits) != 0 {
                return Err(InvalidSolution::Collision { level });
            }
        }
    }

    if hashes[..len].iter().any(|&b| b != 0) {
        return Err(InvalidSolution::NonZeroRoot);
    }
    Ok(())
}

pub(crate) fn has_duplicates(indices: &[u32]) -> bool {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}

#[inline]
pub(crate) fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::wagner::Wagner;

    fn small() -> Params {
        Params::new(48, 5).expect("params")
    }

    /// First nonce from 0 whose input has at least one solution.
    fn solved_input(params: Params) -> (Vec<u8>, Vec<u32>) {
        let mut wagner = Wagner::new(params, params.leaf_count() as usize * 2);
        for nonce in 0u32..256 {
            let mut input = b"verify fixture ".to_vec();
            input.extend_from_slice(&nonce.to_le_bytes());
            let found = wagner.solve(&input).expect("solver runs");
            if let Some(first) = found.into_iter().next() {
                return (input, first);
            }
        }
        panic!("no fixture found in 256 nonces");
    }

    #[test]
    fn accepts_solver_output() {
        let (input, solution) = solved_input(small());
        verify_solution(&small(), &input, &solution).expect("valid");
    }

    #[test]
    fn rejects_other_input() {
        let (mut input, solution) = solved_input(small());
        input.push(0);
        assert!(verify_solution(&small(), &input, &solution).is_err());
    }

    #[test]
    fn rejects_swapped_subtrees() {
        let (input, mut solution) = solved_input(small());
        solution.swap(0, 1);
        let err = verify_solution(&small(), &input, &solution).expect_err("out of order");
        assert_eq!(err, InvalidSolution::OutOfOrder { level: 1 });
    }

    #[test]
    fn rejects_duplicates_and_range() {
        let (input, solution) = solved_input(small());
        let mut dup = solution.clone();
        dup[1] = dup[0];
        assert_eq!(
            verify_solution(&small(), &input, &dup),
            Err(InvalidSolution::DuplicateIndices)
        );
        let mut wide = solution.clone();
        wide[5] = 512;
        assert_eq!(
            verify_solution(&small(), &input, &wide),
            Err(InvalidSolution::IndexOutOfRange { value: 512 })
        );
        assert!(matches!(
            verify_solution(&small(), &input, &solution[..16]),
            Err(InvalidSolution::WrongLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn rejects_reversed_solution() {
        let (input, mut solution) = solved_input(small());
        solution.reverse();
        assert!(matches!(
            verify_solution(&small(), &input, &solution),
            Err(InvalidSolution::OutOfOrder { .. })
        ));
    }

    #[test]
    fn rejects_replaced_leaf() {
        let (input, mut solution) = solved_input(small());
        // Keep ordering and distinctness, break the collision.
        let (lo, hi) = (solution[0], solution[1]);
        let replacement = (0..512u32).find(|v| *v > lo && *v < hi && !solution.contains(v));
        if let Some(v) = replacement {
            solution[0] = v;
            assert!(matches!(
                verify_solution(&small(), &input, &solution),
                Err(InvalidSolution::Collision { .. }) | Err(InvalidSolution::OutOfOrder { .. })
            ));
        }
    }
}
