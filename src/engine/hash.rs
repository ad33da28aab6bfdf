//! Leaf hash generation.
//!
//! Leaf `i` is a slice of `BLAKE2b(input || le32(i / leaves_per_hash))`,
//! personalized with `"ZcashPoW" || le32(n) || le32(k)`.
use super::params::Params;
use blake2b_simd::Params as Blake2bParams;
use blake2b_simd::State;

#[derive(Clone)]
pub struct LeafHasher {
    params: Params,
    base: State,
}

impl LeafHasher {
    pub fn new(params: Params, input: &[u8]) -> Self {
        let mut personal = [0u8; 16];
        personal[..8].copy_from_slice(b"ZcashPoW");
        personal[8..12].copy_from_slice(&params.n().to_le_bytes());
        personal[12..].copy_from_slice(&params.k().to_le_bytes());
        let mut base = Blake2bParams::new()
            .hash_length(params.hash_output_len())
            .personal(&personal)
            .to_state();
        base.update(input);
        Self { params, base }
    }

    fn block(&self, block: u32) -> blake2b_simd::Hash {
        let mut state = self.base.clone();
        state.update(&block.to_le_bytes());
        state.finalize()
    }

    /// Write the hash of leaf `index` into `out` (`leaf_hash_len` bytes).
    pub fn leaf(&self, index: u32, out: &mut [u8]) {
        let per = self.params.leaves_per_hash();
        let len = self.params.leaf_hash_len();
        let hash = self.block(index / per);
        let offset = (index % per) as usize * len;
        out.copy_from_slice(&hash.as_bytes()[offset..offset + len]);
    }

    /// Write every leaf hash, in index order, into `out`.
    pub fn fill_all(&self, out: &mut [u8]) {
        let per = self.params.leaves_per_hash() as usize;
        let len = self.params.leaf_hash_len();
        let leaves = self.params.leaf_count() as usize;
        debug_assert_eq!(out.len(), leaves * len);
        for (block, chunk) in out.chunks_mut(per * len).enumerate() {
            let hash = self.block(block as u32);
            chunk.copy_from_slice(&hash.as_bytes()[..chunk.len()]);
        }
    }
}

/// Digit `index` of `hash`, where each digit is `bits` wide, MSB first.
#[inline]
pub(crate) fn digit(hash: &[u8], index: u32, bits: u32) -> u32 {
    let start = (index * bits) as usize;
    let first = start / 8;
    let last = (start + bits as usize).div_ceil(8);
    let mut acc = 0u64;
    for &b in &hash[first..last] {
        acc = (acc << 8) | u64::from(b);
    }
    let tail = (last * 8 - start - bits as usize) as u32;
    ((acc >> tail) & ((1u64 << bits) - 1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_all_matches_single_leaves() {
        let params = Params::new(48, 5).expect("params");
        let hasher = LeafHasher::new(params, b"fill all");
        let len = params.leaf_hash_len();
        let mut all = vec![0u8; params.leaf_count() as usize * len];
        hasher.fill_all(&mut all);
        let mut one = vec![0u8; len];
        for index in [0u32, 1, 9, 10, 11, 511] {
            hasher.leaf(index, &mut one);
            let at = index as usize * len;
            assert_eq!(&all[at..at + len], &one[..], "leaf {index}");
        }
    }

    #[test]
    fn personalization_separates_parameter_sets() {
        let a = LeafHasher::new(Params::new(48, 5).expect("params"), b"x");
        let b = LeafHasher::new(Params::new(96, 5).expect("params"), b"x");
        let mut ha = [0u8; 6];
        let mut hb = [0u8; 12];
        a.leaf(0, &mut ha);
        b.leaf(0, &mut hb);
        assert_ne!(&ha[..], &hb[..6]);
    }

    #[test]
    fn digit_reads_msb_first_fields() {
        let hash = [0b1010_1100u8, 0b0011_1111, 0xff];
        assert_eq!(digit(&hash, 0, 4), 0b1010);
        assert_eq!(digit(&hash, 1, 4), 0b1100);
        assert_eq!(digit(&hash, 0, 12), 0b1010_1100_0011);
        assert_eq!(digit(&hash, 1, 12), 0b1111_1111_1111);
        assert_eq!(digit(&hash, 1, 5), 0b10000);
    }
}
