//! Conversion between expanded and minimal solutions.
//!
//! Indices are written as consecutive big-endian bit fields, most significant
//! bit first, with no padding between fields. For `(200, 9)` this is 512 fields
//! of 21 bits, which fill 1344 bytes exactly.
//!
//! All functions here are pure and may be called from any thread.
use crate::error::Error;
use crate::types::{
    ExpandedSolution, MinimalSolution, INDEX_BITS, MINIMAL_SOLUTION_LEN, SOLUTION_INDICES,
};

/// Pack an expanded solution into its minimal form.
pub fn expanded_to_minimal(expanded: &ExpandedSolution) -> MinimalSolution {
    let mut out = [0u8; MINIMAL_SOLUTION_LEN];
    pack(INDEX_BITS, expanded.as_slice(), &mut out);
    MinimalSolution::from(out)
}

/// Unpack a minimal solution into one index per leaf.
pub fn minimal_to_expanded(minimal: &MinimalSolution) -> ExpandedSolution {
    let mut out = [0u32; SOLUTION_INDICES];
    unpack(INDEX_BITS, minimal.as_bytes(), &mut out);
    // 21-bit fields are always below the index limit.
    ExpandedSolution::from_raw(out)
}

/// [`expanded_to_minimal`] for an index slice of unchecked shape.
pub fn expanded_slice_to_minimal(indices: &[u32]) -> Result<MinimalSolution, Error> {
    if indices.len() != SOLUTION_INDICES {
        return Err(Error::Format(format!(
            "expanded solution has {} indices, expected {SOLUTION_INDICES}",
            indices.len()
        )));
    }
    let mut out = [0u8; MINIMAL_SOLUTION_LEN];
    compress_indices(INDEX_BITS, indices, &mut out)?;
    Ok(MinimalSolution::from(out))
}

/// [`minimal_to_expanded`] for a byte slice of unchecked shape.
pub fn minimal_slice_to_expanded(bytes: &[u8]) -> Result<ExpandedSolution, Error> {
    if bytes.len() != MINIMAL_SOLUTION_LEN {
        return Err(Error::Format(format!(
            "minimal solution has {} bytes, expected {MINIMAL_SOLUTION_LEN}",
            bytes.len()
        )));
    }
    let mut out = [0u32; SOLUTION_INDICES];
    expand_indices(INDEX_BITS, bytes, &mut out)?;
    Ok(ExpandedSolution::from_raw(out))
}

/// Pack `indices` as `bit_len`-bit fields into `out`.
///
/// `out` must hold exactly `indices.len() * bit_len` bits and every index must
/// fit in `bit_len` bits.
pub fn compress_indices(bit_len: u32, indices: &[u32], out: &mut [u8]) -> Result<(), Error> {
    check_shape(bit_len, indices.len(), out.len())?;
    let limit = 1u64 << bit_len;
    if let Some(position) = indices.iter().position(|&v| u64::from(v) >= limit) {
        return Err(Error::IndexOutOfRange {
            position,
            value: indices[position],
            bits: bit_len,
        });
    }
    pack(bit_len, indices, out);
    Ok(())
}

/// Unpack `bit_len`-bit fields from `packed` into `out`.
pub fn expand_indices(bit_len: u32, packed: &[u8], out: &mut [u32]) -> Result<(), Error> {
    check_shape(bit_len, out.len(), packed.len())?;
    unpack(bit_len, packed, out);
    Ok(())
}

fn check_shape(bit_len: u32, indices: usize, bytes: usize) -> Result<(), Error> {
    if bit_len == 0 || bit_len > 32 {
        return Err(Error::Format(format!("unsupported field width {bit_len}")));
    }
    if indices * bit_len as usize != bytes * 8 {
        return Err(Error::Format(format!(
            "{indices} fields of {bit_len} bits do not fill {bytes} bytes"
        )));
    }
    Ok(())
}

// Only the low `acc_bits` bits of `acc` are live; older bits fall off the top.
fn pack(bit_len: u32, indices: &[u32], out: &mut [u8]) {
    let mut acc: u64 = 0;
    let mut acc_bits = 0u32;
    let mut pos = 0usize;
    for &index in indices {
        acc = (acc << bit_len) | u64::from(index);
        acc_bits += bit_len;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out[pos] = (acc >> acc_bits) as u8;
            pos += 1;
        }
    }
    debug_assert_eq!(acc_bits, 0);
    debug_assert_eq!(pos, out.len());
}

fn unpack(bit_len: u32, packed: &[u8], out: &mut [u32]) {
    let mask = (1u64 << bit_len) - 1;
    let mut acc: u64 = 0;
    let mut acc_bits = 0u32;
    let mut pos = 0usize;
    for &byte in packed {
        acc = (acc << 8) | u64::from(byte);
        acc_bits += 8;
        while acc_bits >= bit_len {
            acc_bits -= bit_len;
            out[pos] = ((acc >> acc_bits) & mask) as u32;
            pos += 1;
        }
    }
    debug_assert_eq!(pos, out.len());
}
