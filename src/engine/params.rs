use crate::error::Error;
use crate::types::{INDEX_BITS, MINIMAL_SOLUTION_LEN, SOLUTION_INDICES};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// An Equihash `(n, k)` parameter set.
///
/// A puzzle hashes `2^(n/(k+1)+1)` leaves to `n` bits each and asks for `2^k`
/// distinct leaves whose hashes XOR to zero, colliding on one more
/// `n/(k+1)`-bit digit at every level of the binary tree built over them.
///
/// Values are only built by [`Params::new`] or deserialization, and both
/// validate the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawParams")]
pub struct Params {
    n: u32,
    k: u32,
}

#[derive(Deserialize)]
struct RawParams {
    n: u32,
    k: u32,
}

impl TryFrom<RawParams> for Params {
    type Error = Error;

    fn try_from(raw: RawParams) -> Result<Self, Self::Error> {
        Params::new(raw.n, raw.k)
    }
}

impl Params {
    /// The Zcash consensus parameters.
    pub const ZCASH: Params = Params { n: 200, k: 9 };

    pub fn new(n: u32, k: u32) -> Result<Self, Error> {
        let p = Params { n, k };
        p.validate()?;
        Ok(p)
    }

    pub const fn n(&self) -> u32 {
        self.n
    }

    pub const fn k(&self) -> u32 {
        self.k
    }

    fn validate(&self) -> Result<(), Error> {
        let Params { n, k } = *self;
        if k < 2 || k >= n || n % 8 != 0 || n % (k + 1) != 0 || n > 512 {
            return Err(Error::InvalidConfig(format!(
                "unsupported equihash parameters n={n}, k={k}"
            )));
        }
        // Leaf indices are stored in u32.
        if self.index_bits() > 31 {
            return Err(Error::InvalidConfig(format!(
                "n={n}, k={k} needs {} index bits",
                self.index_bits()
            )));
        }
        if (self.solution_indices() * self.index_bits() as usize) % 8 != 0 {
            return Err(Error::InvalidConfig(format!(
                "n={n}, k={k} does not pack into whole bytes"
            )));
        }
        Ok(())
    }

    /// Bits per collision digit.
    pub const fn collision_bits(&self) -> u32 {
        self.n / (self.k + 1)
    }

    /// Bits per packed index.
    pub const fn index_bits(&self) -> u32 {
        self.collision_bits() + 1
    }

    /// Number of leaves hashed for one input.
    pub const fn leaf_count(&self) -> u32 {
        1 << self.index_bits()
    }

    pub const fn solution_indices(&self) -> usize {
        1 << self.k
    }

    pub const fn minimal_solution_len(&self) -> usize {
        self.solution_indices() * self.index_bits() as usize / 8
    }

    /// Bytes of hash per leaf.
    pub const fn leaf_hash_len(&self) -> usize {
        (self.n / 8) as usize
    }

    /// Leaves produced by one BLAKE2b invocation.
    pub const fn leaves_per_hash(&self) -> u32 {
        512 / self.n
    }

    /// BLAKE2b output length.
    pub const fn hash_output_len(&self) -> usize {
        self.leaves_per_hash() as usize * self.leaf_hash_len()
    }
}

const_assert!(Params::ZCASH.index_bits() == INDEX_BITS);
const_assert!(Params::ZCASH.solution_indices() == SOLUTION_INDICES);
const_assert!(Params::ZCASH.minimal_solution_len() == MINIMAL_SOLUTION_LEN);
