//! Fixed-size data model shared by the codec, the engines and the sessions.
//!
//! Every blob that crosses the engine boundary has a fixed length. The lengths
//! are checked once, when a value of one of these types is built, and are
//! carried by the array types afterwards.
use crate::error::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use static_assertions::const_assert_eq;
use std::fmt;

/// Length of a serialized block header without its nonce.
pub const HEADER_LEN: usize = 108;
/// Length of the nonce appended to the header.
pub const NONCE_LEN: usize = 32;
/// Length of the header-and-nonce input to solving and validation.
pub const HEADER_AND_NONCE_LEN: usize = HEADER_LEN + NONCE_LEN;

/// Number of leaf indices in a `(200, 9)` solution (`2^9`).
pub const SOLUTION_INDICES: usize = 512;
/// Bits per packed index (`200 / (9 + 1) + 1`).
pub const INDEX_BITS: u32 = 21;
/// Length of a packed solution.
pub const MINIMAL_SOLUTION_LEN: usize = SOLUTION_INDICES * INDEX_BITS as usize / 8;

/// Solutions returned by one `find_solutions` call unless configured otherwise.
pub const DEFAULT_MAX_SOLUTIONS: usize = 16;

// The packed form has no padding bits.
const_assert_eq!(
    SOLUTION_INDICES * INDEX_BITS as usize,
    MINIMAL_SOLUTION_LEN * 8
);
const_assert_eq!(MINIMAL_SOLUTION_LEN, 1344);
const_assert_eq!(HEADER_AND_NONCE_LEN, 140);

/// Exclusive upper bound of an index value.
pub const INDEX_LIMIT: u32 = 1 << INDEX_BITS;

macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $what:literal) => {
        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Copy from a slice, rejecting any other length.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| Error::input_length($what, $len, bytes.len()))?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn into_bytes(self) -> [u8; $len] {
                self.0
            }

            /// Lowercase hex encoding, used for logging and serde.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = Error;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                Self::from_bytes(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let hex = self.to_hex();
                if hex.len() > 32 {
                    write!(f, "{}({}..)", stringify!($name), &hex[..32])
                } else {
                    write!(f, "{}({hex})", stringify!($name))
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                let bytes = hex::decode(raw).map_err(serde::de::Error::custom)?;
                Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Block header followed by its nonce, the input every solution is bound to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderAndNonce([u8; HEADER_AND_NONCE_LEN]);

fixed_bytes!(HeaderAndNonce, HEADER_AND_NONCE_LEN, "header and nonce");

impl HeaderAndNonce {
    pub fn from_parts(header: &[u8; HEADER_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        let mut data = [0u8; HEADER_AND_NONCE_LEN];
        data[..HEADER_LEN].copy_from_slice(header);
        data[HEADER_LEN..].copy_from_slice(nonce);
        Self(data)
    }

    /// Every byte set to `byte`.
    pub const fn filled(byte: u8) -> Self {
        Self([byte; HEADER_AND_NONCE_LEN])
    }

    pub fn header(&self) -> &[u8] {
        &self.0[..HEADER_LEN]
    }

    pub fn nonce(&self) -> &[u8] {
        &self.0[HEADER_LEN..]
    }

    /// Copy with `nonce` written little-endian into the last 8 bytes.
    ///
    /// The remaining nonce bytes are left as they are, so a caller can keep a
    /// fixed prefix in the upper part of the nonce.
    pub fn with_simple_nonce(&self, nonce: u64) -> Self {
        let mut data = self.0;
        data[HEADER_AND_NONCE_LEN - 8..].copy_from_slice(&nonce.to_le_bytes());
        Self(data)
    }
}

/// Bit-packed solution, the form used on the wire and in consensus data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinimalSolution([u8; MINIMAL_SOLUTION_LEN]);

fixed_bytes!(MinimalSolution, MINIMAL_SOLUTION_LEN, "minimal solution");

impl MinimalSolution {
    /// Copy with the byte order reversed.
    pub fn reversed(&self) -> Self {
        let mut data = self.0;
        data.reverse();
        Self(data)
    }
}

/// One index per leaf, in solution order. Every index is below [`INDEX_LIMIT`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExpandedSolution([u32; SOLUTION_INDICES]);

impl ExpandedSolution {
    pub fn new(indices: [u32; SOLUTION_INDICES]) -> Result<Self, Error> {
        check_range(&indices)?;
        Ok(Self(indices))
    }

    /// Caller guarantees every index is below [`INDEX_LIMIT`].
    pub(crate) const fn from_raw(indices: [u32; SOLUTION_INDICES]) -> Self {
        Self(indices)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn into_inner(self) -> [u32; SOLUTION_INDICES] {
        self.0
    }
}

fn check_range(indices: &[u32]) -> Result<(), Error> {
    match indices.iter().position(|&v| v >= INDEX_LIMIT) {
        Some(position) => Err(Error::IndexOutOfRange {
            position,
            value: indices[position],
            bits: INDEX_BITS,
        }),
        None => Ok(()),
    }
}

impl TryFrom<&[u32]> for ExpandedSolution {
    type Error = Error;

    fn try_from(indices: &[u32]) -> Result<Self, Self::Error> {
        let arr: [u32; SOLUTION_INDICES] = indices.try_into().map_err(|_| {
            Error::input_length("expanded solution", SOLUTION_INDICES, indices.len())
        })?;
        Self::new(arr)
    }
}

impl AsRef<[u32]> for ExpandedSolution {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Debug for ExpandedSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpandedSolution({:?}..)", &self.0[..4])
    }
}

impl Serialize for ExpandedSolution {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExpandedSolution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<u32>::deserialize(deserializer)?;
        Self::try_from(raw.as_slice()).map_err(serde::de::Error::custom)
    }
}

/// Result of validating a solution against a header and nonce.
///
/// The discriminants are the integer codes used at C-style engine boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum ValidationOutcome {
    Invalid = 0,
    Valid = 1,
    InternalError = -1,
}

impl ValidationOutcome {
    pub const fn code(self) -> i8 {
        self as i8
    }

    pub const fn is_valid(self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}
