//! Key slots and the orderings defined over them.
//!
//! Every index stores keys in fixed 32-byte slots ([`IndexKey`]). How a slot
//! is produced and how two slots compare depends on the [`KeyType`] of the
//! column the index belongs to:
//!
//! | type    | encoding                         | ordering                    |
//! |---------|----------------------------------|-----------------------------|
//! | integer | `i64` big-endian, zero padded    | signed numeric              |
//! | float   | IEEE-754 bits big-endian, padded | IEEE total order            |
//! | string  | UTF-8 bytes, zero padded         | byte-lexicographic          |
//! | blob    | raw bytes, zero padded           | byte-lexicographic          |
//!
//! ```
//! use comb_index::{IndexKey, KeyType};
//! use std::cmp::Ordering;
//!
//! let a = IndexKey::from_i64(-3);
//! let b = IndexKey::from_i64(2);
//! assert_eq!(KeyType::Integer.compare(&a, &b), Ordering::Less);
//! // the raw bytes of -3 sort after those of 2
//! assert_eq!(KeyType::Blob.compare(&a, &b), Ordering::Greater);
//! ```

use core::{cmp::Ordering, fmt};

use alloy_primitives::hex;
use byteorder::{BigEndian, ByteOrder};

use crate::{IndexError, Result};

/// Size of a key slot in bytes
pub const KEY_SIZE: usize = 32;

/// The scalar type of the keys held by an index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(strum::IntoStaticStr)]
#[derive(strum::VariantArray)]
#[derive(strum::EnumString)]
#[derive(num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum KeyType {
    /// 64-bit signed integers
    Integer = 1,
    /// UTF-8 strings
    String = 2,
    /// 64-bit floats
    Float = 3,
    /// Raw bytes
    Blob = 4,
}

impl KeyType {
    /// Returns the lowercase name of the type
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Compares two key slots under this type's ordering
    pub fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering {
        match self {
            Self::Integer => a.as_i64().cmp(&b.as_i64()),
            Self::Float => a.as_f64().total_cmp(&b.as_f64()),
            Self::String | Self::Blob => a.0.cmp(&b.0),
        }
    }
}

impl From<KeyType> for u8 {
    #[inline]
    fn from(key_type: KeyType) -> Self {
        key_type as Self
    }
}

impl fmt::Display for KeyType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 32-byte, zero-padded key slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct IndexKey([u8; KEY_SIZE]);

impl IndexKey {
    /// The all-zero slot
    pub const ZERO: Self = Self([0u8; KEY_SIZE]);

    /// Wraps a full slot
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copies `bytes` into a zero-padded slot
    ///
    /// Fails with [`IndexError::KeySizeExceeded`] if `bytes` is longer than
    /// [`KEY_SIZE`]; keys are never truncated.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > KEY_SIZE {
            return Err(IndexError::key_size(bytes.len(), KEY_SIZE));
        }
        let mut slot = [0u8; KEY_SIZE];
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(slot))
    }

    /// Encodes an integer key
    pub fn from_i64(value: i64) -> Self {
        let mut slot = [0u8; KEY_SIZE];
        BigEndian::write_i64(&mut slot[..8], value);
        Self(slot)
    }

    /// Encodes a float key from its IEEE-754 bit pattern
    pub fn from_f64(value: f64) -> Self {
        let mut slot = [0u8; KEY_SIZE];
        BigEndian::write_u64(&mut slot[..8], value.to_bits());
        Self(slot)
    }

    /// Encodes a string key
    pub fn from_str_key(value: &str) -> Result<Self> {
        Self::from_slice(value.as_bytes())
    }

    /// The slot bytes
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// The slot bytes with trailing zero padding removed
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }

    /// Reads the slot as an integer key
    pub fn as_i64(&self) -> i64 {
        BigEndian::read_i64(&self.0[..8])
    }

    /// Reads the slot as a float key
    pub fn as_f64(&self) -> f64 {
        f64::from_bits(BigEndian::read_u64(&self.0[..8]))
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", hex::encode(self.trimmed()))
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<[u8; KEY_SIZE]> for IndexKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for IndexKey {
    type Error = IndexError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_slice(bytes)
    }
}

impl TryFrom<&str> for IndexKey {
    type Error = IndexError;

    fn try_from(value: &str) -> Result<Self> {
        Self::from_str_key(value)
    }
}

impl AsRef<[u8]> for IndexKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_oversized_key_rejected() {
        let long = [1u8; KEY_SIZE + 1];
        assert!(matches!(
            IndexKey::from_slice(&long),
            Err(IndexError::KeySizeExceeded { size: 33, max: 32 })
        ));
        assert!(IndexKey::from_slice(&long[..KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_string_padding() {
        let key = IndexKey::try_from("abc").unwrap();
        assert_eq!(key.trimmed(), b"abc");
        assert!(key.as_bytes()[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_key_type_ids_and_names() {
        assert_eq!(KeyType::try_from(1u8).unwrap(), KeyType::Integer);
        assert_eq!(KeyType::try_from(4u8).unwrap(), KeyType::Blob);
        assert!(KeyType::try_from(9u8).is_err());
        assert_eq!("STRING".parse::<KeyType>().unwrap(), KeyType::String);
        assert_eq!(KeyType::Float.to_string(), "float");
    }

    #[test]
    fn test_float_ordering_handles_negatives() {
        let keys = [-10.5, -0.25, 0.0, 3.5, 1e9].map(IndexKey::from_f64);
        for pair in keys.windows(2) {
            assert_eq!(KeyType::Float.compare(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    proptest! {
        #[test]
        fn test_integer_order_matches_numeric(a in any::<i64>(), b in any::<i64>()) {
            let (ka, kb) = (IndexKey::from_i64(a), IndexKey::from_i64(b));
            prop_assert_eq!(KeyType::Integer.compare(&ka, &kb), a.cmp(&b));
            prop_assert_eq!(ka.as_i64(), a);
        }

        #[test]
        fn test_string_order_matches_bytes(a in "[a-z]{0,32}", b in "[a-z]{0,32}") {
            let (ka, kb) = (IndexKey::from_str_key(&a).unwrap(), IndexKey::from_str_key(&b).unwrap());
            prop_assert_eq!(KeyType::String.compare(&ka, &kb), a.as_bytes().cmp(b.as_bytes()));
        }
    }
}
