//! Fixed width encoding used on the ledger.
//!
//! Field elements are 32 byte big-endian integers which must be strictly below
//! the field modulus. Points are the concatenation of their affine coordinates,
//! with the point at infinity encoded as all zeroes.

use serde::{
    de::{Error as DeserializeError, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserializer, Serializer,
};
use std::{fmt, marker::PhantomData};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("value is not below the field modulus")]
    NotCanonical,
    #[error("point is not on the curve")]
    NotOnCurve,
    #[error("point is not in the prime order subgroup")]
    NotInSubgroup,
    #[error("ciphertext is too short ({0} bytes)")]
    TruncatedCiphertext(usize),
}

/// Types with a canonical byte representation.
pub trait Encode: Sized {
    /// Returns the canonical encoding
    fn encode(&self) -> Vec<u8>;

    /// Parses the canonical encoding, rejecting anything else
    fn decode(bytes: &[u8]) -> Result<Self, EncodingError>;
}

/// Types whose encoding always has the same length.
pub trait FixedSize: Encode {
    const SIZE: usize;
}

/// Concatenates the encodings of all items.
pub fn encode_flat<E: FixedSize>(items: &[E]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() * E::SIZE);
    for item in items {
        out.extend_from_slice(&item.encode());
    }
    out
}

/// Splits a flat buffer in `E::SIZE` chunks and decodes each one of them.
pub fn decode_flat<E: FixedSize>(bytes: &[u8]) -> Result<Vec<E>, EncodingError> {
    if bytes.len() % E::SIZE != 0 {
        return Err(EncodingError::InvalidLength {
            expected: (bytes.len() / E::SIZE + 1) * E::SIZE,
            actual: bytes.len(),
        });
    }

    bytes.chunks(E::SIZE).map(E::decode).collect()
}

/// Checks the length of `bytes` against the expected one.
pub(crate) fn check_len(bytes: &[u8], expected: usize) -> Result<(), EncodingError> {
    if bytes.len() != expected {
        return Err(EncodingError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

// Serde implementations for fixed size types, serialized as a tuple of bytes so
// that bincode does not emit a length prefix.

pub(crate) fn serialize_fixed<S, E>(e: &E, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    E: FixedSize,
{
    let bytes = e.encode();
    let mut tup = s.serialize_tuple(E::SIZE)?;
    for byte in &bytes {
        tup.serialize_element(byte)?;
    }
    tup.end()
}

pub(crate) fn deserialize_fixed<'de, D, E>(deserializer: D) -> Result<E, D::Error>
where
    D: Deserializer<'de>,
    E: FixedSize,
{
    struct FixedVisitor<E>(PhantomData<E>);

    impl<'de, E: FixedSize> Visitor<'de> for FixedVisitor<E> {
        type Value = E;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "{} encoded bytes", E::SIZE)
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<E, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let bytes: Vec<u8> = (0..E::SIZE)
                .map(|_| {
                    seq.next_element()?
                        .ok_or_else(|| DeserializeError::custom("could not read bytes"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            E::decode(&bytes).map_err(DeserializeError::custom)
        }
    }

    deserializer.deserialize_tuple(E::SIZE, FixedVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::bn254::{Scalar, G1};
    use crate::group::Element;

    #[test]
    fn flat_roundtrip_and_bad_length() {
        let rng = &mut rand::thread_rng();
        let points = (0..3).map(|_| G1::rand(rng)).collect::<Vec<_>>();
        let flat = encode_flat(&points);
        assert_eq!(flat.len(), 3 * G1::SIZE);
        assert_eq!(decode_flat::<G1>(&flat).unwrap(), points);

        let err = decode_flat::<G1>(&flat[..flat.len() - 1]).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidLength { .. }));
    }

    #[test]
    fn empty_flat_buffer() {
        assert!(decode_flat::<Scalar>(&[]).unwrap().is_empty());
    }
}
