//! BN254 (`alt_bn128`) wrappers around the arkworks implementation.
//!
//! The encoding follows the EVM precompiles: `G1` points are `x || y` and `G2`
//! points are `x.c1 || x.c0 || y.c1 || y.c0`, every coordinate being a 32 byte
//! big-endian integer.
use crate::encoding::{
    check_len, deserialize_fixed, serialize_fixed, Encode, EncodingError, FixedSize,
};
use crate::group::{CurveFrom, Element, PairingCurve as PC, Point, Scalar as Sc};
use ark_bn254::{Bn254, Fq, Fq12, Fq2, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{
    short_weierstrass_jacobian::GroupAffine, AffineCurve, PairingEngine, ProjectiveCurve,
    SWModelParameters,
};
use ark_ff::{BigInteger256, Field, PrimeField};
use ark_std::{One, UniformRand, Zero};
use rand_core::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    ops::{AddAssign, MulAssign, Neg, SubAssign},
};

/// Size of a base or scalar field element
const FIELD_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Scalar(Fr);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct G1(G1Projective);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct G2(G2Projective);

/// Element of the target group, only used to compare pairings
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GT(Fq12);

impl Element for Scalar {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(One::one())
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0)
    }

    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }
}

impl Sc for Scalar {
    fn set_int(&mut self, i: u64) {
        *self = Self(Fr::from(i))
    }

    fn inverse(&self) -> Option<Self> {
        Some(Self(Field::inverse(&self.0)?))
    }

    fn negate(&mut self) {
        *self = Self(self.0.neg())
    }

    fn sub(&mut self, other: &Self) {
        self.0.sub_assign(other.0);
    }
}

impl Encode for Scalar {
    fn encode(&self) -> Vec<u8> {
        field_to_bytes(&self.0)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        Ok(Self(field_from_bytes(bytes)?))
    }
}

impl FixedSize for Scalar {
    const SIZE: usize = FIELD_SIZE;
}

impl Element for G1 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(G1Projective::prime_subgroup_generator())
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0)
    }

    fn rand<R: RngCore>(rng: &mut R) -> Self {
        let mut p = Self::one();
        p.mul(&Scalar::rand(rng));
        p
    }
}

impl Point for G1 {}

impl Encode for G1 {
    fn encode(&self) -> Vec<u8> {
        let affine = self.0.into_affine();
        if affine.infinity {
            return vec![0u8; Self::SIZE];
        }

        let mut out = field_to_bytes(&affine.x);
        out.extend(field_to_bytes(&affine.y));
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        check_len(bytes, Self::SIZE)?;
        if is_all_zero(bytes) {
            return Ok(Self::new());
        }

        let x: Fq = field_from_bytes(&bytes[..FIELD_SIZE])?;
        let y: Fq = field_from_bytes(&bytes[FIELD_SIZE..])?;
        let affine: G1Affine = checked_point(x, y)?;
        Ok(Self(affine.into_projective()))
    }
}

impl FixedSize for G1 {
    const SIZE: usize = 2 * FIELD_SIZE;
}

impl Element for G2 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(G2Projective::prime_subgroup_generator())
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0)
    }

    fn rand<R: RngCore>(rng: &mut R) -> Self {
        let mut p = Self::one();
        p.mul(&Scalar::rand(rng));
        p
    }
}

impl Point for G2 {}

impl Encode for G2 {
    fn encode(&self) -> Vec<u8> {
        let affine = self.0.into_affine();
        if affine.infinity {
            return vec![0u8; Self::SIZE];
        }

        let mut out = Vec::with_capacity(Self::SIZE);
        for coord in [affine.x.c1, affine.x.c0, affine.y.c1, affine.y.c0] {
            out.extend(field_to_bytes(&coord));
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        check_len(bytes, Self::SIZE)?;
        if is_all_zero(bytes) {
            return Ok(Self::new());
        }

        let coords = bytes
            .chunks(FIELD_SIZE)
            .map(field_from_bytes::<Fq>)
            .collect::<Result<Vec<_>, _>>()?;
        let x = Fq2::new(coords[1], coords[0]);
        let y = Fq2::new(coords[3], coords[2]);
        let affine: G2Affine = checked_point(x, y)?;
        Ok(Self(affine.into_projective()))
    }
}

impl FixedSize for G2 {
    const SIZE: usize = 4 * FIELD_SIZE;
}

macro_rules! impl_serde_and_display {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                serialize_fixed(self, s)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                deserialize_fixed(d)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.encode()))
            }
        }
    )*};
}

impl_serde_and_display!(Scalar, G1, G2);

pub type G1Curve = CurveFrom<Scalar, G1>;
pub type G2Curve = CurveFrom<Scalar, G2>;

#[derive(Clone, Debug)]
pub struct PairingCurve;

impl PC for PairingCurve {
    type Scalar = Scalar;
    type G1 = G1;
    type G2 = G2;
    type GT = GT;

    fn pair(a: &Self::G1, b: &Self::G2) -> Self::GT {
        GT(Bn254::pairing(a.0, b.0))
    }
}

fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}

fn field_to_bytes<F: PrimeField<BigInt = BigInteger256>>(f: &F) -> Vec<u8> {
    // limbs are little-endian
    f.into_repr()
        .0
        .iter()
        .rev()
        .flat_map(|limb| limb.to_be_bytes())
        .collect()
}

fn field_from_bytes<F: PrimeField<BigInt = BigInteger256>>(
    bytes: &[u8],
) -> Result<F, EncodingError> {
    check_len(bytes, FIELD_SIZE)?;

    let mut limbs = [0u64; 4];
    for (i, chunk) in bytes.chunks(8).enumerate() {
        let mut limb = [0u8; 8];
        limb.copy_from_slice(chunk);
        limbs[3 - i] = u64::from_be_bytes(limb);
    }

    // from_repr returns None for values >= modulus
    F::from_repr(BigInteger256(limbs)).ok_or(EncodingError::NotCanonical)
}

fn checked_point<P: SWModelParameters>(
    x: P::BaseField,
    y: P::BaseField,
) -> Result<GroupAffine<P>, EncodingError> {
    let point = GroupAffine::<P>::new(x, y, false);
    if !point.is_on_curve() {
        return Err(EncodingError::NotOnCurve);
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(EncodingError::NotInSubgroup);
    }
    Ok(point)
}
