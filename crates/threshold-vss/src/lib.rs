//! # Threshold VSS
//!
//! This crate provides the cryptographic building blocks for a Feldman-style verifiable
//! secret sharing over a pairing-friendly curve: prime field scalars, points of both source
//! groups, polynomials over either of them and an ECIES scheme used to hand out private shares.
//!
//! ## Sharing a secret
//!
//! A dealer samples a random polynomial of degree `t - 1`, commits to it in both `G1` and `G2`
//! and evaluates it at every participant index. Indices start at 1, the evaluation at 0 is the
//! shared secret.
//!
//! ```rust
//! use threshold_vss::{
//!     curve::bn254::{Scalar, G1, G2},
//!     group::Element,
//!     poly::{Idx, Poly},
//! };
//!
//! let (n, t) = (5, 3);
//! let rng = &mut rand::thread_rng();
//! let private = Poly::<Scalar>::new_from(t - 1, rng);
//!
//! let commit_g1 = private.commit::<G1>();
//! let commit_g2 = private.commit::<G2>();
//!
//! for i in 1..=n as Idx {
//!     let share = private.eval(i).value;
//!     let mut expected = G1::one();
//!     expected.mul(&share);
//!     assert_eq!(commit_g1.eval(i).value, expected);
//!
//!     let mut expected = G2::one();
//!     expected.mul(&share);
//!     assert_eq!(commit_g2.eval(i).value, expected);
//! }
//! ```
//!
//! ## Wire format
//!
//! Every scalar and point has a fixed width, big-endian [`encoding`](encoding/index.html) which
//! matches the EVM precompile layout: 32 bytes per scalar, 64 bytes per `G1` point and 128
//! bytes per `G2` point. Decoding never reduces or truncates; out of range values are rejected.
//!
//! ## Features
//!
//! The only backend currently shipped is BN254 (`alt_bn128`), enabled by default with the
//! `bn254` feature.
//!
//! ```toml
//! threshold-vss = { version = "0.1", default-features = false, features = ["bn254"] }
//! ```

/// Curve implementations for the traits defined in the [`group`](group/index.html) module.
pub mod curve;

/// Elliptic Curve Integrated Encryption Scheme using SHA256 as the Key Derivation
pub mod ecies;

/// Fixed width, big-endian encoding of scalars and points.
pub mod encoding;

/// Definitions of generic traits with scalars of prime fields and points on elliptic curves.
pub mod group;

/// Implementation of a polynomial suitable to be used for secret sharing schemes and DKG
/// protocols. It can evaluate and interpolate private and public shares to their corresponding
/// polynomial.
pub mod poly;
