//! # ECIES
//!
//! Implements an Elliptic Curve Integrated Encryption Scheme using SHA256 as the Key Derivation
//! Function.
//!
//! # Examples
//!
//! ```rust
//! use threshold_vss::{
//!     ecies::{encrypt, decrypt},
//!     curve::bn254::G1Curve,
//!     group::{Curve, Element}
//! };
//!
//! let message = b"hello";
//! let rng = &mut rand::thread_rng();
//! let secret_key = <G1Curve as Curve>::Scalar::rand(rng);
//! let mut public_key = <G1Curve as Curve>::Point::one();
//! public_key.mul(&secret_key);
//!
//! // encrypt the message with the receiver's public key
//! let ciphertext = encrypt::<G1Curve, _>(&public_key, &message[..], rng).unwrap();
//!
//! // the receiver can then decrypt the ciphertext with their secret key
//! let cleartext = decrypt(&secret_key, &ciphertext).unwrap();
//!
//! assert_eq!(&message[..], &cleartext[..]);
//! ```
use crate::encoding::{Encode, EncodingError, FixedSize};
use crate::group::{Curve, Element};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// crypto imports
use chacha20poly1305::{
    aead::{Aead, NewAead},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

/// The nonce length
const NONCE_LEN: usize = 12;

/// The ephemeral key length
const KEY_LEN: usize = 32;

/// The Poly1305 tag length
const TAG_LEN: usize = 16;

/// A domain separator
const DOMAIN: [u8; 4] = [1, 9, 6, 9];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EciesError {
    /// The AEAD rejected the ciphertext, either because the key is wrong or
    /// because the ciphertext was tampered with
    #[error("could not decrypt ciphertext")]
    Decryption,
    #[error("could not encrypt plaintext")]
    Encryption,
    #[error("could not derive the symmetric key")]
    KeyDerivation,
}

/// An ECIES encrypted cipher. Contains the ciphertext's bytes as well as the
/// ephemeral public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Point: Serialize + for<'a> Deserialize<'a>")]
pub struct EciesCipher<C: Curve> {
    /// The ciphertext which was encrypted
    aead: Vec<u8>,
    /// The ephemeral public key corresponding to the scalar which was used to
    /// encrypt the plaintext
    ephemeral: C::Point,
    /// The nonce used to encrypt the ciphertext
    nonce: [u8; NONCE_LEN],
}

impl<C: Curve> EciesCipher<C> {
    /// Flips the last bit of the ciphertext. Decryption of the result always fails.
    pub fn taint(&mut self) {
        if let Some(last) = self.aead.last_mut() {
            *last ^= 1;
        }
    }
}

/// The ciphertext is encoded as `ephemeral || nonce || aead`
impl<C: Curve> Encode for EciesCipher<C> {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.ephemeral.encode();
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.aead);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let point_len = <C::Point as FixedSize>::SIZE;
        if bytes.len() < point_len + NONCE_LEN + TAG_LEN {
            return Err(EncodingError::TruncatedCiphertext(bytes.len()));
        }

        let ephemeral = C::Point::decode(&bytes[..point_len])?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[point_len..point_len + NONCE_LEN]);
        let aead = bytes[point_len + NONCE_LEN..].to_vec();

        Ok(Self {
            aead,
            ephemeral,
            nonce,
        })
    }
}

/// Encrypts the message with a public key (curve point) and returns a ciphertext
pub fn encrypt<C: Curve, R: RngCore>(
    to: &C::Point,
    msg: &[u8],
    rng: &mut R,
) -> Result<EciesCipher<C>, EciesError> {
    let eph_secret = C::Scalar::rand(rng);

    let mut ephemeral = C::Point::one();
    ephemeral.mul(&eph_secret);

    // dh = eph(yG) = eph * public
    let mut dh = to.clone();
    dh.mul(&eph_secret);

    // derive an ephemeral key from the public key
    let ephemeral_key = derive::<C>(&dh)?;

    // instantiate the AEAD scheme
    let aead = ChaCha20Poly1305::new(Key::from_slice(&ephemeral_key));

    // generate a random nonce
    let mut nonce: [u8; NONCE_LEN] = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let aead = aead
        .encrypt(Nonce::from_slice(&nonce), msg)
        .map_err(|_| EciesError::Encryption)?;

    Ok(EciesCipher {
        aead,
        nonce,
        ephemeral,
    })
}

/// Decrypts the message with a secret key (curve scalar) and returns the cleartext
pub fn decrypt<C: Curve>(
    private: &C::Scalar,
    cipher: &EciesCipher<C>,
) -> Result<Vec<u8>, EciesError> {
    // dh = private * (eph * G) = private * ephPublic
    let mut dh = cipher.ephemeral.clone();
    dh.mul(private);

    let ephemeral_key = derive::<C>(&dh)?;

    let aead = ChaCha20Poly1305::new(Key::from_slice(&ephemeral_key));

    aead.decrypt(Nonce::from_slice(&cipher.nonce), &cipher.aead[..])
        .map_err(|_| EciesError::Decryption)
}

/// Derives an ephemeral key from the provided public key
fn derive<C: Curve>(dh: &C::Point) -> Result<[u8; KEY_LEN], EciesError> {
    let serialized = dh.encode();

    // no salt is fine since we use ephemeral - static DH
    let h = Hkdf::<Sha256>::new(None, &serialized);
    let mut ephemeral_key = [0u8; KEY_LEN];
    h.expand(&DOMAIN, &mut ephemeral_key)
        .map_err(|_| EciesError::KeyDerivation)?;

    Ok(ephemeral_key)
}
