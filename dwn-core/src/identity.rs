// SPDX-License-Identifier: MIT OR Apache-2.0

//! ed25519 signing identities.
//!
//! Keys never appear in message envelopes directly. A signer is referenced
//! through the `kid` of a JWS signature entry and resolved to a
//! [`PublicKey`](crate::PublicKey) through the DID document of its
//! controller.
use std::fmt;

use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, Signer, SigningKey, Verifier,
    VerifyingKey,
};
use rand::rngs::OsRng;
use thiserror::Error;

/// Private ed25519 key used for signing.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the system's random number generator
    /// (CSPRNG) as a seed.
    pub fn new() -> Self {
        let mut csprng: OsRng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), SECRET_KEY_LENGTH))?;
        Ok(Self(SigningKey::from_bytes(&checked)))
    }

    /// Returns the private key represented as bytes.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Public ed25519 key used for signature verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; PUBLIC_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), PUBLIC_KEY_LENGTH))?;
        let key = VerifyingKey::from_bytes(&checked)
            .map_err(|_| IdentityError::InvalidPublicKeyBytes)?;
        Ok(Self(key))
    }

    /// Bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Convert the public key to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify a signature over the given bytes.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

/// ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), SIGNATURE_LENGTH))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&checked)))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature")
            .field(&hex::encode(self.to_bytes()))
            .finish()
    }
}

/// Error types for key and signature material.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Provided bytes have an invalid length.
    #[error("invalid key material length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Provided bytes do not encode a valid curve point.
    #[error("bytes do not encode a valid public key")]
    InvalidPublicKeyBytes,
}

#[cfg(test)]
mod tests {
    use super::{PrivateKey, PublicKey};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let public_key = private_key.public_key();

        let signature = private_key.sign(b"A very important message.");
        assert!(public_key.verify(b"A very important message.", &signature));
        assert!(!public_key.verify(b"A different message.", &signature));
    }

    #[test]
    fn key_round_trip() {
        let private_key = PrivateKey::new();
        let restored = PrivateKey::from_bytes(&private_key.to_bytes()).unwrap();
        assert_eq!(private_key.public_key(), restored.public_key());

        let public_key = private_key.public_key();
        let restored = PublicKey::from_bytes(public_key.as_bytes()).unwrap();
        assert_eq!(public_key, restored);
    }
}
