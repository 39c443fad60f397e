//! Journal signing keys and content hashing

use crate::{types::Signature, Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Ed25519 key the actor signs journal entries with
#[derive(Debug)]
pub struct KeyPair(SigningKey);

impl KeyPair {
    /// Fresh random key
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// Key from a hex seed, with or without a `0x` prefix
    pub fn from_seed_hex(seed: &str) -> Result<Self> {
        let bytes = hex::decode(seed.trim().trim_start_matches("0x"))
            .map_err(|e| Error::Config(format!("signing seed is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::Config(format!("signing seed must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Public half, as stored by verifiers
    pub fn public_key(&self) -> [u8; 32] {
        self.0.verifying_key().to_bytes()
    }

    /// Sign `message`
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.0.sign(message).to_bytes())
    }
}

/// Whether `signature` over `message` was made by `public_key`
///
/// Malformed signatures and keys count as invalid.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> bool {
    let Ok(signature) = DalekSignature::from_slice(signature.as_bytes()) else {
        return false;
    };
    VerifyingKey::from_bytes(public_key)
        .map(|key| key.verify(message, &signature).is_ok())
        .unwrap_or(false)
}

/// SHA-256 of `data`
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
