use bip39::Mnemonic;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use rand::RngCore;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Two-letter prefix identifying the axonchain address space.
pub const ADDRESS_PREFIX: &str = "AX";
const ADDRESS_VERSION: u8 = 0x00;
const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 1 + 20 + CHECKSUM_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key has invalid length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("signature has invalid length: expected {expected}, got {got}")]
    InvalidSignatureLength { expected: usize, got: usize },
    #[error("malformed key material")]
    Malformed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
    pub mnemonic: String,
}

/// Generates a fresh Ed25519 keypair with a BIP-39 mnemonic over its entropy.
/// Never fails.
pub fn generate_keypair() -> KeyMaterial {
    let mut entropy = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    keypair_from_entropy(&entropy)
}

fn keypair_from_entropy(entropy: &[u8; 16]) -> KeyMaterial {
    let seed = Sha256::digest(entropy);
    let signing = SigningKey::from_bytes(seed.as_ref().try_into().expect("sha256 output is 32 bytes"));
    let verify = signing.verifying_key();
    let mnemonic = Mnemonic::from_entropy(entropy).expect("16 bytes is a valid bip39 entropy length");
    KeyMaterial {
        public_key: verify.to_bytes().to_vec(),
        secret_key: signing.to_bytes().to_vec(),
        mnemonic: mnemonic.to_string(),
    }
}

/// Derives the same keypair every time for a given label. Used for the
/// deterministic system addresses minted at genesis (liquidity pool, burn,
/// developer) — same label, same address, forever.
pub fn generate_system_keypair(label: &str) -> KeyMaterial {
    let mut hasher = Sha256::new();
    hasher.update(b"axonchain-system-address-v1:");
    hasher.update(label.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    let signing = SigningKey::from_bytes(&seed);
    let verify = signing.verifying_key();
    // The mnemonic isn't meaningful for a deterministically-derived system
    // key, but callers expect KeyMaterial's shape, so derive one anyway from
    // the first 16 bytes of the seed.
    let mnemonic = Mnemonic::from_entropy(&seed[..16]).expect("16 bytes is a valid bip39 entropy length");
    KeyMaterial {
        public_key: verify.to_bytes().to_vec(),
        secret_key: signing.to_bytes().to_vec(),
        mnemonic: mnemonic.to_string(),
    }
}

/// Derives the base58, prefix-tagged address for a public key:
/// `AX` + base58(version ‖ RIPEMD160(SHA256(pub)) ‖ checksum4).
pub fn derive_address(pub_key: &[u8]) -> Result<String, CryptoError> {
    if pub_key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            got: pub_key.len(),
        });
    }
    let sha = Sha256::digest(pub_key);
    let hash160 = Ripemd160::digest(sha);

    let mut payload = Vec::with_capacity(1 + hash160.len());
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(&hash160);

    let checksum = double_sha256(&payload);
    payload.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    Ok(format!("{ADDRESS_PREFIX}{}", bs58::encode(payload).into_string()))
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Validates an address's prefix, base58 encoding, length and checksum.
/// Never panics on malformed input.
pub fn validate_address(address: &str) -> bool {
    let Some(encoded) = address.strip_prefix(ADDRESS_PREFIX) else {
        return false;
    };
    let Ok(payload) = bs58::decode(encoded).into_vec() else {
        return false;
    };
    if payload.len() != PAYLOAD_LEN {
        return false;
    }
    let (body, checksum) = payload.split_at(PAYLOAD_LEN - CHECKSUM_LEN);
    double_sha256(body)[..CHECKSUM_LEN] == *checksum
}

/// Signs `message` with a 32-byte Ed25519 secret key.
pub fn sign(secret_key: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let bytes: [u8; 32] = secret_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: secret_key.len(),
        })?;
    let signing = SigningKey::from_bytes(&bytes);
    Ok(signing.sign(message).to_bytes().to_vec())
}

/// Verifies an Ed25519 signature. Returns `false` on any malformed input
/// rather than erroring.
pub fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(pk_bytes): Result<[u8; 32], _> = public_key.try_into() else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig_bytes): Result<[u8; SIGNATURE_LENGTH], _> = signature.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    vk.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrips() {
        let kp = generate_keypair();
        let addr = derive_address(&kp.public_key).unwrap();
        assert!(addr.starts_with(ADDRESS_PREFIX));
        assert!(validate_address(&addr));
    }

    #[test]
    fn validate_address_rejects_garbage() {
        assert!(!validate_address(""));
        assert!(!validate_address("AXnotbase58!!!"));
        assert!(!validate_address("BXsomething"));
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = generate_keypair();
        let msg = b"block header bytes";
        let sig = sign(&kp.secret_key, msg).unwrap();
        assert!(verify(&kp.public_key, &sig, msg));
        assert!(!verify(&kp.public_key, &sig, b"tampered"));
    }

    #[test]
    fn verify_never_panics_on_malformed_input() {
        assert!(!verify(&[1, 2, 3], &[4, 5], b"msg"));
        assert!(!verify(&[0u8; 32], &[0u8; 64], b"msg"));
    }

    #[test]
    fn system_keypair_is_deterministic() {
        let a = generate_system_keypair("BURN_ADDRESS");
        let b = generate_system_keypair("BURN_ADDRESS");
        assert_eq!(a.public_key, b.public_key);
        assert_eq!(a.secret_key, b.secret_key);

        let other = generate_system_keypair("DEVELOPER");
        assert_ne!(a.public_key, other.public_key);
    }

    #[test]
    fn sign_rejects_wrong_key_length() {
        let err = sign(&[1, 2, 3], b"msg").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength { .. }));
    }
}
