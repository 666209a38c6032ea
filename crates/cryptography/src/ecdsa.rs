//! secp256r1 ECDSA verification.

use crate::{CryptoError, CryptoResult};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// A validated compressed secp256r1 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ECPoint([u8; 33]);

impl ECPoint {
    /// Parses and validates a compressed SEC1 encoding.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 33 || (bytes[0] != 0x02 && bytes[0] != 0x03) {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected 33-byte compressed point, got {} bytes",
                bytes.len()
            )));
        }
        VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let mut out = [0u8; 33];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Display for ECPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Verifies a 64-byte fixed-size signature over `message` with a compressed
/// secp256r1 public key. Malformed keys or signatures verify as false.
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

/// Produces a 64-byte fixed-size signature. Only test fixtures and the
/// genesis tooling sign inside this workspace.
pub fn sign(message: &[u8], private_key: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = SigningKey::from_slice(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
    let signature: Signature = key.sign(message);
    Ok(signature.to_bytes().to_vec())
}

/// Derives the compressed public key for a private scalar.
pub fn public_key(private_key: &[u8]) -> CryptoResult<ECPoint> {
    let key = SigningKey::from_slice(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
    let point = key.verifying_key().to_encoded_point(true);
    ECPoint::from_bytes(point.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn sign_and_verify() {
        let pk = public_key(&KEY).unwrap();
        let sig = sign(b"payload", &KEY).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(b"payload", &sig, pk.as_bytes()));
        assert!(!verify_signature(b"tampered", &sig, pk.as_bytes()));
    }

    #[test]
    fn rejects_bad_point() {
        assert!(ECPoint::from_bytes(&[0u8; 33]).is_err());
        assert!(ECPoint::from_bytes(&[0x04; 10]).is_err());
    }

    #[test]
    fn garbage_signature_is_false() {
        let pk = public_key(&KEY).unwrap();
        assert!(!verify_signature(b"payload", &[0u8; 64], pk.as_bytes()));
        assert!(!verify_signature(b"payload", &[1, 2, 3], pk.as_bytes()));
    }
}
