
use ed25519_dalek::{PublicKey as DalekPublicKey, Signature as DalekSignature, Verifier};

/// Verifies an ed25519 signature given raw byte slices.
///
/// Malformed keys or signatures simply fail verification; adversarial input
/// must never panic a validation path.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let key = match DalekPublicKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let sig = match DalekSignature::from_bytes(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::ArgentKeyPair;

    #[test]
    fn garbage_key_or_signature_fails_cleanly() {
        assert!(!verify_signature(&[0u8; 5], b"msg", &[0u8; 64]));
        let pair = ArgentKeyPair::generate();
        assert!(!verify_signature(&pair.public_key(), b"msg", &[0u8; 3]));
        assert!(!verify_signature(&pair.public_key(), b"msg", &[0u8; 64]));
    }
}
