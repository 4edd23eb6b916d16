//! Keypair generation and signing for Argent.

use ed25519_dalek::{Keypair, Signer};
use rand::rngs::OsRng;

use argent_types::{PublicKey, Signature};

/// Represents a cryptographic key pair (public and secret key).
pub struct ArgentKeyPair {
    keypair: Keypair,
}

impl ArgentKeyPair {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        let keypair = Keypair::generate(&mut csprng);
        ArgentKeyPair { keypair }
    }

    /// Returns the raw public key bytes of this key pair.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public.to_bytes()
    }

    /// Signs the given message with the secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign(message).to_bytes()
    }
}
