//! RSA-style one-way accumulator.
//!
//! Folding a member `m` in takes `acc' = acc^m mod N`. A membership witness
//! for `m` is the accumulation of every other member; raising it to `m`
//! reproduces the accumulator value. Members live in the odd-number domain so
//! none of them can be a factor of another's contribution.

use num_bigint::BigUint;
use num_traits::One;

use argent_types::Hash;

use crate::error::VeilError;

/// Fixed accumulator base. Coprime to the RSA modulus.
const GENERATOR: u32 = 3;

/// Maps a mint commitment into the accumulator's member domain: the
/// commitment hash read as a big-endian integer, forced odd.
pub fn member_from_commitment(commitment: &Hash) -> BigUint {
    BigUint::from_bytes_be(commitment) | BigUint::one()
}

/// Parses the network modulus out of its hex encoding.
pub fn parse_modulus(modulus_hex: &str) -> Result<BigUint, VeilError> {
    let bytes = hex::decode(modulus_hex).map_err(|e| VeilError::BadModulus(e.to_string()))?;
    if bytes.is_empty() {
        return Err(VeilError::BadModulus("empty modulus".to_string()));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

/// A running accumulator value over a fixed modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    modulus: BigUint,
    value: BigUint,
}

impl Accumulator {
    pub fn new(modulus: BigUint) -> Self {
        let value = BigUint::from(GENERATOR) % &modulus;
        Accumulator { modulus, value }
    }

    pub fn from_modulus_hex(modulus_hex: &str) -> Result<Self, VeilError> {
        Ok(Accumulator::new(parse_modulus(modulus_hex)?))
    }

    /// Restores an accumulator from a previously exported value.
    pub fn from_value_bytes(modulus: BigUint, value: &[u8]) -> Self {
        Accumulator { modulus, value: BigUint::from_bytes_be(value) }
    }

    /// Folds a member in.
    pub fn accumulate(&mut self, member: &BigUint) {
        self.value = self.value.modpow(member, &self.modulus);
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Big-endian export of the current value, the form checkpoints store.
    pub fn value_bytes(&self) -> Vec<u8> {
        self.value.to_bytes_be()
    }

    /// Digest of the current value, the form checkpoint headers commit to.
    pub fn digest(&self) -> Hash {
        *blake3::hash(&self.value_bytes()).as_bytes()
    }

    /// Builds the membership witness for `target` given every accumulated
    /// member: the accumulation of all the others, from the generator.
    pub fn witness_for<'a>(
        modulus: &BigUint,
        members: impl Iterator<Item = &'a BigUint>,
        target: &BigUint,
    ) -> MembershipWitness {
        let mut acc = Accumulator::new(modulus.clone());
        let mut seen_target = false;
        for member in members {
            // Exclude exactly one occurrence of the target.
            if !seen_target && member == target {
                seen_target = true;
                continue;
            }
            acc.accumulate(member);
        }
        MembershipWitness { witness: acc.value }
    }
}

/// Witness that a member is folded into an accumulator value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipWitness {
    witness: BigUint,
}

impl MembershipWitness {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        MembershipWitness { witness: BigUint::from_bytes_be(bytes) }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.witness.to_bytes_be()
    }

    /// True when `witness^member` reproduces `accumulator_value` under the
    /// modulus.
    pub fn verifies(
        &self,
        member: &BigUint,
        accumulator_value: &BigUint,
        modulus: &BigUint,
    ) -> bool {
        &self.witness.modpow(member, modulus) == accumulator_value
    }
}
