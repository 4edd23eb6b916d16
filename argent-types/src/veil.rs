//! Data model for the veil privacy-coin subsystem: denominations, mint
//! commitments and spend payloads. The cryptographic machinery lives in the
//! `argent-veil` crate; these are only the wire-level shapes.

use serde::{Deserialize, Serialize};

use crate::{Amount, Hash, COIN};

/// Fixed denominations a veil mint may carry. A mint burns exactly the
/// denomination's face value; a spend releases it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VeilDenomination {
    One,
    Five,
    Ten,
    Fifty,
    OneHundred,
    FiveHundred,
}

impl VeilDenomination {
    pub fn all() -> [VeilDenomination; 6] {
        [
            VeilDenomination::One,
            VeilDenomination::Five,
            VeilDenomination::Ten,
            VeilDenomination::Fifty,
            VeilDenomination::OneHundred,
            VeilDenomination::FiveHundred,
        ]
    }

    /// Face value in satoshis.
    pub fn value(&self) -> Amount {
        let coins = match self {
            VeilDenomination::One => 1,
            VeilDenomination::Five => 5,
            VeilDenomination::Ten => 10,
            VeilDenomination::Fifty => 50,
            VeilDenomination::OneHundred => 100,
            VeilDenomination::FiveHundred => 500,
        };
        coins * COIN
    }

    pub fn from_value(value: Amount) -> Option<VeilDenomination> {
        VeilDenomination::all().into_iter().find(|d| d.value() == value)
    }
}

impl std::fmt::Display for VeilDenomination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value() / COIN)
    }
}

/// A denomination-tagged commitment published in a block. The commitment
/// binds the (hidden) serial number and blinding randomness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPayload {
    pub denomination: VeilDenomination,
    pub commitment: Hash,
}

/// A spend proof referencing accumulator state at `reference_height` for a
/// denomination, plus the one-time serial number that prevents double
/// spends without revealing which mint was redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendPayload {
    pub denomination: VeilDenomination,
    /// Height whose accumulator checkpoint the membership proof targets.
    pub reference_height: u64,
    /// One-time serial. Consumable at most once across all chain history.
    pub serial: Hash,
    /// Big-endian bytes of the accumulated member the proof opens.
    pub member: Vec<u8>,
    /// Big-endian bytes of the accumulator membership witness.
    pub witness: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denomination_values_round_trip() {
        for denom in VeilDenomination::all() {
            assert_eq!(VeilDenomination::from_value(denom.value()), Some(denom));
        }
        assert_eq!(VeilDenomination::from_value(3 * COIN), None);
        assert_eq!(VeilDenomination::from_value(0), None);
    }
}
