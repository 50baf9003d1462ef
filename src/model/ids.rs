//! Identifiers for primary-chain entities.
//!
//! Orders, offers and deals carry a composite id: the block at which the
//! entity expires plus a keccak256 content hash. The hash half of a
//! `DealOrderId` doubles as the deal reference embedded in secondary-chain
//! transfers. Addresses, currencies and transfers are keyed by a bare hash.

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use uuid::Uuid;

/// Primary-chain block height
pub type BlockNumber = u64;

/// keccak256 over the concatenation of `parts`
pub fn keccak256(parts: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256::from_slice(&hasher.finalize())
}

/// Primary-chain account: the raw ed25519 public key of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Caller-supplied token that distinguishes otherwise identical orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Canonical bytes: the UUID's hyphenated textual form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.hyphenated().to_string().into_bytes()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! expiring_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            pub expiration: BlockNumber,
            pub hash: H256,
        }

        impl $name {
            pub fn with_expiration(expiration: BlockNumber, hash: H256) -> Self {
                Self { expiration, hash }
            }

            /// Canonical bytes: little-endian expiration followed by the hash.
            pub fn to_bytes(&self) -> Vec<u8> {
                let mut out = Vec::with_capacity(40);
                out.extend_from_slice(&self.expiration.to_le_bytes());
                out.extend_from_slice(self.hash.as_bytes());
                out
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}/{:?}", self.expiration, self.hash)
            }
        }
    };
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub H256);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
    };
}

expiring_id!(
    /// Lender intent id: `(expiration, keccak(correlation id))`
    AskOrderId
);
expiring_id!(
    /// Borrower intent id: `(expiration, keccak(correlation id))`
    BidOrderId
);
expiring_id!(
    /// Offer id: `(expiration, keccak(ask id || bid id))`
    OfferId
);
expiring_id!(
    /// Deal id; `hash` is the deal reference used on the secondary chain
    DealOrderId
);

hash_id!(AddressId);
hash_id!(CurrencyId);
hash_id!(
    /// `keccak(blockchain || tx hash)`: one secondary tx backs at most one transfer
    TransferId
);

impl AskOrderId {
    pub fn new(expiration: BlockNumber, guid: &CorrelationId) -> Self {
        Self::with_expiration(expiration, keccak256(&[&guid.to_bytes()]))
    }
}

impl BidOrderId {
    pub fn new(expiration: BlockNumber, guid: &CorrelationId) -> Self {
        Self::with_expiration(expiration, keccak256(&[&guid.to_bytes()]))
    }
}

impl OfferId {
    pub fn new(expiration: BlockNumber, ask: &AskOrderId, bid: &BidOrderId) -> Self {
        Self::with_expiration(expiration, keccak256(&[&ask.to_bytes(), &bid.to_bytes()]))
    }
}

impl DealOrderId {
    /// Matched path: derived from the accepted offer.
    pub fn from_offer(expiration: BlockNumber, offer: &OfferId) -> Self {
        Self::with_expiration(expiration, keccak256(&[&offer.to_bytes()]))
    }

    /// Direct-registration path: derived from both correlation ids.
    pub fn from_guids(expiration: BlockNumber, ask: &CorrelationId, bid: &CorrelationId) -> Self {
        Self::with_expiration(expiration, keccak256(&[&ask.to_bytes(), &bid.to_bytes()]))
    }

    /// Reference embedded in secondary-chain transfers for this deal.
    pub fn reference(&self) -> H256 {
        self.hash
    }
}

impl TransferId {
    pub fn new(blockchain: &super::Blockchain, tx_hash: &H256) -> Self {
        Self(keccak256(&[blockchain.encode().as_slice(), tx_hash.as_bytes()]))
    }
}

impl AddressId {
    pub fn new(blockchain: &super::Blockchain, address: &ethers::types::Address) -> Self {
        Self(keccak256(&[blockchain.encode().as_slice(), address.as_bytes()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Blockchain;

    #[test]
    fn test_ids_are_content_derived() {
        let guid = CorrelationId::new();
        assert_eq!(AskOrderId::new(10, &guid), AskOrderId::new(10, &guid));
        assert_ne!(AskOrderId::new(10, &guid), AskOrderId::new(10, &CorrelationId::new()));
        assert_ne!(AskOrderId::new(10, &guid), AskOrderId::new(11, &guid));
    }

    #[test]
    fn test_transfer_id_depends_on_chain() {
        let tx = H256::repeat_byte(0xab);
        assert_ne!(
            TransferId::new(&Blockchain::Ethereum, &tx),
            TransferId::new(&Blockchain::Hardhat, &tx)
        );
    }

    #[test]
    fn test_other_chain_does_not_alias_known_chain() {
        let tx = H256::repeat_byte(0xab);
        let address = ethers::types::Address::repeat_byte(0x11);
        let other = Blockchain::Other("hardhat".into());
        assert_eq!(other.as_str(), Blockchain::Hardhat.as_str());
        assert_ne!(
            TransferId::new(&other, &tx),
            TransferId::new(&Blockchain::Hardhat, &tx)
        );
        assert_ne!(
            AddressId::new(&other, &address),
            AddressId::new(&Blockchain::Hardhat, &address)
        );
    }
}
