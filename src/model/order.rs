//! Lender/borrower intents and the offers that pair them.

use super::{AccountId, AddressId, AskOrderId, BidOrderId, BlockNumber, LoanTerms};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskOrder {
    pub lender_address_id: AddressId,
    pub terms: LoanTerms,
    pub expiration_block: BlockNumber,
    pub block: BlockNumber,
    pub lender: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOrder {
    pub borrower_address_id: AddressId,
    pub terms: LoanTerms,
    pub expiration_block: BlockNumber,
    pub block: BlockNumber,
    pub borrower: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub ask_id: AskOrderId,
    pub bid_id: BidOrderId,
    pub expiration_block: BlockNumber,
    pub block: BlockNumber,
    pub lender: AccountId,
}

/// Anything that stops being usable after a block height.
pub trait Expiring {
    fn expiration_block(&self) -> BlockNumber;

    fn is_expired_at(&self, height: BlockNumber) -> bool {
        self.expiration_block() <= height
    }
}

impl Expiring for AskOrder {
    fn expiration_block(&self) -> BlockNumber {
        self.expiration_block
    }
}

impl Expiring for BidOrder {
    fn expiration_block(&self) -> BlockNumber {
        self.expiration_block
    }
}

impl Expiring for Offer {
    fn expiration_block(&self) -> BlockNumber {
        self.expiration_block
    }
}
