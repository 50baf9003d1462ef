//! Domain model shared by the matching, lifecycle and verification layers

mod address;
pub mod constants;
mod deal;
mod ids;
mod order;
mod terms;
mod transfer;

pub use address::{Blockchain, Currency, CurrencyKind, RegisteredAddress};
pub use deal::{DealOrder, DealState};
pub use ids::{
    keccak256, AccountId, AddressId, AskOrderId, BidOrderId, BlockNumber, CorrelationId,
    CurrencyId, DealOrderId, OfferId, TransferId,
};
pub use order::{AskOrder, BidOrder, Expiring, Offer};
pub use terms::{Duration, InterestRate, InterestType, LoanTerms};
pub use transfer::{
    EvmTransferKind, FailureReason, Platform, Transfer, TransferDirection, TransferKind,
    VerificationStatus,
};

#[cfg(test)]
pub(crate) use terms::fixtures;
