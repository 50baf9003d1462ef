//! Borrower consent for the direct-registration path.
//!
//! The payload is `expiration (u64 LE) || ask guid || bid guid || terms`,
//! where each guid is its 36-byte hyphenated form and terms use
//! [`LoanTerms::encode`]. Verification is a pure function of these bytes and
//! the borrower's public key; no order-book state is consulted.

use super::keys::{verify, AccountKey, AccountSignature};
use crate::error::LoanResult;
use crate::model::{AccountId, BlockNumber, CorrelationId, LoanTerms};

pub fn encode_loan_params(
    expiration_block: BlockNumber,
    ask_guid: &CorrelationId,
    bid_guid: &CorrelationId,
    terms: &LoanTerms,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 72 + 105);
    out.extend_from_slice(&expiration_block.to_le_bytes());
    out.extend_from_slice(&ask_guid.to_bytes());
    out.extend_from_slice(&bid_guid.to_bytes());
    terms.encode(&mut out);
    out
}

pub fn sign_loan_params(
    borrower: &AccountKey,
    expiration_block: BlockNumber,
    ask_guid: &CorrelationId,
    bid_guid: &CorrelationId,
    terms: &LoanTerms,
) -> AccountSignature {
    borrower.sign(&encode_loan_params(expiration_block, ask_guid, bid_guid, terms))
}

pub fn verify_loan_params(
    borrower: &AccountId,
    signature: &AccountSignature,
    expiration_block: BlockNumber,
    ask_guid: &CorrelationId,
    bid_guid: &CorrelationId,
    terms: &LoanTerms,
) -> LoanResult<()> {
    verify(
        borrower,
        &encode_loan_params(expiration_block, ask_guid, bid_guid, terms),
        signature,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoanError;
    use crate::model::fixtures::loan_terms;
    use ethers::types::U256;
    use uuid::Uuid;

    #[test]
    fn test_payload_is_byte_stable() {
        let ask = CorrelationId(Uuid::from_u128(1));
        let bid = CorrelationId(Uuid::from_u128(2));
        let payload = encode_loan_params(100_000_000, &ask, &bid, &loan_terms());

        assert_eq!(&payload[..8], &100_000_000u64.to_le_bytes());
        assert_eq!(&payload[8..44], b"00000000-0000-0000-0000-000000000001");
        assert_eq!(&payload[44..80], b"00000000-0000-0000-0000-000000000002");
        assert_eq!(payload.len(), 80 + 105);
    }

    #[test]
    fn test_signature_binds_terms() {
        let borrower = AccountKey::generate();
        let (ask, bid) = (CorrelationId::new(), CorrelationId::new());
        let terms = loan_terms();
        let sig = sign_loan_params(&borrower, 500, &ask, &bid, &terms);

        assert!(verify_loan_params(&borrower.account_id(), &sig, 500, &ask, &bid, &terms).is_ok());

        let mut altered = terms.clone();
        altered.amount = U256::from(101u64);
        assert!(matches!(
            verify_loan_params(&borrower.account_id(), &sig, 500, &ask, &bid, &altered),
            Err(LoanError::InvalidSignature(_))
        ));
        assert!(verify_loan_params(&borrower.account_id(), &sig, 501, &ask, &bid, &terms).is_err());
        assert!(verify_loan_params(&borrower.account_id(), &sig, 500, &bid, &ask, &terms).is_err());
    }
}
