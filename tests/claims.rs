mod common;

use common::Harness;
use ethers::types::H256;
use loan_relay::chain::ValueTransferClient;
use loan_relay::crypto::sign_loan_params;
use loan_relay::deal::DirectRegistration;
use loan_relay::ledger::{Call, NonceMode};
use loan_relay::model::{
    AddressId, CorrelationId, DealOrderId, DealState, FailureReason, TransferKind,
};
use loan_relay::verification::VerificationResult;
use loan_relay::LoanError;

async fn new_deal(h: &Harness) -> DealOrderId {
    let (lender_address, borrower_address) =
        h.orchestrator.setup(&h.lender, &h.borrower).await.unwrap();
    let (ask_guid, bid_guid) = (CorrelationId::new(), CorrelationId::new());
    let terms = h.terms();
    let expiration = 10_000;
    let borrower_signature =
        sign_loan_params(&h.borrower.key, expiration, &ask_guid, &bid_guid, &terms);

    h.orchestrator
        .deals()
        .register_deal_order(
            DirectRegistration {
                lender_address_id: lender_address,
                borrower_address_id: borrower_address,
                terms,
                expiration_block: expiration,
                ask_guid,
                bid_guid,
                borrower: h.borrower.account_id(),
                borrower_signature,
            },
            &h.lender.key,
        )
        .await
        .unwrap()
        .id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mistagged_transfer_fails_verification() {
    let h = Harness::start().await;
    let deal_id = new_deal(&h).await;

    let receipt = h
        .devnet
        .evm
        .transfer(
            &h.lender.wallet,
            h.borrower.evm_address(),
            H256::repeat_byte(0x42),
            h.terms().amount,
        )
        .await
        .unwrap();
    let inclusion = receipt.inclusion();
    h.gate.await_confirmed(&inclusion).await.unwrap();

    let registered = h
        .orchestrator
        .transfers()
        .register_funding_transfer(TransferKind::ETHLESS, deal_id, &inclusion, &h.lender.key)
        .await
        .unwrap();
    let result = registered.verification().wait().await.unwrap();
    assert_eq!(
        result,
        VerificationResult::Failed {
            transfer_id: registered.transfer_id,
            reason: FailureReason::DealReferenceMismatch,
        }
    );

    let funded = h
        .orchestrator
        .deals()
        .fund_deal_order(deal_id, registered.transfer_id, &h.lender.key)
        .await;
    assert!(matches!(funded, Err(LoanError::TransferNotVerified { .. })));
    assert_eq!(
        h.orchestrator.deals().deal_state(&deal_id).await.unwrap(),
        DealState::New
    );

    // One secondary transaction backs at most one claim
    let again = h
        .orchestrator
        .transfers()
        .register_funding_transfer(TransferKind::ETHLESS, deal_id, &inclusion, &h.lender.key)
        .await;
    assert!(matches!(again, Err(LoanError::TransferAlreadyUsed { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_before_depth_fails_immediately() {
    let h = Harness::with_block_time(60_000).await;
    let deal_id = new_deal(&h).await;

    let receipt = h
        .devnet
        .evm
        .transfer(
            &h.lender.wallet,
            h.borrower.evm_address(),
            deal_id.reference(),
            h.terms().amount,
        )
        .await
        .unwrap();

    let result = h
        .orchestrator
        .transfers()
        .register_funding_transfer(
            TransferKind::ETHLESS,
            deal_id,
            &receipt.inclusion(),
            &h.lender.key,
        )
        .await;
    assert!(matches!(
        result,
        Err(LoanError::InsufficientConfirmations { required: 3, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_explicit_nonce_mismatch_then_auto_recovers() {
    let h = Harness::start().await;
    let call = Call::LockDealOrder {
        deal_id: DealOrderId::with_expiration(1, H256::zero()),
    };

    let result = h
        .devnet
        .session
        .submit_with(&h.lender.key, call, NonceMode::Explicit(42))
        .await;
    assert!(matches!(result, Err(LoanError::Nonce { .. })));

    h.orchestrator.register_address(&h.lender).await.unwrap();
    assert_eq!(
        h.devnet.session.nonces().peek(&h.lender.account_id()).await,
        Some(1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_session_refuses_work() {
    let h = Harness::start().await;
    h.devnet.session.close();

    let result = h
        .orchestrator
        .matcher()
        .submit_ask(
            AddressId(H256::zero()),
            h.terms(),
            10_000,
            CorrelationId::new(),
            &h.lender.key,
        )
        .await;
    assert!(matches!(result, Err(LoanError::SessionClosed)));
}
