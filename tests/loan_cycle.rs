mod common;

use common::{Harness, SUPPLY};
use ethers::types::U256;
use loan_relay::ledger::LedgerClient;
use loan_relay::model::constants::MIN_CLOSE_FEE;
use loan_relay::model::{DealState, VerificationStatus};
use loan_relay::crypto::AccountKey;
use loan_relay::{CycleOutcome, LoanError, Party};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_cycle_closes_the_deal() {
    let h = Harness::start().await;

    let report = h
        .orchestrator
        .run_full_cycle(&h.lender, &h.borrower, h.terms())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcome::Closed);
    assert_eq!(report.state, DealState::Closed);
    assert!(report.close_fee.unwrap() >= MIN_CLOSE_FEE);

    let deal = h
        .devnet
        .ledger
        .deal_order(&report.deal_id)
        .await
        .unwrap()
        .unwrap();
    assert!(deal.offer_id.is_some());
    assert_eq!(deal.funding_transfer_id, report.funding_transfer);
    assert_eq!(deal.repayment_transfer_id, report.repayment_transfer);

    for id in [report.funding_transfer.unwrap(), report.repayment_transfer.unwrap()] {
        let transfer = h.devnet.ledger.transfer(&id).await.unwrap().unwrap();
        assert_eq!(transfer.status, VerificationStatus::Verified);
        assert!(transfer.processed);
    }

    // Principal went out and came back
    let supply = U256::from(SUPPLY);
    assert_eq!(h.devnet.evm.balance(&h.lender.evm_address()).unwrap(), supply);
    assert_eq!(h.devnet.evm.balance(&h.borrower.evm_address()).unwrap(), supply);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_and_exempt_cycle() {
    let h = Harness::start().await;

    let report = h
        .orchestrator
        .run_register_and_exempt(&h.lender, &h.borrower, h.terms())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcome::Exempted);
    assert_eq!(report.state, DealState::Exempted);
    assert!(report.repayment_transfer.is_none());

    let deal = h
        .devnet
        .ledger
        .deal_order(&report.deal_id)
        .await
        .unwrap()
        .unwrap();
    assert!(deal.offer_id.is_none());
    assert_eq!(deal.funding_transfer_id, report.funding_transfer);

    // The borrower keeps the forgiven principal
    assert_eq!(
        h.devnet.evm.balance(&h.borrower.evm_address()).unwrap(),
        U256::from(SUPPLY + 100)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cycles_reuse_registered_addresses() {
    let h = Harness::start().await;

    let first = h.orchestrator.setup(&h.lender, &h.borrower).await.unwrap();
    let report = h
        .orchestrator
        .run_register_and_exempt(&h.lender, &h.borrower, h.terms())
        .await
        .unwrap();
    let deal = h
        .devnet
        .ledger
        .deal_order(&report.deal_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!((deal.lender_address_id, deal.borrower_address_id), first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_setup_fails_as_a_whole() {
    let h = Harness::start().await;

    // Another account claims the borrower's wallet first
    let squatter = Party::new(AccountKey::generate(), h.borrower.wallet.clone());
    h.orchestrator.register_address(&squatter).await.unwrap();
    let height = h.devnet.ledger.block_height().await.unwrap();

    let result = h
        .orchestrator
        .run_full_cycle(&h.lender, &h.borrower, h.terms())
        .await;
    assert!(matches!(result, Err(LoanError::Unauthorized { .. })));

    // At most the lender's address registration landed; no order was submitted
    let after = h.devnet.ledger.block_height().await.unwrap();
    assert!(after <= height + 1);
    let nonce = h
        .devnet
        .ledger
        .account_nonce(&h.lender.account_id())
        .await
        .unwrap();
    assert!(nonce <= 1);
}
