//! Proof that a primary-chain account controls an EVM address.

use crate::error::{LoanError, LoanResult};
use crate::model::{keccak256, AccountId};

use ethers::signers::LocalWallet;
use ethers::types::{Address, Signature, H256};

/// Hash the EVM wallet signs: keccak256 of the raw account id.
pub fn ownership_message(account: &AccountId) -> H256 {
    keccak256(&[account.as_bytes()])
}

pub fn prove_ownership(wallet: &LocalWallet, account: &AccountId) -> LoanResult<Signature> {
    wallet
        .sign_hash(ownership_message(account))
        .map_err(|e| LoanError::InvalidSignature(format!("wallet signing failed: {}", e)))
}

pub fn verify_ownership(address: Address, account: &AccountId, proof: &Signature) -> LoanResult<()> {
    let recovered = proof
        .recover(ownership_message(account))
        .map_err(|e| LoanError::InvalidSignature(format!("unrecoverable proof: {}", e)))?;

    if recovered != address {
        return Err(LoanError::InvalidSignature(format!(
            "proof recovers to {:?}, expected {:?}",
            recovered, address
        )));
    }
    Ok(())
}
