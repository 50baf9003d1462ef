use crate::error::{LoanError, LoanResult};
use crate::model::{keccak256, AccountId};

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ed25519 signature produced by a primary-chain account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSignature(pub ed25519_dalek::Signature);

/// Signing key of a primary-chain account.
#[derive(Clone)]
pub struct AccountKey {
    signing: SigningKey,
}

impl AccountKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic development key, e.g. `AccountKey::from_seed("//Alice")`.
    pub fn from_seed(seed: &str) -> Self {
        let secret = keccak256(&[seed.as_bytes()]);
        Self {
            signing: SigningKey::from_bytes(secret.as_fixed_bytes()),
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> AccountSignature {
        AccountSignature(self.signing.sign(message))
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("account", &self.account_id())
            .finish_non_exhaustive()
    }
}

/// Verify `signature` over `message` against the account's public key.
pub fn verify(account: &AccountId, message: &[u8], signature: &AccountSignature) -> LoanResult<()> {
    let key = VerifyingKey::from_bytes(account.as_bytes())
        .map_err(|e| LoanError::InvalidSignature(format!("bad public key {}: {}", account, e)))?;
    key.verify(message, &signature.0)
        .map_err(|_| LoanError::InvalidSignature(format!("signature does not match {}", account)))
}
