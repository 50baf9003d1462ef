//! Fee schedule for primary-chain submissions

use super::{Call, SignedCall};
use crate::error::LoanResult;
use crate::model::constants::MIN_CLOSE_FEE;

use serde::Deserialize;

/// `base_fee + per_byte_fee * len`, floored at `min_close_fee` for closings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeeSchedule {
    pub base_fee: u128,
    pub per_byte_fee: u128,
    #[serde(default = "default_min_close_fee")]
    pub min_close_fee: u128,
}

fn default_min_close_fee() -> u128 {
    MIN_CLOSE_FEE
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: 1_000_000_000_000_000,
            per_byte_fee: 1_000_000_000_000,
            min_close_fee: MIN_CLOSE_FEE,
        }
    }
}

impl FeeSchedule {
    pub fn fee_for(&self, call: &SignedCall) -> LoanResult<u128> {
        let len = call.encoded_len()? as u128;
        let fee = self
            .base_fee
            .saturating_add(self.per_byte_fee.saturating_mul(len));

        Ok(match call.call {
            Call::CloseDealOrder { .. } => fee.max(self.min_close_fee.max(MIN_CLOSE_FEE)),
            _ => fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountKey;
    use crate::model::{DealOrderId, TransferId};
    use ethers::types::H256;

    fn close_call(key: &AccountKey, nonce: u64) -> SignedCall {
        SignedCall::sign(
            key,
            nonce,
            Call::CloseDealOrder {
                deal_id: DealOrderId::with_expiration(nonce, H256::random()),
                transfer_id: TransferId(H256::random()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_close_fee_has_floor() {
        let key = AccountKey::generate();
        let schedules = [
            FeeSchedule::default(),
            FeeSchedule {
                base_fee: 0,
                per_byte_fee: 0,
                min_close_fee: 0,
            },
        ];
        for schedule in schedules {
            for nonce in [0, 9, 1_000_000_000_000] {
                assert!(schedule.fee_for(&close_call(&key, nonce)).unwrap() >= MIN_CLOSE_FEE);
            }
        }
    }

    #[test]
    fn test_other_calls_scale_with_size() {
        let key = AccountKey::generate();
        let schedule = FeeSchedule::default();
        let call = SignedCall::sign(
            &key,
            0,
            Call::LockDealOrder {
                deal_id: DealOrderId::with_expiration(1, H256::zero()),
            },
        )
        .unwrap();
        let expected = schedule.base_fee
            + schedule.per_byte_fee * call.encoded_len().unwrap() as u128;
        assert_eq!(schedule.fee_for(&call).unwrap(), expected);
    }
}
