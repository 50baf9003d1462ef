//! Loan terms shared by asks, bids, offers and deals.

use super::CurrencyId;
use crate::error::{LoanError, LoanResult};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Seconds + nanoseconds, mirroring the ledger's duration encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub secs: u64,
    pub nanos: u32,
}

impl Duration {
    pub const fn from_secs(secs: u64) -> Self {
        Self { secs, nanos: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.secs.to_le_bytes());
        out.extend_from_slice(&self.nanos.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterestType {
    Simple,
    Compound,
}

/// `rate_per_period / 10^decimals` accrued every `period`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterestRate {
    pub rate_per_period: u64,
    pub decimals: u64,
    pub period: Duration,
    pub interest_type: InterestType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanTerms {
    pub amount: U256,
    pub interest_rate: InterestRate,
    pub term_length: Duration,
    pub currency: CurrencyId,
}

impl LoanTerms {
    /// Structural checks performed before anything is submitted.
    pub fn validate(&self) -> LoanResult<()> {
        if self.amount.is_zero() {
            return Err(LoanError::InvalidTerms("amount must be positive".into()));
        }
        if self.term_length.is_zero() {
            return Err(LoanError::InvalidTerms("term length must be positive".into()));
        }
        if self.interest_rate.period.is_zero() {
            return Err(LoanError::InvalidTerms(
                "interest accrual period must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Amount that must be repaid before a deal can close.
    pub fn outstanding(&self) -> U256 {
        self.amount
    }

    /// Deterministic byte encoding used inside signature payloads.
    ///
    /// Layout: amount (32 bytes big-endian), rate_per_period (u64 LE),
    /// decimals (u64 LE), period (secs u64 LE, nanos u32 LE), interest type
    /// tag (1 byte), term length (secs u64 LE, nanos u32 LE), currency (32 bytes).
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut amount = [0u8; 32];
        self.amount.to_big_endian(&mut amount);
        out.extend_from_slice(&amount);
        out.extend_from_slice(&self.interest_rate.rate_per_period.to_le_bytes());
        out.extend_from_slice(&self.interest_rate.decimals.to_le_bytes());
        self.interest_rate.period.encode(out);
        out.push(match self.interest_rate.interest_type {
            InterestType::Simple => 0,
            InterestType::Compound => 1,
        });
        self.term_length.encode(out);
        out.extend_from_slice(self.currency.0.as_bytes());
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use ethers::types::H256;

    /// 100 units, 10 bps per minute, simple interest, 6000 second term.
    pub fn loan_terms() -> LoanTerms {
        LoanTerms {
            amount: U256::from(100u64),
            interest_rate: InterestRate {
                rate_per_period: 10,
                decimals: 4,
                period: Duration::from_secs(60),
                interest_type: InterestType::Simple,
            },
            term_length: Duration::from_secs(6000),
            currency: CurrencyId(H256::repeat_byte(7)),
        }
    }
}
