//! Secondary-chain addresses and currencies known to the primary chain.

use super::{keccak256, AccountId, CurrencyId};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Blockchain {
    Ethereum,
    Rinkeby,
    Luniverse,
    Hardhat,
    Other(String),
}

impl Blockchain {
    pub fn as_str(&self) -> &str {
        match self {
            Blockchain::Ethereum => "ethereum",
            Blockchain::Rinkeby => "rinkeby",
            Blockchain::Luniverse => "luniverse",
            Blockchain::Hardhat => "hardhat",
            Blockchain::Other(name) => name.as_str(),
        }
    }

    /// Bytes hashed into ids; `Other` names are prefixed so they cannot alias a known chain
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Blockchain::Other(name) => [b"other:".as_slice(), name.as_bytes()].concat(),
            known => known.as_str().as_bytes().to_vec(),
        }
    }
}

/// An external address bound to the primary-chain account that proved ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAddress {
    pub blockchain: Blockchain,
    pub value: Address,
    pub owner: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyKind {
    Erc20 { contract: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub blockchain: Blockchain,
    pub kind: CurrencyKind,
}

impl Currency {
    pub fn erc20(blockchain: Blockchain, contract: Address) -> Self {
        Self {
            blockchain,
            kind: CurrencyKind::Erc20 { contract },
        }
    }

    pub fn id(&self) -> CurrencyId {
        let CurrencyKind::Erc20 { contract } = &self.kind;
        CurrencyId(keccak256(&[
            self.blockchain.encode().as_slice(),
            b"erc20",
            contract.as_bytes(),
        ]))
    }

    pub fn contract(&self) -> Address {
        match &self.kind {
            CurrencyKind::Erc20 { contract } => *contract,
        }
    }
}
