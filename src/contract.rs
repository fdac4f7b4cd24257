//! Typed access to the registry and badge contracts.
//!
//! Raw return data is decoded exactly once, here, into [`PlantRecord`] or
//! [`LegacyPlant`]; a shape mismatch is an [`Error::Decode`].

use crate::abi::{Address, Decoder, Token, encode_call};
use crate::error::Result;
use crate::record::{LegacyPlant, PlantRecord};
use crate::rpc::RpcClient;
use std::sync::Arc;

/// Enumeration reads shared by every ERC-721 style contract we talk to.
pub trait TokenEnumerable {
    async fn total_supply(&self) -> Result<u64>;
    async fn balance_of(&self, owner: &Address) -> Result<u64>;
    async fn token_by_index(&self, index: u64) -> Result<u64>;
    async fn token_of_owner_by_index(&self, owner: &Address, index: u64) -> Result<u64>;
}

pub trait PlantRegistry: TokenEnumerable {
    async fn get_plant(&self, id: u64) -> Result<PlantRecord>;
    async fn plants(&self, id: u64) -> Result<LegacyPlant>;
}

/// State-changing registry calls. Each is one wallet-signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    RegisterPlant {
        species: String,
        name: String,
        photo_cid: String,
    },
    TransferStewardship {
        id: u64,
        new_steward: Address,
    },
    PhotoProof {
        id: u64,
        photo_cid: String,
    },
    MemorializePlant {
        id: u64,
    },
    ListForAdoption {
        id: u64,
        location: String,
    },
}

impl RegistryCall {
    pub fn signature(&self) -> &'static str {
        match self {
            RegistryCall::RegisterPlant { .. } => "registerPlant(string,string,string)",
            RegistryCall::TransferStewardship { .. } => "transferStewardship(uint256,address)",
            RegistryCall::PhotoProof { .. } => "photoProof(uint256,string)",
            RegistryCall::MemorializePlant { .. } => "memorializePlant(uint256)",
            RegistryCall::ListForAdoption { .. } => "listForAdoption(uint256,string)",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let args = match self {
            RegistryCall::RegisterPlant {
                species,
                name,
                photo_cid,
            } => vec![
                Token::String(species.clone()),
                Token::String(name.clone()),
                Token::String(photo_cid.clone()),
            ],
            RegistryCall::TransferStewardship { id, new_steward } => {
                vec![Token::Uint(*id), Token::Address(new_steward.clone())]
            }
            RegistryCall::PhotoProof { id, photo_cid } => {
                vec![Token::Uint(*id), Token::String(photo_cid.clone())]
            }
            RegistryCall::MemorializePlant { id } => vec![Token::Uint(*id)],
            RegistryCall::ListForAdoption { id, location } => {
                vec![Token::Uint(*id), Token::String(location.clone())]
            }
        };
        encode_call(self.signature(), &args)
    }
}

pub trait RegistryWriter {
    /// Submits `call` from `from` and resolves once mined, with the tx hash.
    async fn submit(&self, from: &Address, call: &RegistryCall) -> Result<String>;
}

/// A contract bound to an address on the shared RPC client.
#[derive(Clone)]
pub struct RpcContract {
    rpc: Arc<RpcClient>,
    address: Address,
}

impl RpcContract {
    pub fn new(rpc: Arc<RpcClient>, address: Address) -> Self {
        Self { rpc, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        self.rpc
            .eth_call(&self.address, &encode_call(signature, args))
            .await
    }

    async fn read_uint(&self, signature: &str, args: &[Token]) -> Result<u64> {
        let data = self.read(signature, args).await?;
        Decoder::new(&data).uint(0)
    }
}

impl TokenEnumerable for RpcContract {
    async fn total_supply(&self) -> Result<u64> {
        self.read_uint("totalSupply()", &[]).await
    }

    async fn balance_of(&self, owner: &Address) -> Result<u64> {
        self.read_uint("balanceOf(address)", &[Token::Address(owner.clone())])
            .await
    }

    async fn token_by_index(&self, index: u64) -> Result<u64> {
        self.read_uint("tokenByIndex(uint256)", &[Token::Uint(index)])
            .await
    }

    async fn token_of_owner_by_index(&self, owner: &Address, index: u64) -> Result<u64> {
        self.read_uint(
            "tokenOfOwnerByIndex(address,uint256)",
            &[Token::Address(owner.clone()), Token::Uint(index)],
        )
        .await
    }
}

impl PlantRegistry for RpcContract {
    async fn get_plant(&self, id: u64) -> Result<PlantRecord> {
        let data = self.read("getPlant(uint256)", &[Token::Uint(id)]).await?;
        decode_plant(id, &data)
    }

    async fn plants(&self, id: u64) -> Result<LegacyPlant> {
        let data = self.read("plants(uint256)", &[Token::Uint(id)]).await?;
        decode_legacy(id, &data)
    }
}

impl RegistryWriter for RpcContract {
    async fn submit(&self, from: &Address, call: &RegistryCall) -> Result<String> {
        self.rpc
            .send_transaction(from, &self.address, &call.encode())
            .await
    }
}

/// `getPlant` returns a single struct, encoded as one dynamic tuple.
pub fn decode_plant(id: u64, data: &[u8]) -> Result<PlantRecord> {
    let t = Decoder::new(data).tuple(0)?;
    Ok(PlantRecord {
        id,
        species: t.string(0)?,
        name: t.string(1)?,
        current_steward: t.address(2)?,
        last_proof_time: t.uint(3)?,
        latest_photo_ipfs: t.string(4)?,
        is_memorialized: t.boolean(5)?,
        stewards: t.address_array(6)?,
        is_up_for_adoption: t.boolean(7)?,
        location: t.string(8)?,
    })
}

/// The public mapping getter returns its fields as separate values.
pub fn decode_legacy(id: u64, data: &[u8]) -> Result<LegacyPlant> {
    let d = Decoder::new(data);
    Ok(LegacyPlant {
        id,
        species: d.string(0)?,
        name: d.string(1)?,
        current_steward: d.address(2)?,
        last_proof_time: d.uint(3)?,
        latest_photo_ipfs: d.string(4)?,
        is_memorialized: d.boolean(5)?,
    })
}
