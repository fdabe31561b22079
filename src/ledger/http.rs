use std::path::Path;

use alloy::primitives::{Address, I256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::transports::http::Http;
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, info};

use super::contract::{self, CentralStoresAudit};
use super::{ContractCall, LedgerClient, LedgerError, LedgerEventKind, RawLedgerEvent};
use crate::config::LedgerConfig;

/// Client for an Ethereum-compatible node whose accounts are unlocked on the
/// node itself.
pub struct HttpLedgerClient {
    provider: DynProvider,
    contract: Option<Address>,
    gas_limit: u64,
}

impl HttpLedgerClient {
    /// Builds a client. With a contract address configured, the ABI at
    /// `abi_path` must declare everything the bindings use.
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        if config.contract_address.is_some() {
            contract::verify_abi_file(Path::new(&config.abi_path))?;
        }
        Self::build(config, config.contract_address.as_deref())
    }

    /// A client that can report chain height but has no contract to talk to.
    pub fn unconfigured(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Self::build(config, None)
    }

    fn build(config: &LedgerConfig, contract: Option<&str>) -> Result<Self, LedgerError> {
        let url: Url = config.endpoint_url.parse().map_err(|e| {
            LedgerError::Transport(format!("invalid endpoint {}: {}", config.endpoint_url, e))
        })?;
        let http = Client::builder().timeout(config.request_timeout()).build()?;

        // Nonce, gas price and signing are left to the node.
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_client(RpcClient::new(Http::with_client(http, url), false))
            .erased();

        let contract = contract.map(parse_address).transpose()?;
        if let Some(address) = contract {
            info!(contract = %address, endpoint = %config.endpoint_url, "ledger contract bound");
        }

        Ok(Self {
            provider,
            contract,
            gas_limit: config.gas_limit,
        })
    }

    fn contract_address(&self) -> Result<Address, LedgerError> {
        self.contract
            .ok_or_else(|| LedgerError::NotConfigured("no contract address".into()))
    }
}

fn parse_address(value: &str) -> Result<Address, LedgerError> {
    value
        .parse()
        .map_err(|e| LedgerError::NotConfigured(format!("invalid address {}: {}", value, e)))
}

fn convert_log(kind: LedgerEventKind, log: &Log) -> Result<RawLedgerEvent, LedgerError> {
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| LedgerError::Decode("log without transaction hash".into()))?;
    let block_number = log
        .block_number
        .ok_or_else(|| LedgerError::Decode("log without block number".into()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| LedgerError::Decode("log without log index".into()))?;
    let log_index = u32::try_from(log_index)
        .map_err(|_| LedgerError::Decode(format!("log index {} out of range", log_index)))?;

    Ok(RawLedgerEvent {
        kind,
        transaction_hash: format!("{:?}", transaction_hash),
        block_number,
        log_index,
        args: contract::decode_args(kind, log)?,
    })
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn is_connected(&self) -> bool {
        self.provider.get_chain_id().await.is_ok()
    }

    async fn latest_block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn fetch_events(
        &self,
        kind: LedgerEventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLedgerEvent>, LedgerError> {
        let filter = Filter::new()
            .address(self.contract_address()?)
            .event_signature(contract::event_signature(kind))
            .from_block(BlockNumberOrTag::Number(from_block))
            .to_block(BlockNumberOrTag::Number(to_block));

        let logs = self.provider.get_logs(&filter).await?;
        debug!(event = %kind, from_block, to_block, count = logs.len(), "fetched logs");

        logs.iter()
            .filter(|log| !log.removed)
            .map(|log| convert_log(kind, log))
            .collect()
    }

    async fn submit_transaction(
        &self,
        call: &ContractCall,
        sender: &str,
    ) -> Result<String, LedgerError> {
        let audit = CentralStoresAudit::new(self.contract_address()?, &self.provider);
        let from = parse_address(sender)?;

        let pending = match call {
            ContractCall::CreateRequest {
                item_name,
                quantity,
                priority,
                reason,
            } => {
                audit
                    .createRequest(
                        item_name.clone(),
                        U256::from(*quantity),
                        priority.clone(),
                        reason.clone(),
                    )
                    .from(from)
                    .gas(self.gas_limit)
                    .send()
                    .await?
            }
            ContractCall::ApproveRequest {
                request_no,
                approved,
                reason,
            } => {
                audit
                    .approveRequest(U256::from(*request_no), *approved, reason.clone())
                    .from(from)
                    .gas(self.gas_limit)
                    .send()
                    .await?
            }
            ContractCall::AdjustStock {
                item_name,
                delta,
                reason,
            } => {
                let delta = I256::try_from(*delta).map_err(|e| LedgerError::Abi(e.to_string()))?;
                audit
                    .adjustStock(item_name.clone(), delta, reason.clone())
                    .from(from)
                    .gas(self.gas_limit)
                    .send()
                    .await?
            }
        };

        let hash = format!("{:?}", pending.tx_hash());
        debug!(function = call.function(), %hash, "ledger transaction submitted");
        Ok(hash)
    }

    fn contract_configured(&self) -> bool {
        self.contract.is_some()
    }
}
