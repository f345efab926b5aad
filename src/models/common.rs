use serde::{Deserialize, Serialize};

use crate::models::datasets::actions::ActionGroup;
use crate::models::datasets::operations::Operation;
use crate::utils::retry::RetryConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub chain_name: String,
    pub rpc_url: String,
    pub token_symbols: Vec<String>,
    #[serde(default)]
    pub storage_items: Vec<StorageEntry>,
    #[serde(default)]
    pub ss58_prefix: u16,
    #[serde(default)]
    pub account_info: AccountInfoLayout,
    #[serde(default)]
    pub include_actions: bool,
    #[serde(default)]
    pub block_hashes: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    pub metrics: MetricsConfig,
}

/// A storage item named as in runtime metadata, e.g. `Balances`/`TotalIssuance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub pallet: String,
    pub item: String,
}

/// Encoding of `system::account` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountInfoLayout {
    /// `AccountData { free, reserved, frozen, flags }`
    #[default]
    Frozen,
    /// `AccountData { free, reserved, misc_frozen, fee_frozen }`
    Legacy,
}

/// A storage item the registry knows the key prefix of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub module: String,
    pub item: String,
    pub key_prefix: String,
}

/// Block a response was computed at. Height is a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct At {
    pub hash: String,
    pub height: String,
}

#[derive(Debug, Clone, Default)]
pub struct ActionsAndOperations {
    pub actions: Vec<ActionGroup>,
    pub operations: Vec<Operation>,
}
