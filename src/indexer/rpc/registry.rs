use alloy_primitives::{hex, Address, U256};
use codec::{Decode, DecodeAll};
use sp_core::crypto::{AccountId32, Ss58AddressFormat, Ss58Codec};
use sp_core::twox_128;

use crate::models::common::{AccountInfoLayout, StorageEntry, StorageItem};
use crate::models::datasets::actions::camel_case;
use crate::models::datasets::operations::AccountData;
use crate::models::errors::TraceError;

/// Type information for the runtime a trace was produced by.
pub trait TypeRegistry {
    /// Decode a big-endian hex encoded `u32`.
    fn decode_u32(&self, hex: &str) -> Result<u32, TraceError>;

    /// Decode a SCALE encoded `AccountInfo` into its balance fields.
    fn decode_account_info(&self, hex: &str) -> Result<AccountData, TraceError>;

    /// Decode raw address bytes into their canonical string form.
    fn decode_address(&self, hex: &str) -> Result<String, TraceError>;

    /// Every storage item of the runtime with its hex key prefix.
    fn storage_items(&self) -> &[StorageItem];

    fn token_symbols(&self) -> &[String];
}

const BUILTIN_STORAGE_ENTRIES: [(&str, &str); 5] = [
    ("System", "Account"),
    ("System", "Number"),
    ("System", "Events"),
    ("Balances", "TotalIssuance"),
    ("Timestamp", "Now"),
];

/// `twox128(pallet) ++ twox128(item)`
pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
    let pallet_hash = twox_128(pallet.as_bytes());
    let item_hash = twox_128(item.as_bytes());
    [pallet_hash.as_slice(), item_hash.as_slice()].concat()
}

impl From<&StorageEntry> for StorageItem {
    fn from(entry: &StorageEntry) -> Self {
        StorageItem {
            module: camel_case(&entry.pallet),
            item: camel_case(&entry.item),
            key_prefix: hex::encode(storage_prefix(&entry.pallet, &entry.item)),
        }
    }
}

#[derive(Debug, Decode)]
struct AccountInfo<Data> {
    _nonce: u32,
    _consumers: u32,
    _providers: u32,
    _sufficients: u32,
    data: Data,
}

#[derive(Debug, Decode)]
struct FrozenAccountData {
    free: u128,
    reserved: u128,
    frozen: u128,
    _flags: u128,
}

#[derive(Debug, Decode)]
struct LegacyAccountData {
    free: u128,
    reserved: u128,
    misc_frozen: u128,
    fee_frozen: u128,
}

// A single freeze replaced both legacy locks; it is reported as `miscFrozen`
impl From<FrozenAccountData> for AccountData {
    fn from(data: FrozenAccountData) -> Self {
        AccountData {
            free: U256::from(data.free),
            reserved: U256::from(data.reserved),
            misc_frozen: U256::from(data.frozen),
            fee_frozen: U256::ZERO,
        }
    }
}

impl From<LegacyAccountData> for AccountData {
    fn from(data: LegacyAccountData) -> Self {
        AccountData {
            free: U256::from(data.free),
            reserved: U256::from(data.reserved),
            misc_frozen: U256::from(data.misc_frozen),
            fee_frozen: U256::from(data.fee_frozen),
        }
    }
}

/// Registry for FRAME runtimes: `system::account` holds the nonce, three
/// reference counters and `AccountData`.
#[derive(Debug, Clone)]
pub struct ScaleRegistry {
    storage_items: Vec<StorageItem>,
    token_symbols: Vec<String>,
    ss58_format: Ss58AddressFormat,
    account_info: AccountInfoLayout,
}

impl ScaleRegistry {
    pub fn new(token_symbols: Vec<String>, extra_entries: Vec<StorageEntry>) -> Self {
        let storage_items = BUILTIN_STORAGE_ENTRIES
            .iter()
            .map(|(pallet, item)| StorageEntry {
                pallet: pallet.to_string(),
                item: item.to_string(),
            })
            .chain(extra_entries)
            .map(|entry| StorageItem::from(&entry))
            .collect();

        Self {
            storage_items,
            token_symbols,
            ss58_format: Ss58AddressFormat::custom(0),
            account_info: AccountInfoLayout::default(),
        }
    }

    pub fn with_ss58_prefix(mut self, prefix: u16) -> Self {
        self.ss58_format = Ss58AddressFormat::custom(prefix);
        self
    }

    pub fn with_account_info_layout(mut self, layout: AccountInfoLayout) -> Self {
        self.account_info = layout;
        self
    }
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>, TraceError> {
    hex::decode(value).map_err(|e| TraceError::decode(what, format!("invalid hex {value:?}: {e}")))
}

fn decode_scale<T: DecodeAll>(what: &str, bytes: &[u8]) -> Result<T, TraceError> {
    T::decode_all(&mut &bytes[..]).map_err(|e| {
        TraceError::decode(what, format!("{e} ({} encoded bytes)", bytes.len()))
    })
}

impl TypeRegistry for ScaleRegistry {
    fn decode_u32(&self, hex: &str) -> Result<u32, TraceError> {
        let bytes = decode_hex("u32", hex)?;
        if bytes.len() > 4 {
            return Err(TraceError::decode(
                "u32",
                format!("expected at most 4 bytes, got {}", bytes.len()),
            ));
        }

        // Zero extend, then back to SCALE's little-endian order
        let mut encoded = [0u8; 4];
        for (slot, byte) in encoded.iter_mut().zip(bytes.iter().rev()) {
            *slot = *byte;
        }
        decode_scale::<u32>("u32", &encoded)
    }

    fn decode_account_info(&self, hex: &str) -> Result<AccountData, TraceError> {
        let bytes = decode_hex("AccountInfo", hex)?;
        match self.account_info {
            AccountInfoLayout::Frozen => {
                decode_scale::<AccountInfo<FrozenAccountData>>("AccountInfo", &bytes)
                    .map(|info| info.data.into())
            }
            AccountInfoLayout::Legacy => {
                decode_scale::<AccountInfo<LegacyAccountData>>("AccountInfo", &bytes)
                    .map(|info| info.data.into())
            }
        }
    }

    fn decode_address(&self, hex: &str) -> Result<String, TraceError> {
        let bytes = decode_hex("Address", hex)?;
        match bytes.len() {
            32 => {
                let account: AccountId32 = decode_scale("Address", &bytes)?;
                Ok(account.to_ss58check_with_version(self.ss58_format))
            }
            // AccountId20 on Ethereum compatible chains
            20 => Ok(Address::from_slice(&bytes).to_checksum(None)),
            n => Err(TraceError::decode(
                "Address",
                format!("expected 20 or 32 bytes, got {n}"),
            )),
        }
    }

    fn storage_items(&self) -> &[StorageItem] {
        &self.storage_items
    }

    fn token_symbols(&self) -> &[String] {
        &self.token_symbols
    }
}
