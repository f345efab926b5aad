use alloy_primitives::{I256, U256};
use std::collections::HashMap;

use crate::indexer::rpc::registry::TypeRegistry;
use crate::models::datasets::actions::ActionEvent;
use crate::models::datasets::operations::{
    AccountData, AccountEvent, Amount, CurrencyId, Operation, StorageResourceId,
};
use crate::models::errors::TraceError;

/// `h(system) ++ h(account) ++ blake2_128(address)`, in hex characters. The
/// account key is transparent, so the raw address follows.
const ACCOUNT_KEY_ADDRESS_OFFSET: usize = 96;

/// Account events of each address, in order of each address's first
/// appearance. Events of one address keep their trace order.
pub type AccountEventsByAddress = Vec<(String, Vec<AccountEvent>)>;

pub trait AccountEventCorrelator {
    fn account_events_by_address<R: TypeRegistry + ?Sized>(
        &self,
        registry: &R,
    ) -> Result<AccountEventsByAddress, TraceError>;
}

impl AccountEventCorrelator for [ActionEvent] {
    fn account_events_by_address<R: TypeRegistry + ?Sized>(
        &self,
        registry: &R,
    ) -> Result<AccountEventsByAddress, TraceError> {
        let mut grouped: AccountEventsByAddress = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for event in self
            .iter()
            .filter(|e| e.event.storage_path.is_pallet_item("system", "account"))
        {
            let account_event = to_account_event(event, registry)?;
            match position.get(&account_event.address) {
                Some(&i) => grouped[i].1.push(account_event),
                None => {
                    position.insert(account_event.address.clone(), grouped.len());
                    grouped.push((account_event.address.clone(), vec![account_event]));
                }
            }
        }

        Ok(grouped)
    }
}

/// Decode the address and balances of a `system::account` event.
pub fn to_account_event<R: TypeRegistry + ?Sized>(
    event: &ActionEvent,
    registry: &R,
) -> Result<AccountEvent, TraceError> {
    let event_index = event.event.event_index;
    if !event.event.storage_path.is_pallet_item("system", "account") {
        return Err(
            TraceError::structural("Event did not have system::account path as expected")
                .at_event(event_index),
        );
    }

    let values = &event.event.event.data.string_values;
    let address_raw = values
        .key
        .as_deref()
        .and_then(|key| key.get(ACCOUNT_KEY_ADDRESS_OFFSET..))
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| {
            TraceError::decode(
                "Address",
                "expected encoded address in system::account event storage key",
            )
            .at_event(event_index)
        })?;
    let address = registry
        .decode_address(&format!("0x{address_raw}"))
        .map_err(|e| e.at_event(event_index))?;

    let encoded = values
        .result
        .as_deref()
        .and_then(|result| result.get(2..))
        .ok_or_else(|| {
            TraceError::decode("AccountInfo", "expected encoded account info in event result")
                .at_event(event_index)
                .for_address(address.clone())
        })?;
    // Leading byte is the `Option` tag
    let account_info = registry
        .decode_account_info(&format!("0x{encoded}"))
        .map_err(|e| e.at_event(event_index).for_address(address.clone()))?;

    Ok(AccountEvent {
        event: event.clone(),
        account_info,
        address,
    })
}

fn delta(current: U256, previous: U256) -> I256 {
    I256::from_raw(current) - I256::from_raw(previous)
}

fn balance_deltas(current: &AccountData, previous: &AccountData) -> [(&'static str, I256); 4] {
    [
        ("free", delta(current.free, previous.free)),
        ("reserved", delta(current.reserved, previous.reserved)),
        ("miscFrozen", delta(current.misc_frozen, previous.misc_frozen)),
        ("feeFrozen", delta(current.fee_frozen, previous.fee_frozen)),
    ]
}

/// Compare each account event against the previous one for the same address
/// and emit an operation per balance field that changed.
pub fn derive_operations(
    account_events: &AccountEventsByAddress,
    currency: &CurrencyId,
) -> Vec<Operation> {
    let mut operations = Vec::new();

    for (_, events) in account_events {
        // The first event of an address has nothing to compare against
        for pair in events.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            for (field, value) in balance_deltas(&current.account_info, &previous.account_info) {
                if value.is_zero() {
                    continue;
                }

                operations.push(Operation {
                    phase: current.event.phase.clone(),
                    parent_span_id: current.event.event.parent_span_id.clone(),
                    primary_span_id: current.event.primary_span_id.clone(),
                    event_index: current.event.event.event_index,
                    address: current.address.clone(),
                    storage: StorageResourceId {
                        pallet: "system".to_string(),
                        item: "Account".to_string(),
                        field1: "data".to_string(),
                        field2: field.to_string(),
                    },
                    amount: Amount {
                        value,
                        currency: currency.clone(),
                    },
                });
            }
        }
    }

    operations
}
