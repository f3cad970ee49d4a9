//! NFT transfer decoding and dispatch.
//!
//! Decodes ERC721 `Transfer`, ERC1155 `TransferSingle` and `TransferBatch` logs into
//! one [`NftTransfer`] per token id, then matches them against the monitored entries
//! of a network.

use alloy::{
	primitives::{Address, U256},
	sol_types::SolEvent,
};

use crate::{
	models::{
		MonitorEvent, MonitoredNft, NetworkId, NftOwnershipChange, NftStandard, NftTransfer,
		OwnershipDirection,
	},
	services::blockchain::{
		abi::{Transfer, TransferBatch, TransferSingle},
		RawLog,
	},
};

fn format_address(address: &Address) -> String {
	alloy::hex::encode_prefixed(address.as_slice())
}

fn decode<E: SolEvent>(log: &RawLog) -> Result<E, String> {
	E::decode_raw_log(log.topics.iter().copied(), &log.data)
		.map_err(|e| format!("Malformed {}: {}", E::SIGNATURE, e))
}

/// Decodes a transfer log into one transfer per token id
///
/// Logs that are not NFT transfers yield nothing. ERC20 `Transfer` logs share the
/// ERC721 topic but index only two arguments, so only the four-topic form is taken.
///
/// # Errors
/// Returns a description of the problem when a recognised log is malformed.
pub fn decode_transfer_log(network: NetworkId, log: &RawLog) -> Result<Vec<NftTransfer>, String> {
	let Some(signature) = log.topics.first().copied() else {
		return Ok(Vec::new());
	};

	let base = |standard,
	            token_id: U256,
	            from: &Address,
	            to: &Address,
	            operator: Option<&Address>,
	            value: U256| {
		NftTransfer {
			network,
			contract: format_address(&log.address),
			token_id: token_id.to_string(),
			from: format_address(from),
			to: format_address(to),
			operator: operator.map(format_address),
			value: value.to_string(),
			standard,
			tx_hash: log.transaction_hash.map(|hash| hash.to_string()),
			block_number: log.block_number,
		}
	};

	if signature == Transfer::SIGNATURE_HASH {
		if log.topics.len() != 4 {
			return Ok(Vec::new());
		}
		let event: Transfer = decode(log)?;
		return Ok(vec![base(
			NftStandard::Erc721,
			event.tokenId,
			&event.from,
			&event.to,
			None,
			U256::from(1u8),
		)]);
	}

	if signature == TransferSingle::SIGNATURE_HASH {
		let event: TransferSingle = decode(log)?;
		return Ok(vec![base(
			NftStandard::Erc1155,
			event.id,
			&event.from,
			&event.to,
			Some(&event.operator),
			event.value,
		)]);
	}

	if signature != TransferBatch::SIGNATURE_HASH {
		return Ok(Vec::new());
	}
	let event: TransferBatch = decode(log)?;
	if event.ids.len() != event.values.len() {
		return Err(format!(
			"TransferBatch with {} ids and {} values",
			event.ids.len(),
			event.values.len()
		));
	}
	Ok(event
		.ids
		.iter()
		.zip(&event.values)
		.map(|(id, value)| {
			base(
				NftStandard::Erc1155,
				*id,
				&event.from,
				&event.to,
				Some(&event.operator),
				*value,
			)
		})
		.collect())
}

/// Events produced by one transfer
///
/// `NftTransfer` is emitted once when the contract is watched as a collection or when
/// at least one monitored address takes part, followed by one ownership change per
/// matching address and direction.
pub fn dispatch_transfer<'a>(
	transfer: &NftTransfer,
	entries: impl IntoIterator<Item = &'a MonitoredNft>,
	collection_watched: bool,
) -> Vec<MonitorEvent> {
	let mut ownership = Vec::new();
	for entry in entries {
		if !entry.accepts(&transfer.contract, transfer.standard) {
			continue;
		}
		if entry.address == transfer.from {
			ownership.push((entry.address.clone(), OwnershipDirection::Send));
		}
		if entry.address == transfer.to {
			ownership.push((entry.address.clone(), OwnershipDirection::Receive));
		}
	}

	if ownership.is_empty() && !collection_watched {
		return Vec::new();
	}

	let mut events = Vec::with_capacity(ownership.len() + 1);
	events.push(MonitorEvent::NftTransfer(transfer.clone()));
	events.extend(ownership.into_iter().map(|(address, direction)| {
		MonitorEvent::NftOwnershipChange(NftOwnershipChange {
			network: transfer.network,
			address,
			direction,
			transfer: transfer.clone(),
		})
	}));
	events
}
