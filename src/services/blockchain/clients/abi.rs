//! Solidity interfaces read by the EVM client and the NFT transfer decoder.

use alloy::{primitives::B256, sol, sol_types::SolEvent};

sol! {
	/// ERC721 transfer. ERC20 emits the same signature with the amount unindexed.
	event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

	event TransferSingle(
		address indexed operator,
		address indexed from,
		address indexed to,
		uint256 id,
		uint256 value
	);

	event TransferBatch(
		address indexed operator,
		address indexed from,
		address indexed to,
		uint256[] ids,
		uint256[] values
	);

	function balanceOf(address owner) external view returns (uint256 balance);
}

/// `Transfer(address,address,uint256)`, shared by ERC20 and ERC721
pub const TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;

pub const TRANSFER_SINGLE_TOPIC: B256 = TransferSingle::SIGNATURE_HASH;

pub const TRANSFER_BATCH_TOPIC: B256 = TransferBatch::SIGNATURE_HASH;
