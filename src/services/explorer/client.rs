//! Etherscan-style explorer client.
//!
//! Fetches NFT transfer history of an address (`tokennfttx` for ERC721,
//! `token1155tx` for ERC1155) page by page. Each page acquires a slot on the
//! `explorer:<name>` resource of the rate governor and is retried with the shared
//! backoff policy when the API reports a transient failure.

use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use url::Url;

use crate::{
	models::{NetworkId, NftStandard, NftTransfer},
	services::{
		explorer::ExplorerError,
		ratelimit::{explorer_key, Admission, RateGovernor},
	},
	utils::{
		create_retryable_http_client, fetch_paginated, BackoffPolicy, HttpRetryConfig,
		PaginationOptions, TransientErrorRetryStrategy, WithRetry,
	},
};

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
	/// Resource name, `etherscan` maps to the `explorer:etherscan` rate limit
	pub name: String,
	pub base_url: String,
	/// Injected by the caller, never read from the environment here
	pub api_key: Option<String>,
	pub pagination: PaginationOptions,
	pub retry: BackoffPolicy,
	pub http_retry: HttpRetryConfig,
	pub timeout: Duration,
}

impl ExplorerConfig {
	pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			base_url: base_url.into(),
			api_key: None,
			pagination: PaginationOptions::default(),
			retry: BackoffPolicy::default(),
			http_retry: HttpRetryConfig::default(),
			timeout: Duration::from_secs(30),
		}
	}

	pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = Some(api_key.into());
		self
	}
}

#[derive(Deserialize)]
struct ExplorerResponse {
	status: String,
	message: String,
	result: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTransfer {
	block_number: String,
	hash: String,
	from: String,
	to: String,
	contract_address: String,
	#[serde(rename = "tokenID")]
	token_id: String,
	#[serde(default)]
	token_value: Option<String>,
}

pub struct ExplorerClient {
	network: NetworkId,
	resource: String,
	base_url: Url,
	api_key: Option<String>,
	client: ClientWithMiddleware,
	governor: Arc<RateGovernor>,
	pagination: PaginationOptions,
	retry: WithRetry,
}

impl ExplorerClient {
	pub fn new(
		network: NetworkId,
		config: ExplorerConfig,
		governor: Arc<RateGovernor>,
	) -> Result<Self, ExplorerError> {
		let base_url = Url::parse(&config.base_url)
			.map_err(|e| ExplorerError::request_error(format!("Invalid explorer URL: {}", e)))?;
		let http_client = reqwest::Client::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| ExplorerError::request_error(e.to_string()))?;

		Ok(Self {
			network,
			resource: explorer_key(&config.name),
			base_url,
			api_key: config.api_key,
			client: create_retryable_http_client(
				&config.http_retry,
				http_client,
				Some(TransientErrorRetryStrategy),
			),
			governor,
			pagination: config.pagination,
			retry: WithRetry::new(config.retry),
		})
	}

	pub fn network(&self) -> NetworkId {
		self.network
	}

	/// NFT transfers involving `address`, newest first
	///
	/// # Arguments
	/// * `address` - Owner whose transfers are listed
	/// * `contract` - Restricts the history to one contract
	/// * `standard` - Selects the `tokennfttx` or `token1155tx` action
	pub async fn nft_transfers(
		&self,
		address: &str,
		contract: Option<&str>,
		standard: NftStandard,
	) -> Result<Vec<NftTransfer>, ExplorerError> {
		let address = self
			.network
			.normalize_address(address)
			.map_err(ExplorerError::request_error)?;

		fetch_paginated(&self.pagination, |page| {
			let address = address.clone();
			async move {
				self.retry
					.attempt(
						|| self.fetch_page(&address, contract, standard, page),
						ExplorerError::is_retryable,
					)
					.await
			}
		})
		.await
	}

	async fn fetch_page(
		&self,
		address: &str,
		contract: Option<&str>,
		standard: NftStandard,
		page: u32,
	) -> Result<Vec<NftTransfer>, ExplorerError> {
		let action = match standard {
			NftStandard::Erc721 => "tokennfttx",
			NftStandard::Erc1155 => "token1155tx",
		};

		if self.governor.acquire(&self.resource, action).await? == Admission::Skipped {
			return Err(ExplorerError::api_error("Skipped by rate governor"));
		}

		let mut query: Vec<(&str, String)> = vec![
			("module", "account".to_string()),
			("action", action.to_string()),
			("address", address.to_string()),
			("page", page.to_string()),
			("offset", self.pagination.page_size.to_string()),
			("sort", "desc".to_string()),
		];
		if let Some(contract) = contract {
			query.push(("contractaddress", contract.to_string()));
		}
		if let Some(api_key) = &self.api_key {
			query.push(("apikey", api_key.clone()));
		}

		tracing::debug!(resource = %self.resource, action, page, "Fetching explorer page");
		let response = self
			.client
			.get(self.base_url.clone())
			.query(&query)
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let message = format!("HTTP {} from explorer", status);
			return if status.is_server_error() || status.as_u16() == 429 {
				Err(ExplorerError::request_error(message))
			} else {
				Err(ExplorerError::api_error(message))
			};
		}

		let body: ExplorerResponse = response
			.json()
			.await
			.map_err(|e| ExplorerError::response_error(e.to_string()))?;
		self.parse_page(body, standard)
	}

	fn parse_page(
		&self,
		body: ExplorerResponse,
		standard: NftStandard,
	) -> Result<Vec<NftTransfer>, ExplorerError> {
		if body.status != "1" {
			let empty = body.result.as_array().is_some_and(|items| items.is_empty());
			if empty || body.message.starts_with("No transactions") {
				return Ok(Vec::new());
			}
			let detail = body.result.as_str().unwrap_or_default();
			return Err(ExplorerError::api_error(format!("{} {}", body.message, detail).trim().to_string()));
		}

		let entries: Vec<ExplorerTransfer> = serde_json::from_value(body.result)
			.map_err(|e| ExplorerError::response_error(format!("Malformed transfers: {}", e)))?;

		Ok(entries
			.into_iter()
			.map(|entry| NftTransfer {
				network: self.network,
				contract: entry.contract_address.to_ascii_lowercase(),
				token_id: entry.token_id,
				from: entry.from.to_ascii_lowercase(),
				to: entry.to.to_ascii_lowercase(),
				operator: None,
				value: match standard {
					NftStandard::Erc721 => "1".to_string(),
					NftStandard::Erc1155 => entry.token_value.unwrap_or_else(|| "1".to_string()),
				},
				standard,
				tx_hash: Some(entry.hash),
				block_number: entry.block_number.parse().ok(),
			})
			.collect())
	}
}
