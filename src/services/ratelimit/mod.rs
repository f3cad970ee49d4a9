//! Shared request-rate governor.
//!
//! Every outbound call (chain RPC, explorer API, marketplace API) acquires a slot on
//! its resource before touching the network.

mod error;
mod governor;

pub use error::RateLimitError;
pub use governor::{
	explorer_key, marketplace_key, rpc_key, Admission, OnLimit, RateGovernor,
};
