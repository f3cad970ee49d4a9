//! Logging setup for the service binary and embedding applications.
//!
//! Output is filtered with `RUST_LOG` when present. Otherwise the level passed by the
//! caller applies to this crate while dependencies stay at `warn`, which keeps
//! reqwest/hyper/tungstenite chatter out of the monitoring log.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Level used when neither `RUST_LOG` nor an explicit level is given
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Builds the filter directive for a default level
///
/// `RUST_LOG` always wins over `default_level`.
pub fn build_filter(default_level: Option<&str>) -> EnvFilter {
	if let Ok(filter) = EnvFilter::try_from_default_env() {
		return filter;
	}
	let level = default_level.unwrap_or(DEFAULT_LOG_LEVEL);
	EnvFilter::new(format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level))
}

/// Installs the global subscriber writing to stdout
pub fn setup_logging(
	default_level: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
	setup_logging_with_writer(std::io::stdout, default_level)
}

/// Installs the global subscriber with a custom writer
///
/// Fails when a global subscriber is already installed.
pub fn setup_logging_with_writer<W>(
	writer: W,
	default_level: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>
where
	W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
	tracing_subscriber::registry()
		.with(build_filter(default_level))
		.with(
			fmt::layer()
				.with_writer(writer)
				.event_format(
					fmt::format()
						.with_level(true)
						.with_target(true)
						.with_thread_ids(false)
						.with_thread_names(false)
						.with_ansi(false)
						.compact(),
				)
				.fmt_fields(fmt::format::PrettyFields::new()),
		)
		.try_init()?;
	Ok(())
}
