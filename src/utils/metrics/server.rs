//! Metrics server module
//!
//! Exposes the aggregator over HTTP: `/metrics` in the Prometheus text format for
//! scraping and `/metrics/snapshot` as JSON.

use actix_web::middleware::{Compress, DefaultHeaders, NormalizePath};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tracing::{error, info};

use crate::utils::metrics::MetricsAggregator;

pub type MetricsData = web::Data<Arc<MetricsAggregator>>;

async fn metrics_handler(metrics: MetricsData) -> impl Responder {
	match metrics.gather() {
		Ok(buffer) => HttpResponse::Ok()
			.content_type("text/plain; version=0.0.4; charset=utf-8")
			.body(buffer),
		Err(e) => {
			error!("Error gathering metrics: {}", e);
			HttpResponse::InternalServerError().finish()
		}
	}
}

async fn snapshot_handler(metrics: MetricsData) -> impl Responder {
	HttpResponse::Ok().json(metrics.snapshot())
}

/// Resolves the address to bind, listening on every interface inside a container
fn resolve_bind_address(bind_address: &str, in_docker: bool) -> String {
	if !in_docker {
		return bind_address.to_string();
	}
	match bind_address.split(':').nth(1) {
		Some(port) => format!("0.0.0.0:{}", port),
		None => "0.0.0.0:8081".to_string(),
	}
}

pub fn create_metrics_server(
	bind_address: String,
	metrics: Arc<MetricsAggregator>,
) -> std::io::Result<actix_web::dev::Server> {
	let in_docker = std::env::var("IN_DOCKER").unwrap_or_default() == "true";
	let actual_bind_address = resolve_bind_address(&bind_address, in_docker);

	info!(
		"Starting metrics server on {} (actual bind: {})",
		bind_address, actual_bind_address
	);

	Ok(HttpServer::new(move || {
		App::new()
			.wrap(Compress::default())
			.wrap(NormalizePath::trim())
			.wrap(DefaultHeaders::new())
			.app_data(web::Data::new(metrics.clone()))
			.route("/metrics", web::get().to(metrics_handler))
			.route("/metrics/snapshot", web::get().to(snapshot_handler))
	})
	.workers(2)
	.bind(actual_bind_address)?
	.shutdown_timeout(5)
	.run())
}
