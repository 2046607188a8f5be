// src/main.rs
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::info;

use ecoscan::config::PipelineConfig;
use ecoscan::handlers::{AppState, configure};
use ecoscan::pipeline::Pipeline;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting EcoScan service...");

    let config = PipelineConfig::from_env().context("loading configuration")?;
    let pipeline = Pipeline::new(config).context("building analysis pipeline")?;

    let app_state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let bind = std::env::var("ECOSCAN_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    info!("Starting HTTP server on {}", bind);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind.as_str())
    .with_context(|| format!("binding {}", bind))?
    .run()
    .await?;

    Ok(())
}
