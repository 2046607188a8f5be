// src/lib.rs
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use errors::{EcoScanError, ErrorKind};
pub use models::{AnalysisRequest, AnalysisResult};
pub use pipeline::Pipeline;
