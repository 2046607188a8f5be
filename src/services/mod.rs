// src/services/mod.rs
pub mod image_processor;
pub mod llm_service;
pub mod merger;
pub mod pricing;
pub mod reasoning;
pub mod response_parser;
pub mod scoring;
pub mod vision;

pub use image_processor::ImageProcessor;
pub use llm_service::ModelBackend;
pub use reasoning::ReasoningEngine;
pub use vision::VisionAnalyzer;
