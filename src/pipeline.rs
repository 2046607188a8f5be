// src/pipeline.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::errors::EcoScanError;
use crate::models::{
    AnalysisRequest, AnalysisResult, PricingEstimate, ReasoningFinding, VisionFinding,
};
use crate::services::llm_service::{ModelBackend, build_backend, build_http_client};
use crate::services::{ImageProcessor, ReasoningEngine, VisionAnalyzer, merger, pricing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Preparing,
    VisionPending,
    ReasoningPending,
    Pricing,
    Merging,
    Done,
    Failed,
}

type PriceFn = fn(&VisionFinding, &ReasoningFinding) -> Result<PricingEstimate, EcoScanError>;

/// Per-request bookkeeping. Nothing here outlives one `analyze` call.
struct Run {
    id: Uuid,
    trace: Vec<PipelineState>,
    preview: Option<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            trace: vec![PipelineState::Received],
            preview: None,
        }
    }

    fn advance(&mut self, state: PipelineState) {
        debug!("[{}] -> {:?}", self.id, state);
        self.trace.push(state);
    }
}

/// Entry point for the web layer: image in, [`AnalysisResult`] out.
///
/// Safe to share across concurrent requests; the only shared state is the
/// HTTP connection pool inside the backends.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    image_processor: ImageProcessor,
    vision: VisionAnalyzer,
    reasoning: ReasoningEngine,
    estimate_price: PriceFn,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, EcoScanError> {
        config.validate()?;
        let client = build_http_client(config.request_timeout())?;
        let vision = build_backend(&config.vision, client.clone());
        let reasoning = build_backend(&config.reasoning, client);
        info!(
            "Pipeline ready: vision={} ({}), reasoning={} ({})",
            vision.name(),
            config.vision.model,
            reasoning.name(),
            config.reasoning.model
        );
        Ok(Self::with_backends(config, vision, reasoning))
    }

    pub fn with_backends(
        config: PipelineConfig,
        vision: Arc<dyn ModelBackend>,
        reasoning: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            image_processor: ImageProcessor::new(&config),
            vision: VisionAnalyzer::new(vision),
            reasoning: ReasoningEngine::new(reasoning, config.reasoning_uses_image),
            estimate_price: pricing::estimate,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Never fails: every stage error is folded into an `error` result.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        self.analyze_traced(request).await.0
    }

    /// Like [`Pipeline::analyze`], also returning the states the run went through.
    pub async fn analyze_traced(
        &self,
        request: AnalysisRequest,
    ) -> (AnalysisResult, Vec<PipelineState>) {
        let mut run = Run::new();
        let result = match self.execute(&mut run, &request).await {
            Ok(result) => {
                run.advance(PipelineState::Done);
                info!("[{}] analysis complete", run.id);
                result
            }
            Err(err) => {
                run.advance(PipelineState::Failed);
                match &err {
                    EcoScanError::IncompleteAnalysis(_) => {
                        error!("[{}] analysis defect: {}", run.id, err)
                    }
                    _ => warn!("[{}] analysis failed: {}", run.id, err),
                }
                AnalysisResult::failure(run.id, run.preview.take().unwrap_or_default(), &err)
            }
        };
        (result, run.trace)
    }

    async fn execute(
        &self,
        run: &mut Run,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResult, EcoScanError> {
        run.advance(PipelineState::Preparing);
        let image = self.image_processor.prepare(request)?;
        run.preview = Some(image.base64.clone());

        run.advance(PipelineState::VisionPending);
        let vision_analyzer = &self.vision;
        let prepared = &image;
        let vision = self
            .with_parse_retry(run.id, "vision", EcoScanError::VisionService, move |strict| {
                vision_analyzer.analyze(prepared, strict)
            })
            .await?;

        run.advance(PipelineState::ReasoningPending);
        let reasoning_engine = &self.reasoning;
        let finding = &vision;
        let reasoning = self
            .with_parse_retry(
                run.id,
                "reasoning",
                EcoScanError::ReasoningService,
                move |strict| reasoning_engine.analyze(finding, prepared, strict),
            )
            .await?;

        run.advance(PipelineState::Pricing);
        let estimate = if self.config.pricing_enabled {
            match (self.estimate_price)(&vision, &reasoning) {
                Ok(estimate) => Some(estimate),
                Err(err) => {
                    warn!("[{}] pricing skipped: {}", run.id, err);
                    None
                }
            }
        } else {
            None
        };

        run.advance(PipelineState::Merging);
        merger::merge(
            run.id,
            image.base64.clone(),
            Some(&vision),
            Some(&reasoning),
            estimate,
        )
    }

    /// Run one model stage. Parse failures get `parse_retries` extra attempts
    /// with the strict prompt; service failures and timeouts return at once.
    async fn with_parse_retry<T, F, Fut>(
        &self,
        request_id: Uuid,
        stage: &str,
        on_timeout: fn(String) -> EcoScanError,
        mut call: F,
    ) -> Result<T, EcoScanError>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = Result<T, EcoScanError>>,
    {
        let limit: Duration = self.config.request_timeout();
        let mut attempt: u32 = 0;
        loop {
            let strict = attempt > 0;
            let outcome = match tokio::time::timeout(limit, call(strict)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(on_timeout(format!(
                    "{} model did not answer within {}s",
                    stage,
                    limit.as_secs()
                ))),
            };

            match outcome {
                Err(err) if err.is_parse_error() && attempt < self.config.parse_retries => {
                    attempt += 1;
                    warn!(
                        "[{}] {} reply unusable ({}); retrying with strict prompt ({}/{})",
                        request_id, stage, err, attempt, self.config.parse_retries
                    );
                }
                other => return other,
            }
        }
    }
}
