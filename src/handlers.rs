// src/handlers.rs
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::{debug, info};

use crate::errors::EcoScanError;
use crate::models::AnalysisRequest;
use crate::pipeline::Pipeline;

const FILE_FIELD: &str = "image";
const BASE64_FIELD: &str = "image_base64";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").route("/analyze", web::post().to(analyze)))
        .route("/health", web::get().to(health_check));
}

/// Multipart upload with exactly one of an `image` file part or an
/// `image_base64` text part. Any image problem comes back as a 200 with
/// `status: "error"`; only a request with no image, or with both, is rejected.
pub async fn analyze(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let max_bytes = data.pipeline.config().max_image_bytes;
    let mut file: Option<(BytesMut, Option<String>)> = None;
    let mut encoded: Option<BytesMut> = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();
        let limit = match name.as_str() {
            FILE_FIELD => max_bytes,
            // base64 inflates by 4/3, plus room for a data URL prefix
            BASE64_FIELD => max_bytes / 3 * 4 + 256,
            other => {
                debug!("Skipping form field {:?}", other);
                while field.try_next().await?.is_some() {}
                continue;
            }
        };
        let content_type = field.content_type().map(|ct| ct.to_string());

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            if buffer.len() + chunk.len() > limit {
                return Err(EcoScanError::Validation(format!(
                    "field '{}' exceeds {} bytes",
                    name, limit
                ))
                .into());
            }
            buffer.extend_from_slice(&chunk);
        }

        if name == FILE_FIELD {
            file = Some((buffer, content_type));
        } else {
            encoded = Some(buffer);
        }
    }

    let request = match (file, encoded) {
        (Some(_), Some(_)) => {
            return Err(EcoScanError::Validation(format!(
                "send either an '{}' file or an '{}' field, not both",
                FILE_FIELD, BASE64_FIELD
            ))
            .into());
        }
        (Some((bytes, content_type)), None) => {
            AnalysisRequest::from_bytes(bytes.to_vec(), content_type)
        }
        (None, Some(text)) if !text.is_empty() => {
            let text = String::from_utf8(text.to_vec()).map_err(|_| {
                EcoScanError::Validation(format!("'{}' is not valid UTF-8", BASE64_FIELD))
            })?;
            AnalysisRequest::from_base64(text)
        }
        _ => {
            return Err(EcoScanError::Validation(format!(
                "no image provided; send an '{}' file or an '{}' field",
                FILE_FIELD, BASE64_FIELD
            ))
            .into());
        }
    };

    let result = data.pipeline.analyze(request).await;
    info!(
        "Analysis {} finished with status {:?}",
        result.request_id(),
        result.status()
    );
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "ecoscan",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
