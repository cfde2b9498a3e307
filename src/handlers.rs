use crate::error::ApiError;
use crate::inference::LoadedModel;
use crate::metrics;
use crate::models::{round_to, HealthResponse, InputData, PredictionResponse};
use actix_web::{web, HttpResponse, Result};
use tracing::{error, info, warn};

pub async fn predict(
    model: web::Data<LoadedModel>,
    input: web::Json<InputData>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();
    if let Err(e) = input.validate(model.n_features()) {
        warn!("{}", e);
        return Err(e);
    }

    let model = model.into_inner();
    let prediction = web::block(move || model.predict(&input.data))
        .await
        .map_err(|e| {
            error!("Prediction error: inference worker failed: {}", e);
            ApiError::WorkerFailed
        })?
        .map_err(|e| {
            error!("Prediction error: {}", e);
            ApiError::Inference(e)
        })?;

    metrics::observe_inference(prediction.elapsed, prediction.confidence);
    let inference_time = prediction.elapsed.as_secs_f64();
    info!(
        "Prediction done. Output={}, Confidence={:.2}, Time={:.4}s",
        prediction.label, prediction.confidence, inference_time
    );

    Ok(HttpResponse::Ok().json(PredictionResponse {
        prediction: prediction.label,
        confidence: round_to(prediction.confidence, 2),
        inference_time: round_to(inference_time, 4),
    }))
}

pub async fn health() -> HttpResponse {
    info!("Health check accessed");
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Always fails; exercises the error-reporting path.
pub async fn error500() -> Result<HttpResponse, ApiError> {
    error!("Error 500 endpoint accessed");
    Err(ApiError::Diagnostic)
}

pub async fn metrics_export() -> Result<HttpResponse, ApiError> {
    let body = metrics::export().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        ApiError::Metrics(e)
    })?;
    Ok(HttpResponse::Ok()
        .content_type(metrics::content_type())
        .body(body))
}

pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

/// Malformed or mistyped request bodies become 400 responses.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::InvalidBody(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/error500").route(web::get().to(error500)))
        .service(web::resource("/metrics").route(web::get().to(metrics_export)));
}
