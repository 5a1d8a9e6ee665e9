//! HTTP prediction service.
//!
//! The model is loaded once into an [`AppContext`] and shared read-only with
//! every handler through router state.
use crate::bundle::{Metadata, Metrics, ModelBundle};
use crate::classifier::SoftmaxRegression;
use crate::config::ServiceConfig;
use crate::error::{DigitError, Result};
use crate::features::FeatureKind;
use crate::linalg;
use crate::pca::Pca;
use crate::preprocess;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// A validated bundle, unpacked for prediction.
#[derive(Debug)]
pub struct LoadedModel {
    pub classifier: SoftmaxRegression,
    pub pca: Pca,
    pub feature_kind: FeatureKind,
    pub model_type: String,
    pub metrics: Metrics,
    pub metadata: Metadata,
}

impl LoadedModel {
    pub fn from_bundle(bundle: ModelBundle) -> Result<Self> {
        bundle.validate()?;
        Ok(Self {
            classifier: bundle.model.to_classifier()?,
            feature_kind: bundle.metadata.feature_kind,
            pca: bundle.pca,
            model_type: bundle.model_type,
            metrics: bundle.metrics,
            metadata: bundle.metadata,
        })
    }
}

/// Result of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub digit: usize,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}

/// Process-wide, immutable service state.
#[derive(Debug, Default)]
pub struct AppContext {
    model: Option<LoadedModel>,
}

impl AppContext {
    /// A context with no model; every prediction fails with `ModelUnavailable`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(model: LoadedModel) -> Self {
        Self { model: Some(model) }
    }

    /// Loads the bundle at `path`. A failure is logged and yields an empty
    /// context so the process can still answer health checks.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        info!(path = %path.display(), "loading model bundle");
        match ModelBundle::load(path).and_then(LoadedModel::from_bundle) {
            Ok(model) => {
                info!(
                    accuracy = model.metrics.accuracy,
                    features = %model.feature_kind,
                    input_dim = model.pca.input_dim(),
                    n_components = model.pca.n_components,
                    "model loaded"
                );
                Self::with_model(model)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "model load failed; serving without a model");
                Self::empty()
            }
        }
    }

    pub fn model(&self) -> Result<&LoadedModel> {
        self.model.as_ref().ok_or(DigitError::ModelUnavailable)
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn pca_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Preprocess `payload`, project it and classify it.
    pub fn predict(&self, payload: &str) -> Result<Prediction> {
        let model = self.model()?;
        let features = preprocess::features_from_base64(payload, model.feature_kind)?;
        let projected = model.pca.transform_one(&features)?;
        let probabilities = model
            .classifier
            .predict_proba(&[projected])?
            .pop()
            .unwrap_or_default();
        let digit = linalg::argmax(&probabilities);
        let confidence = probabilities.get(digit).copied().unwrap_or(0.0);
        Ok(Prediction {
            digit,
            confidence,
            probabilities,
        })
    }
}

impl IntoResponse for DigitError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DigitError::Preprocessing(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            DigitError::ModelUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Model not loaded".to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prediction failed: {}", self),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub pca_loaded: bool,
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: ctx.model_loaded(),
        pca_loaded: ctx.pca_loaded(),
    })
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn predict(
    State(ctx): State<Arc<AppContext>>,
    body: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    if !ctx.model_loaded() {
        return DigitError::ModelUnavailable.into_response();
    }
    let image = match body {
        Ok(Json(PredictRequest { image: Some(image) })) if !image.is_empty() => image,
        Ok(_) => return bad_request("No image provided"),
        Err(rejection) => {
            warn!(error = %rejection, "unreadable predict body");
            return bad_request("No image provided");
        }
    };
    match ctx.predict(&image) {
        Ok(prediction) => Json(prediction).into_response(),
        Err(e) => {
            warn!(error = %e, "prediction failed");
            e.into_response()
        }
    }
}

async fn model_info(State(ctx): State<Arc<AppContext>>) -> Response {
    let model = match ctx.model() {
        Ok(model) => model,
        Err(e) => return e.into_response(),
    };
    Json(json!({
        "model_type": model.model_type,
        "metrics": model.metrics,
        "metadata": model.metadata,
        "pca_info": {
            "n_components": model.pca.n_components,
            "variance_explained": model.pca.variance_explained(),
        },
    }))
    .into_response()
}

/// Routes with permissive CORS and request tracing.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/model-info", get(model_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Loads the model and serves until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> std::io::Result<()> {
    let ctx = Arc::new(AppContext::load(&config.model_path));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, model_loaded = ctx.model_loaded(), "prediction service listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
