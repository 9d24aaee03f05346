use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rebate_core::coordinator::{RecommendationCoordinator, RecommendationError};
use rebate_core::domain::context::RecommendationRequest;
use rebate_core::domain::recommendation::RecommendationResult;
use rebate_core::llm::ProviderDescriptor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = rebate_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let coordinator = RecommendationCoordinator::from_settings(&settings)?;
    tracing::info!(
        ai_enabled = settings.ai_enabled,
        fallback_enabled = settings.fallback_enabled,
        providers = ?settings.providers,
        "recommendation coordinator ready"
    );

    let state = AppState {
        coordinator: Arc::new(coordinator),
        request_timeout: settings.request_timeout,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    coordinator: Arc<RecommendationCoordinator>,
    request_timeout: Duration,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/providers", get(list_providers))
        .route("/recommendations", post(create_recommendation))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderDescriptor>> {
    Json(state.coordinator.describe_providers().await)
}

async fn create_recommendation(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<RecommendationResult>, (StatusCode, String)> {
    request
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{e:#}")))?;

    let customer = request.customer_code.clone();
    let ctx = state.coordinator.build_context(request);

    // Dropping the future on timeout aborts any in-flight provider call.
    let result = tokio::time::timeout(state.request_timeout, state.coordinator.generate(&ctx))
        .await
        .map_err(|_| {
            tracing::warn!(%customer, timeout = ?state.request_timeout, "recommendation timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                "recommendation timed out".to_string(),
            )
        })?;

    match result {
        Ok(result) => {
            tracing::info!(
                %customer,
                recommendation_id = %result.recommendation_id,
                provider = %result.provenance.provider,
                spread = %result.recommended_spread,
                "recommendation generated"
            );
            Ok(Json(result))
        }
        Err(err @ RecommendationError::FallbackDisabled) => {
            sentry_anyhow::capture_anyhow(&anyhow::Error::new(err.clone()));
            tracing::error!(%customer, error = %err, "recommendation unavailable");
            Err((StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
        Err(err @ RecommendationError::Cancelled) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &rebate_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
