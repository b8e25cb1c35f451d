use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod facets;
pub mod filters;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;
pub mod throttle;

// Module for routing segregation (Public, Authenticated).
pub mod routes;
use auth::Requester; // The resolved authenticated requester identity.
use routes::{authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry
// point (main.rs) and to the integration tests.
pub use config::AppConfig;
pub use policy::{AccessMatrix, VisibilityPolicy};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use throttle::{RateLimiter, ThrottleConfig};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation (Swagger JSON) for the catalog.
/// Aggregates all API paths and data schemas decorated with the
/// `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]` macros; the resulting
/// JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_activations, handlers::list_activations_full,
        handlers::get_activation_details, handlers::create_activation,
        handlers::update_activation, handlers::delete_activation,
        handlers::list_mapsets, handlers::get_mapset_details,
        handlers::create_mapset, handlers::update_mapset, handlers::delete_mapset,
        handlers::list_disaster_types, handlers::list_keywords,
        handlers::list_maps, handlers::get_map_details,
        handlers::create_map, handlers::update_map, handlers::delete_map,
    ),
    components(
        schemas(
            models::Activation, models::ActivationFull, models::MapSet,
            models::MapSetLayer, models::DisasterType, models::Keyword,
            models::ActivationMap, models::CreateActivationRequest,
            models::UpdateActivationRequest, models::CreateMapRequest,
            models::UpdateMapRequest, models::DisasterTypeCount,
            models::DisasterTypeCounts, models::KeywordCount, models::KeywordCounts,
        )
    ),
    tags(
        (name = "activation-catalog", description = "Disaster activation catalog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding the catalog's
/// services, shared across all incoming requests. The visibility policy and
/// the filter functions are pure, so the rate limiter is the only member
/// carrying mutable state (behind its own lock).
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: candidate-set fetches and gated writes.
    pub repo: RepositoryState,
    /// Visibility Policy: the per-resource access matrix and read rules.
    pub policy: VisibilityPolicy,
    /// Rate Limiter: per-requester, per-method quota buckets.
    pub limiter: Arc<RateLimiter>,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Assembles a state with the catalog's production policy matrix and
    /// quota table.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        AppState {
            repo,
            policy: VisibilityPolicy::new(AccessMatrix::catalog_defaults()),
            limiter: Arc::new(RateLimiter::new(ThrottleConfig::maps_defaults())),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// These let extractors and handlers selectively pull components out of the
// shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for VisibilityPolicy {
    fn from_ref(app_state: &AppState) -> VisibilityPolicy {
        app_state.policy.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(app_state: &AppState) -> Arc<RateLimiter> {
        app_state.limiter.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`.
///
/// *Mechanism*: attempts to extract `Requester` from the request. Since
/// `Requester` implements `FromRequestParts`, a failed resolution (bad or
/// missing token, unknown profile) rejects with 401 before the handler runs.
async fn auth_middleware(_requester: Requester, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the catalog's routing structure, applies global and scoped
/// middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no middleware; anonymous requesters are scoped by
        // the visibility policy inside the handlers.
        .merge(public::public_routes())
        // Authenticated Routes: protected by the `auth_middleware`.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Apply the unified state to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wraps the request/response lifecycle
                // in a span carrying the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS layer.
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes `TraceLayer` span creation: extracts the `x-request-id` header
/// (if present) and includes it in the structured logging metadata alongside
/// the HTTP method and URI, so every log line of a request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
