use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Defines endpoints accessible to any client, anonymous or logged-in.
/// All of them are read-only catalog views.
///
/// Visibility Mandate:
/// Every handler here passes its candidate set through
/// `VisibilityPolicy::filter_visible` (or `can_read_detail`) before anything
/// else touches it. Anonymous requesters see only `public = true` records,
/// and the faceted counts are computed from that same scoped set.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /activations?extent=...&q=...&disaster_type=...&region=...&activation_id=...
        // Flat activation listing: visibility scope, then bbox/text/declared
        // filters, most recent first.
        .route("/activations", get(handlers::list_activations))
        // GET /activations/full
        // Nested representation carrying each visible activation's map sets
        // and layers. Same filter parameters as the flat listing.
        .route("/activations/full", get(handlers::list_activations_full))
        // GET /activations/{id}
        // Single activation detail. Invisible records 404 exactly like
        // missing ones.
        .route("/activations/{id}", get(handlers::get_activation_details))
        // GET /mapsets
        // Map set listing; visibility follows the owning activation.
        .route("/mapsets", get(handlers::list_mapsets))
        // GET /mapsets/{id}
        .route("/mapsets/{id}", get(handlers::get_mapset_details))
        // GET /disastertypes?slug=...&name=...
        // Faceted listing: each type carries the requester-visible
        // activation count plus the response-level computation timestamp.
        .route("/disastertypes", get(handlers::list_disaster_types))
        // GET /keywords?slug=...
        // Faceted keyword listing, ordered by name.
        .route("/keywords", get(handlers::list_keywords))
}
