use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for clients that passed the authentication layer. Every mutating
/// endpoint in the catalog lives here, and each one consults the access
/// matrix before doing anything else; the composed-maps endpoints
/// additionally consume their per-method quota.
///
/// Access Control Strategy:
/// The `Requester` extractor middleware on the layer above this module
/// guarantees handlers a resolved identity. The access matrix then decides
/// per resource and verb; a closed verb is closed for every requester,
/// superusers included.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Activations ---
        // POST /activations
        // Registers a new (non-public) activation record.
        .route("/activations", post(handlers::create_activation))
        // PUT /activations/{id}
        // Partial update; publishing happens by setting `public` here.
        // DELETE /activations/{id}
        // Closed by the access matrix for all requesters; responds 403.
        .route(
            "/activations/{id}",
            put(handlers::update_activation).delete(handlers::delete_activation),
        )
        // --- Map sets ---
        // Maintained by the external editing UI; the whole mutable surface
        // is closed, and these routes surface that decision as 403.
        .route("/mapsets", post(handlers::create_mapset))
        .route(
            "/mapsets/{id}",
            put(handlers::update_mapset).delete(handlers::delete_mapset),
        )
        // --- Composed maps (the rate-limited resource) ---
        // GET /maps, GET /maps/{id}
        // Reads consume the GET quota (600 per hour per requester).
        .route("/maps", get(handlers::list_maps).post(handlers::create_map))
        // POST /maps is gated by the much tighter write quota (3 per
        // minute); PUT shares the read-sized allowance on its own key.
        .route(
            "/maps/{id}",
            get(handlers::get_map_details)
                .put(handlers::update_map)
                .delete(handlers::delete_map),
        )
}
