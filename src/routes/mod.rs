/// Router Module Index
///
/// Organizes the catalog's routing into access-segregated modules, so that
/// the authentication requirement is applied explicitly at the module level
/// (via Axum layers) rather than rediscovered handler by handler.
///
/// Superuser privilege is not a route segment here: it widens what the
/// visibility policy lets a requester see, on the same routes everyone uses.

/// Routes accessible to all clients (anonymous included, read-only).
/// Handlers scope every response through the visibility policy.
pub mod public;

/// Routes protected by the `Requester` extractor middleware.
/// Requires a validated session.
pub mod authenticated;
