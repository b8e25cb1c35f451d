use crate::{
    AppState,
    auth::{MaybeRequester, Requester},
    error::ApiError,
    facets,
    filters::{self, BoundingBox},
    models::{
        Activation, ActivationFull, ActivationMap, CreateActivationRequest, CreateMapRequest,
        DisasterTypeCount, DisasterTypeCounts, KeywordCount, KeywordCounts, MapSet,
        UpdateActivationRequest, UpdateMapRequest,
    },
    policy::{Level, ResourceKind, Verb},
    repository::ActivationFilter,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
};
use chrono::Utc;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

// --- Filter Structs ---

/// ActivationQuery
///
/// Accepted query parameters for the activation listings: the spatial
/// `extent` box, the free-text token `q`, and the declared equality filters.
/// Bound by Axum's Query extractor.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ActivationQuery {
    /// Bounding box as `minLng,minLat,maxLng,maxLat`.
    pub extent: Option<String>,
    /// Case-insensitive token matched against code, category and region.
    pub q: Option<String>,
    /// Disaster type slug equality filter.
    pub disaster_type: Option<String>,
    /// Region name equality filter.
    pub region: Option<String>,
    /// Activation code equality filter.
    pub activation_id: Option<String>,
}

impl ActivationQuery {
    fn declared(&self) -> ActivationFilter {
        ActivationFilter {
            disaster_type: self.disaster_type.clone(),
            region: self.region.clone(),
            activation_id: self.activation_id.clone(),
        }
    }

    /// Parses the extent parameter up front so a malformed box is rejected
    /// before any fetch happens.
    fn extent_box(&self) -> Result<Option<BoundingBox>, ApiError> {
        self.extent.as_deref().map(str::parse).transpose()
    }
}

/// DisasterTypeQuery
///
/// Declared equality filters for the faceted disaster-type listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DisasterTypeQuery {
    pub slug: Option<String>,
    pub name: Option<String>,
}

/// KeywordQuery
///
/// Declared equality filter for the faceted keyword listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct KeywordQuery {
    pub slug: Option<String>,
}

// --- Shared Pipeline Steps ---

/// The activation list pipeline: fetch candidates (declared filters pushed
/// down, ordered most-recent-first), scope to the requester's visibility,
/// then narrow by extent and text. Visibility runs first so the spatial and
/// text filters never observe records the requester cannot see.
async fn visible_activations(
    state: &AppState,
    requester: &Requester,
    query: &ActivationQuery,
) -> Result<Vec<Activation>, ApiError> {
    let extent = query.extent_box()?;

    let candidates = state.repo.list_activations(&query.declared()).await?;
    let mut visible = state.policy.filter_visible(requester, candidates);

    if let Some(bbox) = extent {
        visible = filters::filter_bbox(visible, &bbox);
    }
    visible = filters::filter_text(visible, query.q.as_deref());

    Ok(visible)
}

// --- Activation Handlers ---

/// list_activations
///
/// [Public Route] Lists activations visible to the requester, narrowed by
/// extent, free text and declared filters, most recent first.
#[utoipa::path(
    get,
    path = "/activations",
    params(ActivationQuery),
    responses(
        (status = 200, description = "Visible activations", body = [Activation]),
        (status = 400, description = "Malformed extent")
    )
)]
pub async fn list_activations(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Query(query): Query<ActivationQuery>,
) -> Result<Json<Vec<Activation>>, ApiError> {
    let visible = visible_activations(&state, &requester, &query).await?;
    Ok(Json(visible))
}

/// list_activations_full
///
/// [Public Route] The nested representation: each visible activation carries
/// its map sets and their layers. The same narrowing pipeline as the flat
/// listing runs first; map sets are then loaded for the surviving
/// activations only.
#[utoipa::path(
    get,
    path = "/activations/full",
    params(ActivationQuery),
    responses(
        (status = 200, description = "Visible activations with map sets", body = [ActivationFull]),
        (status = 400, description = "Malformed extent")
    )
)]
pub async fn list_activations_full(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Query(query): Query<ActivationQuery>,
) -> Result<Json<Vec<ActivationFull>>, ApiError> {
    let visible = visible_activations(&state, &requester, &query).await?;

    let ids: Vec<Uuid> = visible.iter().map(|a| a.id).collect();
    let mapsets = state.repo.mapsets_for_activations(&ids).await?;
    let mapsets = state.policy.filter_visible(&requester, mapsets);

    let full = visible
        .into_iter()
        .map(|activation| {
            let map_sets: Vec<MapSet> = mapsets
                .iter()
                .filter(|m| m.activation == activation.id)
                .cloned()
                .collect();
            ActivationFull {
                activation,
                map_sets,
            }
        })
        .collect();

    Ok(Json(full))
}

/// get_activation_details
///
/// [Public Route] Single activation by ID. A missing record and a record the
/// requester may not see produce the same 404, so existence never leaks.
#[utoipa::path(
    get,
    path = "/activations/{id}",
    params(("id" = Uuid, Path, description = "Activation ID")),
    responses(
        (status = 200, description = "Found", body = Activation),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_activation_details(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Activation>, ApiError> {
    let activation = state.repo.get_activation(id).await?.ok_or(ApiError::NotFound)?;

    if !state.policy.can_read_detail(&requester, &activation) {
        return Err(ApiError::NotFound);
    }
    Ok(Json(activation))
}

/// Enforces the stored-extent invariant on incoming activations: the four
/// corners are all present or all absent, and a present box satisfies
/// `x0 <= x1` and `y0 <= y1`.
fn validate_extent(req: &CreateActivationRequest) -> Result<(), ApiError> {
    match (req.bbox_x0, req.bbox_y0, req.bbox_x1, req.bbox_y1) {
        (None, None, None, None) => Ok(()),
        (Some(x0), Some(y0), Some(x1), Some(y1)) => {
            if x0 <= x1 && y0 <= y1 {
                Ok(())
            } else {
                Err(ApiError::Validation(
                    "activation extent corners are inverted".to_string(),
                ))
            }
        }
        _ => Err(ApiError::Validation(
            "activation extent requires all four corners".to_string(),
        )),
    }
}

/// create_activation
///
/// [Authenticated Route] Registers a new activation record. The access
/// matrix is consulted before the storage call; new activations start
/// non-public and are published through the update path.
#[utoipa::path(
    post,
    path = "/activations",
    request_body = CreateActivationRequest,
    responses(
        (status = 200, description = "Created", body = Activation),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn create_activation(
    _requester: Requester,
    State(state): State<AppState>,
    Json(payload): Json<CreateActivationRequest>,
) -> Result<Json<Activation>, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::Activation, Level::Detail, Verb::Create)?;
    validate_extent(&payload)?;

    let activation = state.repo.create_activation(payload).await?;
    Ok(Json(activation))
}

/// update_activation
///
/// [Authenticated Route] Partial update of an activation, including the
/// `public` flag that publishes it.
#[utoipa::path(
    put,
    path = "/activations/{id}",
    request_body = UpdateActivationRequest,
    responses(
        (status = 200, description = "Updated", body = Activation),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_activation(
    _requester: Requester,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActivationRequest>,
) -> Result<Json<Activation>, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::Activation, Level::Detail, Verb::Update)?;

    match state.repo.update_activation(id, payload).await? {
        Some(activation) => Ok(Json(activation)),
        None => Err(ApiError::NotFound),
    }
}

/// delete_activation
///
/// [Authenticated Route] Activation deletion is closed by the access matrix
/// for every requester; the decision is surfaced before anything touches
/// storage.
#[utoipa::path(
    delete,
    path = "/activations/{id}",
    params(("id" = Uuid, Path, description = "Activation ID")),
    responses((status = 403, description = "Not authorized"))
)]
pub async fn delete_activation(
    _requester: Requester,
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::Activation, Level::Detail, Verb::Delete)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Map Set Handlers ---

/// list_mapsets
///
/// [Public Route] Map sets visible to the requester; a set is visible iff
/// its owning activation is public (or the requester is a superuser).
#[utoipa::path(
    get,
    path = "/mapsets",
    responses((status = 200, description = "Visible map sets", body = [MapSet]))
)]
pub async fn list_mapsets(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
) -> Result<Json<Vec<MapSet>>, ApiError> {
    let candidates = state.repo.list_mapsets().await?;
    Ok(Json(state.policy.filter_visible(&requester, candidates)))
}

/// get_mapset_details
///
/// [Public Route] Single map set, mirroring the activation detail rule.
#[utoipa::path(
    get,
    path = "/mapsets/{id}",
    params(("id" = Uuid, Path, description = "Map set ID")),
    responses(
        (status = 200, description = "Found", body = MapSet),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_mapset_details(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MapSet>, ApiError> {
    let mapset = state.repo.get_mapset(id).await?.ok_or(ApiError::NotFound)?;

    if !state.policy.can_read_detail(&requester, &mapset) {
        return Err(ApiError::NotFound);
    }
    Ok(Json(mapset))
}

/// create_mapset / update_mapset / delete_mapset
///
/// [Authenticated Routes] Map sets are maintained by the external editing
/// UI; every mutating verb on them is closed by the access matrix and these
/// handlers exist to surface that decision uniformly.
#[utoipa::path(
    post,
    path = "/mapsets",
    responses((status = 403, description = "Not authorized"))
)]
pub async fn create_mapset(
    _requester: Requester,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::MapSet, Level::Detail, Verb::Create)?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    put,
    path = "/mapsets/{id}",
    params(("id" = Uuid, Path, description = "Map set ID")),
    responses((status = 403, description = "Not authorized"))
)]
pub async fn update_mapset(
    _requester: Requester,
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::MapSet, Level::Detail, Verb::Update)?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/mapsets/{id}",
    params(("id" = Uuid, Path, description = "Map set ID")),
    responses((status = 403, description = "Not authorized"))
)]
pub async fn delete_mapset(
    _requester: Requester,
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::MapSet, Level::Detail, Verb::Delete)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Faceted Listings ---

/// list_disaster_types
///
/// [Public Route] Disaster types annotated with the count of activations the
/// requester can see in each. The counts come exclusively from the
/// visibility-scoped set, so two requesters with different privileges get
/// different numbers for the same type, and `requested_time` records when
/// this computation ran.
#[utoipa::path(
    get,
    path = "/disastertypes",
    params(DisasterTypeQuery),
    responses((status = 200, description = "Disaster types with visible counts", body = DisasterTypeCounts))
)]
pub async fn list_disaster_types(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Query(query): Query<DisasterTypeQuery>,
) -> Result<Json<DisasterTypeCounts>, ApiError> {
    let types = state
        .repo
        .list_disaster_types(query.slug.as_deref(), query.name.as_deref())
        .await?;

    let candidates = state.repo.list_activations(&ActivationFilter::default()).await?;
    let visible = state.policy.filter_visible(&requester, candidates);
    let counts = facets::count_by_group(&visible, |a| vec![a.disaster_type_slug.clone()]);

    let objects = types
        .into_iter()
        .map(|t| DisasterTypeCount {
            count: facets::count_for(&counts, &t.slug),
            id: t.id,
            name: t.name,
            slug: t.slug,
        })
        .collect();

    Ok(Json(DisasterTypeCounts {
        objects,
        requested_time: Utc::now(),
    }))
}

/// list_keywords
///
/// [Public Route] Keywords ordered by name, each annotated with its
/// visible-activation count. An activation carrying several keywords counts
/// once toward each of them.
#[utoipa::path(
    get,
    path = "/keywords",
    params(KeywordQuery),
    responses((status = 200, description = "Keywords with visible counts", body = KeywordCounts))
)]
pub async fn list_keywords(
    MaybeRequester(requester): MaybeRequester,
    State(state): State<AppState>,
    Query(query): Query<KeywordQuery>,
) -> Result<Json<KeywordCounts>, ApiError> {
    let keywords = state.repo.list_keywords(query.slug.as_deref()).await?;

    let candidates = state.repo.list_activations(&ActivationFilter::default()).await?;
    let visible = state.policy.filter_visible(&requester, candidates);
    let counts = facets::count_by_group(&visible, |a| a.keywords.clone());

    let objects = keywords
        .into_iter()
        .map(|k| KeywordCount {
            count: facets::count_for(&counts, &k.slug),
            id: k.id,
            name: k.name,
            slug: k.slug,
        })
        .collect();

    Ok(Json(KeywordCounts {
        objects,
        requested_time: Utc::now(),
    }))
}

// --- Composed Map Handlers (the throttled resource) ---

/// list_maps
///
/// [Authenticated Route] Composed maps visible to the requester. Reads on
/// this resource consume the GET quota; the check runs before the fetch.
#[utoipa::path(
    get,
    path = "/maps",
    responses(
        (status = 200, description = "Visible maps", body = [ActivationMap]),
        (status = 429, description = "Quota exceeded")
    )
)]
pub async fn list_maps(
    requester: Requester,
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivationMap>>, ApiError> {
    state
        .limiter
        .check_and_record(&requester.rate_key, &Method::GET, Instant::now())?;

    let candidates = state.repo.list_maps().await?;
    Ok(Json(state.policy.filter_visible(&requester, candidates)))
}

/// get_map_details
///
/// [Authenticated Route] Single composed map; same quota as the listing.
#[utoipa::path(
    get,
    path = "/maps/{id}",
    params(("id" = Uuid, Path, description = "Map ID")),
    responses(
        (status = 200, description = "Found", body = ActivationMap),
        (status = 404, description = "Not found or not visible"),
        (status = 429, description = "Quota exceeded")
    )
)]
pub async fn get_map_details(
    requester: Requester,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActivationMap>, ApiError> {
    state
        .limiter
        .check_and_record(&requester.rate_key, &Method::GET, Instant::now())?;

    let map = state.repo.get_map(id).await?.ok_or(ApiError::NotFound)?;
    if !state.policy.can_read_detail(&requester, &map) {
        return Err(ApiError::NotFound);
    }
    Ok(Json(map))
}

/// create_map
///
/// [Authenticated Route] Saves a composed map. Order of gates: access
/// matrix, then the (much tighter) POST quota, then storage. A denied or
/// throttled create performs no write, and a throttled attempt does not
/// consume quota.
#[utoipa::path(
    post,
    path = "/maps",
    request_body = CreateMapRequest,
    responses(
        (status = 200, description = "Created", body = ActivationMap),
        (status = 403, description = "Not authorized"),
        (status = 429, description = "Quota exceeded")
    )
)]
pub async fn create_map(
    requester: Requester,
    State(state): State<AppState>,
    Json(payload): Json<CreateMapRequest>,
) -> Result<Json<ActivationMap>, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::ActivationMap, Level::Detail, Verb::Create)?;
    state
        .limiter
        .check_and_record(&requester.rate_key, &Method::POST, Instant::now())?;

    let map = state.repo.create_map(payload, requester.id).await?;
    Ok(Json(map))
}

/// update_map
///
/// [Authenticated Route] Partial update of a composed map, gated like the
/// create but against the PUT quota.
#[utoipa::path(
    put,
    path = "/maps/{id}",
    request_body = UpdateMapRequest,
    responses(
        (status = 200, description = "Updated", body = ActivationMap),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Not found"),
        (status = 429, description = "Quota exceeded")
    )
)]
pub async fn update_map(
    requester: Requester,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMapRequest>,
) -> Result<Json<ActivationMap>, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::ActivationMap, Level::Detail, Verb::Update)?;
    state
        .limiter
        .check_and_record(&requester.rate_key, &Method::PUT, Instant::now())?;

    match state.repo.update_map(id, payload).await? {
        Some(map) => Ok(Json(map)),
        None => Err(ApiError::NotFound),
    }
}

/// delete_map
///
/// [Authenticated Route] Composed maps have no delete surface; the matrix
/// reports it as not implemented, which the boundary returns as an
/// authorization failure.
#[utoipa::path(
    delete,
    path = "/maps/{id}",
    params(("id" = Uuid, Path, description = "Map ID")),
    responses((status = 403, description = "Not authorized"))
)]
pub async fn delete_map(
    _requester: Requester,
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .policy
        .authorize_mutation(ResourceKind::ActivationMap, Level::Detail, Verb::Delete)?;
    Ok(StatusCode::NO_CONTENT)
}
