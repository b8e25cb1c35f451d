use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::filters::{BoundingBox, HasExtent, Searchable};
use crate::policy::Visible;

// --- Core Catalog Schemas (Mapped to Database) ---

/// Profile
///
/// The requester's canonical identity record stored in the `public.profiles`
/// table. Resolved during authentication; only the superuser flag matters to
/// the visibility policy.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    /// Grants unrestricted catalog visibility. Everything else is scoped to
    /// `public = true` records.
    pub is_superuser: bool,
}

/// DisasterType
///
/// Category record for activations (flood, earthquake, ...). Serves as the
/// facet identity for the disaster-type facet.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct DisasterType {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Keyword
///
/// Free-form tag attached to activations. Facet identity for the keyword
/// facet; listings are ordered by name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Keyword {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Activation
///
/// A disaster-response event record from the `public.activations` table.
/// This is the primary entity of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Activation {
    pub id: Uuid,
    /// Human-readable activation code (e.g. "EMSR177"). Searchable.
    pub activation_id: String,
    /// Controls catalog visibility for non-superuser requesters.
    pub public: bool,

    // Geographic extent. The four corners are either all present or all
    // absent; when present, x0 <= x1 and y0 <= y1. An activation without an
    // extent is skipped by spatial filtering but still listed otherwise.
    pub bbox_x0: Option<f64>,
    pub bbox_y0: Option<f64>,
    pub bbox_x1: Option<f64>,
    pub bbox_y1: Option<f64>,

    #[ts(type = "string")]
    pub activation_time: DateTime<Utc>,

    // Denormalized category/region columns, loaded via JOIN.
    pub disaster_type_slug: String,
    pub disaster_type_name: String,
    pub region_name: Option<String>,

    /// Keyword slugs (`TEXT[]` column). Many-to-many grouping key for the
    /// keyword facet.
    pub keywords: Vec<String>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Visible for Activation {
    fn is_public(&self) -> bool {
        self.public
    }
}

impl HasExtent for Activation {
    fn extent(&self) -> Option<BoundingBox> {
        match (self.bbox_x0, self.bbox_y0, self.bbox_x1, self.bbox_y1) {
            (Some(x0), Some(y0), Some(x1), Some(y1)) => {
                Some(BoundingBox { x0, y0, x1, y1 })
            }
            _ => None,
        }
    }
}

impl Searchable for Activation {
    /// Fields covered by the `q` free-text filter: activation code,
    /// disaster type name, region name.
    fn searchable_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.activation_id.as_str(), self.disaster_type_name.as_str()];
        if let Some(region) = &self.region_name {
            fields.push(region.as_str());
        }
        fields
    }
}

/// MapSetLayer
///
/// A single renderable layer inside a map set. Tile serving itself is
/// external; the catalog only carries the pointers the viewer needs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MapSetLayer {
    pub id: Uuid,
    pub mapset_id: Uuid,
    pub typename: String,
    pub store_type: String,
    /// TMS endpoint for the layer tiles.
    pub tms_url: String,
    /// Identifier of the layer's tileset in the external tile service.
    pub djmp_id: i64,
    pub bbox_x0: f64,
    pub bbox_y0: f64,
    pub bbox_x1: f64,
    pub bbox_y1: f64,
}

/// MapSet
///
/// A nested map product grouping under an activation. Visibility follows the
/// owning activation: a map set is visible iff its parent is public.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MapSet {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// Owning activation.
    pub activation: Uuid,
    /// Parent visibility flag, loaded via JOIN. This is what the visibility
    /// policy consults for map sets.
    pub activation_public: bool,
    /// Child layers, ordered by `store_type` descending. Assembled by the
    /// repository, not a database column.
    #[sqlx(skip)]
    pub layers: Vec<MapSetLayer>,
}

impl Visible for MapSet {
    fn is_public(&self) -> bool {
        self.activation_public
    }
}

/// ActivationFull
///
/// The nested activation representation: the activation itself plus its map
/// sets (with layers). Serialized flat, so the JSON shape is an activation
/// object carrying a `map_sets` array.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ActivationFull {
    #[serde(flatten)]
    #[ts(flatten)]
    pub activation: Activation,
    pub map_sets: Vec<MapSet>,
}

/// ActivationMap
///
/// A user-composed map saved against the catalog (title, abstract and the
/// client-side map state blob). The only resource with per-method rate
/// limiting on its endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ActivationMap {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub abstract_text: String,
    /// Opaque map state (layers, center, zoom) as composed by the client.
    #[ts(type = "unknown")]
    pub config: serde_json::Value,
    pub public: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Visible for ActivationMap {
    fn is_public(&self) -> bool {
        self.public
    }
}

/// --- Request Payloads (Input Schemas) ---

/// CreateActivationRequest
///
/// Input payload for registering a new activation (POST /activations).
/// The extent is optional; when supplied all four corners must be present.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateActivationRequest {
    pub activation_id: String,
    pub disaster_type_slug: String,
    pub region_name: Option<String>,
    pub bbox_x0: Option<f64>,
    pub bbox_y0: Option<f64>,
    pub bbox_x1: Option<f64>,
    pub bbox_y1: Option<f64>,
    #[ts(type = "string")]
    pub activation_time: DateTime<Utc>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// UpdateActivationRequest
///
/// Partial update payload for an existing activation (PUT /activations/{id}).
/// `Option<T>` plus `skip_serializing_if` keeps partial updates cheap: only
/// provided fields appear in the payload and only those columns change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateActivationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// CreateMapRequest
///
/// Input payload for saving a composed map (POST /maps).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateMapRequest {
    pub title: String,
    pub abstract_text: String,
    #[ts(type = "unknown")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub public: bool,
}

/// UpdateMapRequest
///
/// Partial update payload for a composed map (PUT /maps/{id}).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateMapRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub config: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

/// --- Faceted Response Schemas (Output) ---

/// DisasterTypeCount
///
/// A disaster type annotated with the number of activations the requester is
/// allowed to see in it. Zero-count types are included, never an error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DisasterTypeCount {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub count: i64,
}

/// KeywordCount
///
/// A keyword annotated with its visible-activation count. An activation
/// carries many keywords, so one activation may contribute to several
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct KeywordCount {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub count: i64,
}

/// DisasterTypeCounts
///
/// Response envelope for the faceted disaster-type listing. `requested_time`
/// is the moment the counts were computed; counts are recomputed per request
/// and never cached across requesters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DisasterTypeCounts {
    pub objects: Vec<DisasterTypeCount>,
    #[ts(type = "string")]
    pub requested_time: DateTime<Utc>,
}

/// KeywordCounts
///
/// Response envelope for the faceted keyword listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct KeywordCounts {
    pub objects: Vec<KeywordCount>,
    #[ts(type = "string")]
    pub requested_time: DateTime<Utc>,
}
