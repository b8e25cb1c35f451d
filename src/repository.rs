use crate::models::{
    Activation, ActivationMap, CreateActivationRequest, CreateMapRequest, DisasterType, Keyword,
    MapSet, MapSetLayer, Profile, UpdateActivationRequest, UpdateMapRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// ActivationFilter
///
/// The declared equality filters a caller may push down to the activation
/// fetch. Everything else (visibility, extent, free text) is applied by the
/// handlers over the returned candidate set.
#[derive(Debug, Clone, Default)]
pub struct ActivationFilter {
    pub disaster_type: Option<String>,
    pub region: Option<String>,
    pub activation_id: Option<String>,
}

/// Repository Trait
///
/// Abstract contract for all persistence reads and writes. The handlers
/// interact with the data layer only through this trait, so the Postgres
/// implementation and the in-memory one used by tests are interchangeable.
///
/// Every list method returns an *unfiltered* candidate collection, narrowed
/// only by the declared equality filters and already carrying the resource's
/// default ordering. Visibility scoping is the handlers' job, never this
/// layer's.
///
/// **Send + Sync + async_trait** make the trait object (`Arc<dyn
/// Repository>`) safely shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Activations ---
    async fn list_activations(&self, filter: &ActivationFilter)
    -> Result<Vec<Activation>, sqlx::Error>;
    async fn get_activation(&self, id: Uuid) -> Result<Option<Activation>, sqlx::Error>;
    async fn create_activation(
        &self,
        req: CreateActivationRequest,
    ) -> Result<Activation, sqlx::Error>;
    // Partial update using COALESCE semantics; None fields keep their value.
    async fn update_activation(
        &self,
        id: Uuid,
        req: UpdateActivationRequest,
    ) -> Result<Option<Activation>, sqlx::Error>;

    // --- Map sets (nested products) ---
    async fn list_mapsets(&self) -> Result<Vec<MapSet>, sqlx::Error>;
    async fn get_mapset(&self, id: Uuid) -> Result<Option<MapSet>, sqlx::Error>;
    // Candidates for assembling the nested activation representation.
    async fn mapsets_for_activations(
        &self,
        activation_ids: &[Uuid],
    ) -> Result<Vec<MapSet>, sqlx::Error>;

    // --- Facet identities ---
    async fn list_disaster_types(
        &self,
        slug: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DisasterType>, sqlx::Error>;
    async fn list_keywords(&self, slug: Option<&str>) -> Result<Vec<Keyword>, sqlx::Error>;

    // --- Composed maps ---
    async fn list_maps(&self) -> Result<Vec<ActivationMap>, sqlx::Error>;
    async fn get_map(&self, id: Uuid) -> Result<Option<ActivationMap>, sqlx::Error>;
    async fn create_map(
        &self,
        req: CreateMapRequest,
        owner: Uuid,
    ) -> Result<ActivationMap, sqlx::Error>;
    async fn update_map(
        &self,
        id: Uuid,
        req: UpdateMapRequest,
    ) -> Result<Option<ActivationMap>, sqlx::Error>;

    // --- Auth ---
    async fn get_profile(&self, id: Uuid) -> Option<Profile>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by
/// PostgreSQL. Queries are runtime-bound (`query_as` / `QueryBuilder`) with
/// parameterized values throughout.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Shared SELECT list for the activation representation (joined category and
// region columns included).
const ACTIVATION_SELECT: &str = r#"
    SELECT a.id, a.activation_id, a.public,
           a.bbox_x0, a.bbox_y0, a.bbox_x1, a.bbox_y1,
           a.activation_time,
           d.slug AS disaster_type_slug, d.name AS disaster_type_name,
           r.name AS region_name,
           a.keywords,
           a.created_at, a.updated_at
    FROM activations a
    JOIN disaster_types d ON a.disaster_type = d.id
    LEFT JOIN regions r ON a.region = r.id
"#;

#[async_trait]
impl Repository for PostgresRepository {
    /// list_activations
    ///
    /// Flexible declared-field filtering via QueryBuilder with bound
    /// parameters. Returns candidates ordered most-recent-first; visibility
    /// is NOT applied here.
    async fn list_activations(
        &self,
        filter: &ActivationFilter,
    ) -> Result<Vec<Activation>, sqlx::Error> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("{ACTIVATION_SELECT} WHERE 1=1 "));

        if let Some(dt) = &filter.disaster_type {
            builder.push(" AND d.slug = ");
            builder.push_bind(dt.clone());
        }

        if let Some(region) = &filter.region {
            builder.push(" AND r.name = ");
            builder.push_bind(region.clone());
        }

        if let Some(code) = &filter.activation_id {
            builder.push(" AND a.activation_id = ");
            builder.push_bind(code.clone());
        }

        builder.push(" ORDER BY a.activation_time DESC");

        builder
            .build_query_as::<Activation>()
            .fetch_all(&self.pool)
            .await
    }

    /// get_activation
    ///
    /// Retrieval by ID with no visibility check; the caller decides whether
    /// the requester may see the record.
    async fn get_activation(&self, id: Uuid) -> Result<Option<Activation>, sqlx::Error> {
        sqlx::query_as::<_, Activation>(&format!("{ACTIVATION_SELECT} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// create_activation
    ///
    /// Inserts a new activation, non-public by default (catalog entries are
    /// published through the update path). The joined representation is
    /// re-fetched so the response carries the category and region names.
    async fn create_activation(
        &self,
        req: CreateActivationRequest,
    ) -> Result<Activation, sqlx::Error> {
        let new_id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO activations
               (id, activation_id, public, bbox_x0, bbox_y0, bbox_x1, bbox_y1,
                activation_time, disaster_type, region, keywords, created_at, updated_at)
               VALUES ($1, $2, false, $3, $4, $5, $6, $7,
                       (SELECT id FROM disaster_types WHERE slug = $8),
                       (SELECT id FROM regions WHERE name = $9),
                       $10, NOW(), NOW())"#,
        )
        .bind(new_id)
        .bind(&req.activation_id)
        .bind(req.bbox_x0)
        .bind(req.bbox_y0)
        .bind(req.bbox_x1)
        .bind(req.bbox_y1)
        .bind(req.activation_time)
        .bind(&req.disaster_type_slug)
        .bind(&req.region_name)
        .bind(&req.keywords)
        .execute(&self.pool)
        .await?;

        self.get_activation(new_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// update_activation
    ///
    /// COALESCE-based partial update: only the fields present in `req`
    /// change. Returns None when the ID does not exist.
    async fn update_activation(
        &self,
        id: Uuid,
        req: UpdateActivationRequest,
    ) -> Result<Option<Activation>, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE activations
               SET activation_id = COALESCE($2, activation_id),
                   public = COALESCE($3, public),
                   keywords = COALESCE($4, keywords),
                   region = COALESCE((SELECT id FROM regions WHERE name = $5), region),
                   updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&req.activation_id)
        .bind(req.public)
        .bind(&req.keywords)
        .bind(&req.region_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_activation(id).await
    }

    /// list_mapsets
    ///
    /// Map sets with the parent activation's public flag joined in, plus
    /// child layers assembled per set (ordered by store type, descending).
    async fn list_mapsets(&self) -> Result<Vec<MapSet>, sqlx::Error> {
        let mut mapsets = sqlx::query_as::<_, MapSet>(
            r#"SELECT m.id, m.name, m.slug, m.activation, a.public AS activation_public
               FROM mapsets m
               JOIN activations a ON m.activation = a.id
               ORDER BY m.name ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.attach_layers(&mut mapsets).await?;
        Ok(mapsets)
    }

    async fn get_mapset(&self, id: Uuid) -> Result<Option<MapSet>, sqlx::Error> {
        let mapset = sqlx::query_as::<_, MapSet>(
            r#"SELECT m.id, m.name, m.slug, m.activation, a.public AS activation_public
               FROM mapsets m
               JOIN activations a ON m.activation = a.id
               WHERE m.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match mapset {
            Some(mut ms) => {
                self.attach_layers(std::slice::from_mut(&mut ms)).await?;
                Ok(Some(ms))
            }
            None => Ok(None),
        }
    }

    async fn mapsets_for_activations(
        &self,
        activation_ids: &[Uuid],
    ) -> Result<Vec<MapSet>, sqlx::Error> {
        if activation_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut mapsets = sqlx::query_as::<_, MapSet>(
            r#"SELECT m.id, m.name, m.slug, m.activation, a.public AS activation_public
               FROM mapsets m
               JOIN activations a ON m.activation = a.id
               WHERE m.activation = ANY($1)
               ORDER BY m.name ASC"#,
        )
        .bind(activation_ids)
        .fetch_all(&self.pool)
        .await?;

        self.attach_layers(&mut mapsets).await?;
        Ok(mapsets)
    }

    /// list_disaster_types
    ///
    /// Facet identities with optional slug/name equality filters.
    async fn list_disaster_types(
        &self,
        slug: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DisasterType>, sqlx::Error> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM disaster_types WHERE 1=1 ");

        if let Some(s) = slug {
            builder.push(" AND slug = ");
            builder.push_bind(s.to_string());
        }
        if let Some(n) = name {
            builder.push(" AND name = ");
            builder.push_bind(n.to_string());
        }
        builder.push(" ORDER BY name ASC");

        builder
            .build_query_as::<DisasterType>()
            .fetch_all(&self.pool)
            .await
    }

    async fn list_keywords(&self, slug: Option<&str>) -> Result<Vec<Keyword>, sqlx::Error> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM keywords WHERE 1=1 ");

        if let Some(s) = slug {
            builder.push(" AND slug = ");
            builder.push_bind(s.to_string());
        }
        builder.push(" ORDER BY name ASC");

        builder
            .build_query_as::<Keyword>()
            .fetch_all(&self.pool)
            .await
    }

    async fn list_maps(&self) -> Result<Vec<ActivationMap>, sqlx::Error> {
        sqlx::query_as::<_, ActivationMap>(
            r#"SELECT id, owner, title, abstract_text, config, public, created_at, updated_at
               FROM activation_maps
               ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_map(&self, id: Uuid) -> Result<Option<ActivationMap>, sqlx::Error> {
        sqlx::query_as::<_, ActivationMap>(
            r#"SELECT id, owner, title, abstract_text, config, public, created_at, updated_at
               FROM activation_maps
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// create_map
    ///
    /// Inserts a composed map and returns the stored entity (the create
    /// endpoint always returns data).
    async fn create_map(
        &self,
        req: CreateMapRequest,
        owner: Uuid,
    ) -> Result<ActivationMap, sqlx::Error> {
        sqlx::query_as::<_, ActivationMap>(
            r#"INSERT INTO activation_maps
               (id, owner, title, abstract_text, config, public, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
               RETURNING id, owner, title, abstract_text, config, public, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&req.title)
        .bind(&req.abstract_text)
        .bind(&req.config)
        .bind(req.public)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_map(
        &self,
        id: Uuid,
        req: UpdateMapRequest,
    ) -> Result<Option<ActivationMap>, sqlx::Error> {
        sqlx::query_as::<_, ActivationMap>(
            r#"UPDATE activation_maps
               SET title = COALESCE($2, title),
                   abstract_text = COALESCE($3, abstract_text),
                   config = COALESCE($4, config),
                   public = COALESCE($5, public),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING id, owner, title, abstract_text, config, public, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&req.title)
        .bind(&req.abstract_text)
        .bind(&req.config)
        .bind(req.public)
        .fetch_optional(&self.pool)
        .await
    }

    /// get_profile
    ///
    /// Identity lookup for the auth extractor. Errors degrade to None, which
    /// the extractor reports as 401.
    async fn get_profile(&self, id: Uuid) -> Option<Profile> {
        sqlx::query_as::<_, Profile>("SELECT id, email, is_superuser FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or(None)
    }
}

impl PostgresRepository {
    /// Loads the child layers for a batch of map sets in one query and
    /// distributes them, preserving the store-type-descending order.
    async fn attach_layers(&self, mapsets: &mut [MapSet]) -> Result<(), sqlx::Error> {
        if mapsets.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = mapsets.iter().map(|m| m.id).collect();

        let layers = sqlx::query_as::<_, MapSetLayer>(
            r#"SELECT id, mapset_id, typename, store_type, tms_url, djmp_id,
                      bbox_x0, bbox_y0, bbox_x1, bbox_y1
               FROM mapset_layers
               WHERE mapset_id = ANY($1)
               ORDER BY store_type DESC"#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_set: HashMap<Uuid, Vec<MapSetLayer>> = HashMap::new();
        for layer in layers {
            by_set.entry(layer.mapset_id).or_default().push(layer);
        }
        for mapset in mapsets.iter_mut() {
            mapset.layers = by_set.remove(&mapset.id).unwrap_or_default();
        }
        Ok(())
    }
}

// --- In-Memory Implementation (For Tests and Local Scaffolding) ---

/// InMemoryRepository
///
/// A `Repository` implementation over plain vectors, used by handler and
/// end-to-end tests so they exercise the full query pipeline without a
/// database. Seed methods populate state directly, including records the
/// public API cannot create (e.g., already-public activations).
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    activations: Mutex<Vec<Activation>>,
    mapsets: Mutex<Vec<MapSet>>,
    disaster_types: Mutex<Vec<DisasterType>>,
    keywords: Mutex<Vec<Keyword>>,
    maps: Mutex<Vec<ActivationMap>>,
    profiles: Mutex<Vec<Profile>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_activation(&self, activation: Activation) {
        self.activations.lock().unwrap().push(activation);
    }

    pub fn seed_mapset(&self, mapset: MapSet) {
        self.mapsets.lock().unwrap().push(mapset);
    }

    pub fn seed_disaster_type(&self, dtype: DisasterType) {
        self.disaster_types.lock().unwrap().push(dtype);
    }

    pub fn seed_keyword(&self, keyword: Keyword) {
        self.keywords.lock().unwrap().push(keyword);
    }

    pub fn seed_map(&self, map: ActivationMap) {
        self.maps.lock().unwrap().push(map);
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.profiles.lock().unwrap().push(profile);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_activations(
        &self,
        filter: &ActivationFilter,
    ) -> Result<Vec<Activation>, sqlx::Error> {
        let mut result: Vec<Activation> = self
            .activations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                filter
                    .disaster_type
                    .as_ref()
                    .is_none_or(|dt| &a.disaster_type_slug == dt)
            })
            .filter(|a| {
                filter
                    .region
                    .as_ref()
                    .is_none_or(|r| a.region_name.as_ref() == Some(r))
            })
            .filter(|a| {
                filter
                    .activation_id
                    .as_ref()
                    .is_none_or(|code| &a.activation_id == code)
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.activation_time.cmp(&a.activation_time));
        Ok(result)
    }

    async fn get_activation(&self, id: Uuid) -> Result<Option<Activation>, sqlx::Error> {
        Ok(self
            .activations
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn create_activation(
        &self,
        req: CreateActivationRequest,
    ) -> Result<Activation, sqlx::Error> {
        let dtype = self
            .disaster_types
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.slug == req.disaster_type_slug)
            .cloned()
            .ok_or(sqlx::Error::RowNotFound)?;

        let now = Utc::now();
        let activation = Activation {
            id: Uuid::new_v4(),
            activation_id: req.activation_id,
            public: false,
            bbox_x0: req.bbox_x0,
            bbox_y0: req.bbox_y0,
            bbox_x1: req.bbox_x1,
            bbox_y1: req.bbox_y1,
            activation_time: req.activation_time,
            disaster_type_slug: dtype.slug,
            disaster_type_name: dtype.name,
            region_name: req.region_name,
            keywords: req.keywords,
            created_at: now,
            updated_at: now,
        };
        self.activations.lock().unwrap().push(activation.clone());
        Ok(activation)
    }

    async fn update_activation(
        &self,
        id: Uuid,
        req: UpdateActivationRequest,
    ) -> Result<Option<Activation>, sqlx::Error> {
        let mut activations = self.activations.lock().unwrap();
        let Some(activation) = activations.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };

        if let Some(code) = req.activation_id {
            activation.activation_id = code;
        }
        if let Some(region) = req.region_name {
            activation.region_name = Some(region);
        }
        if let Some(public) = req.public {
            activation.public = public;
        }
        if let Some(keywords) = req.keywords {
            activation.keywords = keywords;
        }
        activation.updated_at = Utc::now();
        Ok(Some(activation.clone()))
    }

    async fn list_mapsets(&self) -> Result<Vec<MapSet>, sqlx::Error> {
        let mut result = self.mapsets.lock().unwrap().clone();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn get_mapset(&self, id: Uuid) -> Result<Option<MapSet>, sqlx::Error> {
        Ok(self
            .mapsets
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn mapsets_for_activations(
        &self,
        activation_ids: &[Uuid],
    ) -> Result<Vec<MapSet>, sqlx::Error> {
        let mut result: Vec<MapSet> = self
            .mapsets
            .lock()
            .unwrap()
            .iter()
            .filter(|m| activation_ids.contains(&m.activation))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn list_disaster_types(
        &self,
        slug: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DisasterType>, sqlx::Error> {
        let mut result: Vec<DisasterType> = self
            .disaster_types
            .lock()
            .unwrap()
            .iter()
            .filter(|d| slug.is_none_or(|s| d.slug == s))
            .filter(|d| name.is_none_or(|n| d.name == n))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn list_keywords(&self, slug: Option<&str>) -> Result<Vec<Keyword>, sqlx::Error> {
        let mut result: Vec<Keyword> = self
            .keywords
            .lock()
            .unwrap()
            .iter()
            .filter(|k| slug.is_none_or(|s| k.slug == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn list_maps(&self) -> Result<Vec<ActivationMap>, sqlx::Error> {
        let mut result = self.maps.lock().unwrap().clone();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn get_map(&self, id: Uuid) -> Result<Option<ActivationMap>, sqlx::Error> {
        Ok(self.maps.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn create_map(
        &self,
        req: CreateMapRequest,
        owner: Uuid,
    ) -> Result<ActivationMap, sqlx::Error> {
        let now = Utc::now();
        let map = ActivationMap {
            id: Uuid::new_v4(),
            owner,
            title: req.title,
            abstract_text: req.abstract_text,
            config: req.config,
            public: req.public,
            created_at: now,
            updated_at: now,
        };
        self.maps.lock().unwrap().push(map.clone());
        Ok(map)
    }

    async fn update_map(
        &self,
        id: Uuid,
        req: UpdateMapRequest,
    ) -> Result<Option<ActivationMap>, sqlx::Error> {
        let mut maps = self.maps.lock().unwrap();
        let Some(map) = maps.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };

        if let Some(title) = req.title {
            map.title = title;
        }
        if let Some(abstract_text) = req.abstract_text {
            map.abstract_text = abstract_text;
        }
        if let Some(config) = req.config {
            map.config = config;
        }
        if let Some(public) = req.public {
            map.public = public;
        }
        map.updated_at = Utc::now();
        Ok(Some(map.clone()))
    }

    async fn get_profile(&self, id: Uuid) -> Option<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
}
