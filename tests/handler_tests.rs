use activation_catalog::{
    AppConfig, AppState,
    auth::{MaybeRequester, Requester},
    error::ApiError,
    handlers::{self, ActivationQuery, DisasterTypeQuery, KeywordQuery},
    models::{
        Activation, CreateActivationRequest, CreateMapRequest, DisasterType, Keyword, MapSet,
        UpdateMapRequest,
    },
    repository::{InMemoryRepository, Repository},
};
use axum::extract::{Path, Query, State};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Test Utilities ---

const TEST_ID: Uuid = Uuid::from_u128(123);
const TEST_SUPER_ID: Uuid = Uuid::from_u128(456);

fn regular_user() -> Requester {
    Requester {
        id: TEST_ID,
        is_superuser: false,
        rate_key: "profile-regular".to_string(),
    }
}

fn superuser() -> Requester {
    Requester {
        id: TEST_SUPER_ID,
        is_superuser: true,
        rate_key: "profile-super".to_string(),
    }
}

// AppState over a fresh in-memory repository; the repo handle is returned
// separately so tests can seed and inspect storage directly.
fn create_test_state() -> (Arc<InMemoryRepository>, AppState) {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(repo.clone(), AppConfig::default());
    (repo, state)
}

fn empty_query() -> ActivationQuery {
    ActivationQuery {
        extent: None,
        q: None,
        disaster_type: None,
        region: None,
        activation_id: None,
    }
}

fn seed_activation(
    repo: &InMemoryRepository,
    code: &str,
    public: bool,
    dtype: (&str, &str),
    bbox: Option<(f64, f64, f64, f64)>,
    keywords: &[&str],
    age_hours: i64,
) -> Uuid {
    let id = Uuid::new_v4();
    repo.seed_activation(Activation {
        id,
        activation_id: code.to_string(),
        public,
        bbox_x0: bbox.map(|b| b.0),
        bbox_y0: bbox.map(|b| b.1),
        bbox_x1: bbox.map(|b| b.2),
        bbox_y1: bbox.map(|b| b.3),
        activation_time: Utc::now() - Duration::hours(age_hours),
        disaster_type_slug: dtype.0.to_string(),
        disaster_type_name: dtype.1.to_string(),
        region_name: None,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });
    id
}

// --- Activation Listing ---

#[test]
async fn list_activations_scopes_to_visible_records() {
    let (repo, state) = create_test_state();
    seed_activation(&repo, "EMSR001", true, ("flood", "Flood"), None, &[], 1);
    seed_activation(&repo, "EMSR002", false, ("flood", "Flood"), None, &[], 2);

    let result = handlers::list_activations(
        MaybeRequester(regular_user()),
        State(state.clone()),
        Query(empty_query()),
    )
    .await
    .unwrap();
    assert_eq!(result.0.len(), 1);
    assert_eq!(result.0[0].activation_id, "EMSR001");

    // The superuser sees both.
    let result = handlers::list_activations(
        MaybeRequester(superuser()),
        State(state),
        Query(empty_query()),
    )
    .await
    .unwrap();
    assert_eq!(result.0.len(), 2);
}

#[test]
async fn list_activations_orders_most_recent_first() {
    let (repo, state) = create_test_state();
    seed_activation(&repo, "OLD", true, ("flood", "Flood"), None, &[], 48);
    seed_activation(&repo, "NEW", true, ("flood", "Flood"), None, &[], 1);

    let result = handlers::list_activations(
        MaybeRequester(Requester::anonymous()),
        State(state),
        Query(empty_query()),
    )
    .await
    .unwrap();

    let codes: Vec<&str> = result.0.iter().map(|a| a.activation_id.as_str()).collect();
    assert_eq!(codes, vec!["NEW", "OLD"]);
}

#[test]
async fn list_activations_rejects_malformed_extent() {
    let (_repo, state) = create_test_state();

    let query = ActivationQuery {
        extent: Some("1,2,north,4".to_string()),
        ..empty_query()
    };
    let result =
        handlers::list_activations(MaybeRequester(regular_user()), State(state), Query(query))
            .await;

    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[test]
async fn list_activations_composes_extent_and_text_filters() {
    let (repo, state) = create_test_state();
    // Inside the box, matches "flood".
    seed_activation(
        &repo,
        "EMSR001",
        true,
        ("flood", "Flood"),
        Some((0.0, 0.0, 10.0, 10.0)),
        &[],
        1,
    );
    // Inside the box, wrong text.
    seed_activation(
        &repo,
        "EMSR002",
        true,
        ("earthquake", "Earthquake"),
        Some((0.0, 0.0, 10.0, 10.0)),
        &[],
        2,
    );
    // Matches text, outside the box.
    seed_activation(
        &repo,
        "EMSR003",
        true,
        ("flood", "Flood"),
        Some((50.0, 50.0, 60.0, 60.0)),
        &[],
        3,
    );
    // Matches text, no extent at all.
    seed_activation(&repo, "EMSR004", true, ("flood", "Flood"), None, &[], 4);

    let query = ActivationQuery {
        extent: Some("5,5,15,15".to_string()),
        q: Some("flood".to_string()),
        ..empty_query()
    };
    let result =
        handlers::list_activations(MaybeRequester(regular_user()), State(state), Query(query))
            .await
            .unwrap();

    assert_eq!(result.0.len(), 1);
    assert_eq!(result.0[0].activation_id, "EMSR001");
}

#[test]
async fn declared_filters_narrow_by_equality() {
    let (repo, state) = create_test_state();
    seed_activation(&repo, "EMSR001", true, ("flood", "Flood"), None, &[], 1);
    seed_activation(&repo, "EMSR002", true, ("earthquake", "Earthquake"), None, &[], 2);

    let query = ActivationQuery {
        disaster_type: Some("earthquake".to_string()),
        ..empty_query()
    };
    let result =
        handlers::list_activations(MaybeRequester(regular_user()), State(state), Query(query))
            .await
            .unwrap();

    assert_eq!(result.0.len(), 1);
    assert_eq!(result.0[0].activation_id, "EMSR002");
}

// --- Activation Detail ---

#[test]
async fn invisible_detail_is_indistinguishable_from_missing() {
    let (repo, state) = create_test_state();
    let hidden = seed_activation(&repo, "EMSR001", false, ("flood", "Flood"), None, &[], 1);

    // Hidden record: 404 for a regular user.
    let result = handlers::get_activation_details(
        MaybeRequester(regular_user()),
        State(state.clone()),
        Path(hidden),
    )
    .await;
    assert!(matches!(result, Err(ApiError::NotFound)));

    // Unknown ID: the same 404.
    let result = handlers::get_activation_details(
        MaybeRequester(regular_user()),
        State(state.clone()),
        Path(Uuid::new_v4()),
    )
    .await;
    assert!(matches!(result, Err(ApiError::NotFound)));

    // The superuser reads the hidden record.
    let result =
        handlers::get_activation_details(MaybeRequester(superuser()), State(state), Path(hidden))
            .await
            .unwrap();
    assert_eq!(result.0.activation_id, "EMSR001");
}

// --- Activation Mutations ---

#[test]
async fn create_activation_starts_non_public() {
    let (repo, state) = create_test_state();
    repo.seed_disaster_type(DisasterType {
        id: Uuid::new_v4(),
        name: "Flood".to_string(),
        slug: "flood".to_string(),
    });

    let payload = CreateActivationRequest {
        activation_id: "EMSR300".to_string(),
        disaster_type_slug: "flood".to_string(),
        activation_time: Utc::now(),
        ..CreateActivationRequest::default()
    };
    let result = handlers::create_activation(
        regular_user(),
        State(state),
        axum::Json(payload),
    )
    .await
    .unwrap();

    assert_eq!(result.0.activation_id, "EMSR300");
    assert!(!result.0.public);
}

#[test]
async fn create_activation_rejects_broken_extents() {
    let (repo, state) = create_test_state();
    repo.seed_disaster_type(DisasterType {
        id: Uuid::new_v4(),
        name: "Flood".to_string(),
        slug: "flood".to_string(),
    });

    // Inverted corners.
    let payload = CreateActivationRequest {
        activation_id: "EMSR301".to_string(),
        disaster_type_slug: "flood".to_string(),
        activation_time: Utc::now(),
        bbox_x0: Some(10.0),
        bbox_y0: Some(0.0),
        bbox_x1: Some(0.0),
        bbox_y1: Some(10.0),
        ..CreateActivationRequest::default()
    };
    let result =
        handlers::create_activation(regular_user(), State(state.clone()), axum::Json(payload))
            .await;
    assert!(matches!(result, Err(ApiError::Validation(_))));

    // Partial extent (one corner missing).
    let payload = CreateActivationRequest {
        activation_id: "EMSR302".to_string(),
        disaster_type_slug: "flood".to_string(),
        activation_time: Utc::now(),
        bbox_x0: Some(0.0),
        bbox_y0: Some(0.0),
        bbox_x1: Some(10.0),
        ..CreateActivationRequest::default()
    };
    let result = handlers::create_activation(regular_user(), State(state), axum::Json(payload)).await;
    assert!(matches!(result, Err(ApiError::Validation(_))));

    // Neither invalid request reached storage.
    assert!(
        repo.list_activations(&activation_catalog::repository::ActivationFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[test]
async fn delete_activation_is_denied_for_everyone() {
    let (repo, state) = create_test_state();
    let id = seed_activation(&repo, "EMSR001", true, ("flood", "Flood"), None, &[], 1);

    // Superuser privilege does not open a closed verb.
    let result =
        handlers::delete_activation(superuser(), State(state.clone()), Path(id)).await;
    assert!(matches!(result, Err(ApiError::Authorization)));

    // And the record is still there.
    let still_there = repo.get_activation(id).await.unwrap();
    assert!(still_there.is_some());
}

#[test]
async fn mapset_mutations_are_closed_and_reach_no_storage() {
    let (repo, state) = create_test_state();

    let result = handlers::create_mapset(superuser(), State(state.clone())).await;
    assert!(matches!(result, Err(ApiError::Authorization)));

    let result =
        handlers::update_mapset(regular_user(), State(state.clone()), Path(Uuid::new_v4())).await;
    assert!(matches!(result, Err(ApiError::Authorization)));

    let result =
        handlers::delete_mapset(regular_user(), State(state), Path(Uuid::new_v4())).await;
    assert!(matches!(result, Err(ApiError::Authorization)));

    assert!(repo.list_mapsets().await.unwrap().is_empty());
}

// --- Nested Listing ---

#[test]
async fn full_listing_nests_only_visible_map_sets() {
    let (repo, state) = create_test_state();
    let shown = seed_activation(&repo, "EMSR001", true, ("flood", "Flood"), None, &[], 1);
    let hidden = seed_activation(&repo, "EMSR002", false, ("flood", "Flood"), None, &[], 2);

    repo.seed_mapset(MapSet {
        id: Uuid::new_v4(),
        name: "First Estimate".to_string(),
        slug: "first-estimate".to_string(),
        activation: shown,
        activation_public: true,
        layers: vec![],
    });
    repo.seed_mapset(MapSet {
        id: Uuid::new_v4(),
        name: "Internal Draft".to_string(),
        slug: "internal-draft".to_string(),
        activation: hidden,
        activation_public: false,
        layers: vec![],
    });

    let result = handlers::list_activations_full(
        MaybeRequester(regular_user()),
        State(state),
        Query(empty_query()),
    )
    .await
    .unwrap();

    assert_eq!(result.0.len(), 1);
    assert_eq!(result.0[0].activation.activation_id, "EMSR001");
    assert_eq!(result.0[0].map_sets.len(), 1);
    assert_eq!(result.0[0].map_sets[0].slug, "first-estimate");
}

// --- Faceted Listings ---

#[test]
async fn disaster_type_counts_depend_on_the_requester() {
    let (repo, state) = create_test_state();
    repo.seed_disaster_type(DisasterType {
        id: Uuid::new_v4(),
        name: "Flood".to_string(),
        slug: "flood".to_string(),
    });

    // 7 private + 3 public flood activations.
    for i in 0..7 {
        seed_activation(&repo, &format!("P{i}"), false, ("flood", "Flood"), None, &[], 1);
    }
    for i in 0..3 {
        seed_activation(&repo, &format!("V{i}"), true, ("flood", "Flood"), None, &[], 1);
    }

    let result = handlers::list_disaster_types(
        MaybeRequester(regular_user()),
        State(state.clone()),
        Query(DisasterTypeQuery {
            slug: None,
            name: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(result.0.objects.len(), 1);
    assert_eq!(result.0.objects[0].count, 3);

    let result = handlers::list_disaster_types(
        MaybeRequester(superuser()),
        State(state),
        Query(DisasterTypeQuery {
            slug: None,
            name: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(result.0.objects[0].count, 10);
    // The envelope stamps when the counts were computed.
    assert!(result.0.requested_time <= Utc::now());
}

#[test]
async fn zero_count_facet_items_are_still_listed() {
    let (repo, state) = create_test_state();
    repo.seed_disaster_type(DisasterType {
        id: Uuid::new_v4(),
        name: "Volcano".to_string(),
        slug: "volcano".to_string(),
    });

    let result = handlers::list_disaster_types(
        MaybeRequester(regular_user()),
        State(state),
        Query(DisasterTypeQuery {
            slug: None,
            name: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(result.0.objects.len(), 1);
    assert_eq!(result.0.objects[0].count, 0);
}

#[test]
async fn keyword_counts_count_each_record_once_per_keyword() {
    let (repo, state) = create_test_state();
    for (slug, name) in [("rain", "Rain"), ("river", "River")] {
        repo.seed_keyword(Keyword {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
        });
    }
    seed_activation(
        &repo,
        "EMSR001",
        true,
        ("flood", "Flood"),
        None,
        &["rain", "river"],
        1,
    );
    seed_activation(&repo, "EMSR002", true, ("flood", "Flood"), None, &["rain"], 2);

    let result = handlers::list_keywords(
        MaybeRequester(regular_user()),
        State(state),
        Query(KeywordQuery { slug: None }),
    )
    .await
    .unwrap();

    let counts: Vec<(&str, i64)> = result
        .0
        .objects
        .iter()
        .map(|k| (k.slug.as_str(), k.count))
        .collect();
    assert_eq!(counts, vec![("rain", 2), ("river", 1)]);
}

// --- Composed Maps (throttled resource) ---

fn map_payload(title: &str) -> CreateMapRequest {
    CreateMapRequest {
        title: title.to_string(),
        abstract_text: "composed in tests".to_string(),
        config: serde_json::json!({ "zoom": 5 }),
        public: false,
    }
}

#[test]
async fn fourth_map_create_in_the_window_is_throttled_with_no_write() {
    let (repo, state) = create_test_state();

    for i in 0..3 {
        let result = handlers::create_map(
            regular_user(),
            State(state.clone()),
            axum::Json(map_payload(&format!("map {i}"))),
        )
        .await;
        assert!(result.is_ok());
    }

    let result = handlers::create_map(
        regular_user(),
        State(state),
        axum::Json(map_payload("one too many")),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Throttled { .. })));

    // The rejected create performed no storage write.
    assert_eq!(repo.list_maps().await.unwrap().len(), 3);
}

#[test]
async fn map_write_quota_is_per_requester() {
    let (_repo, state) = create_test_state();

    for i in 0..3 {
        let result = handlers::create_map(
            regular_user(),
            State(state.clone()),
            axum::Json(map_payload(&format!("map {i}"))),
        )
        .await;
        assert!(result.is_ok());
    }

    // A different requester still has a full allowance.
    let result = handlers::create_map(
        superuser(),
        State(state),
        axum::Json(map_payload("other client")),
    )
    .await;
    assert!(result.is_ok());
}

#[test]
async fn map_delete_surface_does_not_exist() {
    let (repo, state) = create_test_state();
    let map = repo
        .create_map(map_payload("keep me"), TEST_ID)
        .await
        .unwrap();

    let result = handlers::delete_map(superuser(), State(state), Path(map.id)).await;
    assert!(matches!(result, Err(ApiError::Authorization)));
    assert!(repo.get_map(map.id).await.unwrap().is_some());
}

#[test]
async fn map_update_of_unknown_id_is_not_found() {
    let (_repo, state) = create_test_state();

    let result = handlers::update_map(
        regular_user(),
        State(state),
        Path(Uuid::new_v4()),
        axum::Json(UpdateMapRequest {
            title: Some("renamed".to_string()),
            ..UpdateMapRequest::default()
        }),
    )
    .await;

    assert!(matches!(result, Err(ApiError::NotFound)));
}
