use activation_catalog::{
    AppConfig, AppState,
    auth::{Claims, MaybeRequester, Requester},
    config::Env,
    models::Profile,
    repository::InMemoryRepository,
};
use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_app_state(env: Env, repo: Arc<InMemoryRepository>) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();
    AppState::new(repo, config)
}

fn seeded_repo(profile: Profile) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_profile(profile);
    repo
}

/// Helper to get the mutable Parts struct from a generated Request.
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let token = create_token(TEST_USER_ID, 3600);
    let repo = seeded_repo(Profile {
        id: TEST_USER_ID,
        email: "test@example.com".to_string(),
        is_superuser: false,
    });
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_ok());
    let requester = requester.unwrap();
    assert_eq!(requester.id, TEST_USER_ID);
    assert!(!requester.is_superuser);
    // The rate key is stable and derived from the profile.
    assert_eq!(
        requester.rate_key,
        format!("profile-{}", TEST_USER_ID.simple())
    );
}

#[tokio::test]
async fn test_superuser_flag_comes_from_the_stored_profile() {
    let token = create_token(TEST_USER_ID, 3600);
    let repo = seeded_repo(Profile {
        id: TEST_USER_ID,
        email: "root@example.com".to_string(),
        is_superuser: true,
    });
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let requester = Requester::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(requester.is_superuser);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_err());
    assert_eq!(requester.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    // Issued an hour ago, expired half an hour ago.
    let token = create_token(TEST_USER_ID, -1800);
    let repo = seeded_repo(Profile {
        id: TEST_USER_ID,
        email: "test@example.com".to_string(),
        is_superuser: false,
    });
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_err());
    assert_eq!(requester.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_deleted_profile() {
    // Valid token, but no matching profile row.
    let token = create_token(TEST_USER_ID, 3600);
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_err());
    assert_eq!(requester.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let bypass_id = Uuid::new_v4();
    let repo = seeded_repo(Profile {
        id: bypass_id,
        email: "local@dev.com".to_string(),
        is_superuser: true,
    });
    let app_state = create_app_state(Env::Local, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&bypass_id.to_string()).unwrap(),
    );

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_ok());
    let requester = requester.unwrap();
    assert_eq!(requester.id, bypass_id);
    assert!(requester.is_superuser);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let bypass_id = Uuid::new_v4();
    let repo = seeded_repo(Profile {
        id: bypass_id,
        email: "local@dev.com".to_string(),
        is_superuser: false,
    });
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header.
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&bypass_id.to_string()).unwrap(),
    );

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(requester.is_err());
    assert_eq!(requester.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_maybe_requester_degrades_to_anonymous() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));

    // No credentials at all.
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    let MaybeRequester(requester) = MaybeRequester::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(requester.id, Uuid::nil());
    assert!(!requester.is_superuser);

    // A garbage token degrades the same way instead of rejecting.
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, "not-a-jwt");
    let MaybeRequester(requester) = MaybeRequester::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(!requester.is_superuser);
    assert_eq!(requester.rate_key, "anonymous");
}

#[tokio::test]
async fn test_maybe_requester_resolves_valid_credentials() {
    let token = create_token(TEST_USER_ID, 3600);
    let repo = seeded_repo(Profile {
        id: TEST_USER_ID,
        email: "test@example.com".to_string(),
        is_superuser: true,
    });
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let MaybeRequester(requester) = MaybeRequester::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(requester.id, TEST_USER_ID);
    assert!(requester.is_superuser);
}
