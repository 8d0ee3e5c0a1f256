#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use filevault::{
    ServerConfig,
    broker::BrokerLimits,
    create_app,
    db::Database,
    jwt::JwtConfig,
    storage::{ObjectHead, ObjectStore, PresignedRequest, StorageError},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_BUCKET: &str = "test-bucket";
pub const PASSWORD: &str = "correct-horse";

/// In-memory object store. Objects are just sizes keyed by storage key.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, u64>>,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    /// Simulate the client's direct upload.
    pub fn put(&self, key: &str, size: u64) {
        self.objects.lock().unwrap().insert(key.to_string(), size);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        TEST_BUCKET
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedRequest, StorageError> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("content-length".to_string(), content_length.to_string());
        Ok(PresignedRequest {
            url: format!(
                "https://storage.test/{}/{}?X-Amz-Expires={}",
                TEST_BUCKET,
                key,
                expires_in.as_secs()
            ),
            method: "PUT".to_string(),
            headers,
        })
    }

    async fn presign_download(
        &self,
        key: &str,
        _download_name: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "https://storage.test/{}/{}?X-Amz-Expires={}",
            TEST_BUCKET,
            key,
            expires_in.as_secs()
        ))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|&size| ObjectHead { size }))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Request("simulated outage".into()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub jwt: JwtConfig,
}

pub fn test_config(db: Database, store: Arc<MemoryStore>) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: TEST_SECRET.to_vec(),
        token_lifetime_secs: filevault::jwt::DEFAULT_TOKEN_LIFETIME_SECS,
        storage: store,
        limits: BrokerLimits::default(),
        secure_cookies: false,
        bcrypt_cost: 4,
        auth_rate_limit: 1000,
        ip_extractor: None,
    }
}

/// Create a test app backed by an in-memory database and object store.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

pub async fn create_test_app_with(customize: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let store = Arc::new(MemoryStore::default());
    let mut config = test_config(db.clone(), store.clone());
    customize(&mut config);
    let jwt = JwtConfig::with_lifetime(&config.jwt_secret, config.token_lifetime_secs);
    TestApp {
        app: create_app(&config),
        db,
        store,
        jwt,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    /// Value of the `auth-token` Set-Cookie, if one was sent.
    pub fn auth_cookie(&self) -> Option<String> {
        set_cookies(&self.headers)
            .into_iter()
            .find(|c| c.starts_with("auth-token="))
    }

    /// The session token installed by this response.
    pub fn token(&self) -> Option<String> {
        let cookie = self.auth_cookie()?;
        let value = cookie
            .strip_prefix("auth-token=")?
            .split(';')
            .next()?
            .to_string();
        (!value.is_empty()).then_some(value)
    }

    pub fn clears_auth_cookie(&self) -> bool {
        self.auth_cookie()
            .is_some_and(|c| c.starts_with("auth-token=;") && c.contains("Max-Age=0"))
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("auth-token={}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    TestResponse {
        status,
        headers,
        json,
    }
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(app, request(Method::GET, uri, token, None)).await
}

pub async fn post(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> TestResponse {
    send(app, request(Method::POST, uri, token, Some(body))).await
}

/// POST an arbitrary body with extra headers and no session.
pub async fn post_raw(
    app: &Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> TestResponse {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(body.into()).unwrap()).await
}

pub async fn delete(app: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(app, request(Method::DELETE, uri, token, None)).await
}

/// Sign up through the API and return (user id, session token).
pub async fn sign_up(app: &Router, email: &str) -> (String, String) {
    let response = post(
        app,
        "/api/auth/signup",
        None,
        serde_json::json!({
            "email": email,
            "password": PASSWORD,
            "firstName": "Test",
            "lastName": "User",
        }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "signup failed: {}", response.json);
    let id = response.json["user"]["id"].as_str().unwrap().to_string();
    (id, response.token().unwrap())
}

/// Request a grant, "upload" it into the store, and commit it. Returns the file JSON.
pub async fn upload_file(
    test: &TestApp,
    token: &str,
    filename: &str,
    size: u64,
    mime_type: &str,
) -> serde_json::Value {
    let grant = post(
        &test.app,
        "/api/files/upload-url",
        Some(token),
        serde_json::json!({"filename": filename, "fileSize": size, "mimeType": mime_type}),
    )
    .await;
    assert_eq!(grant.status, StatusCode::OK, "grant failed: {}", grant.json);

    let key = grant.json["storageKey"].as_str().unwrap().to_string();
    let unique = grant.json["uniqueFilename"].as_str().unwrap().to_string();
    test.store.put(&key, size);

    let commit = post(
        &test.app,
        "/api/files/complete-upload",
        Some(token),
        serde_json::json!({
            "filename": unique,
            "originalFilename": filename,
            "fileSize": size,
            "mimeType": mime_type,
            "storageKey": key,
        }),
    )
    .await;
    assert_eq!(commit.status, StatusCode::OK, "commit failed: {}", commit.json);
    commit.json["file"].clone()
}

pub async fn count_rows(db: &Database, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(db.pool())
        .await
        .unwrap();
    count
}
