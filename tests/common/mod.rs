#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;
use axum_imagegen::build_router;
use axum_imagegen::config::Config;
use axum_imagegen::dispatch::GenerationPayload;
use axum_imagegen::errors::dispatch::{DispatchError, DispatchResult};
use axum_imagegen::errors::{AppError, AppResult};
use axum_imagegen::models::{
    BasketImage, JobRecord, JobStatus, JobStatusRow, ProgressEntry, UnsettledCharge,
    UserMetadata, UserRecord,
};
use axum_imagegen::services::{
    CachedImage, EphemeralStore, FetchedObject, GenerationWebhook, IdentityService,
    InProcessStore, ObjectStorage, SignIn, SignUp, TableService,
};
use axum_imagegen::state::AppState;

pub const EMAIL: &str = "ada@example.com";
pub const USER_ID: &str = "user-1";
pub const PASSWORD: &str = "hunter22";

#[derive(Default)]
pub struct FakeIdentity {
    pub users: Mutex<HashMap<String, UserRecord>>,
    pub resent: Mutex<Vec<String>>,
    pub passwords: Mutex<HashMap<String, String>>,
    pub metadata_writes: AtomicUsize,
    pub fail_metadata_writes: AtomicBool,
}

impl FakeIdentity {
    pub fn add_user(&self, id: &str, email: &str, password: &str, credits: i64) {
        let record = UserRecord {
            id: id.to_string(),
            email: Some(email.to_string()),
            user_metadata: UserMetadata {
                credits,
                email_verified: Some(true),
                ..Default::default()
            },
            confirmed_at: None,
        };
        self.users.lock().insert(id.to_string(), record);
        self.passwords.lock().insert(email.to_string(), password.to_string());
    }

    pub fn confirm(&self, id: &str) {
        if let Some(user) = self.users.lock().get_mut(id) {
            user.confirmed_at = Some(Utc::now().to_rfc3339());
        }
    }

    pub fn metadata(&self, id: &str) -> UserMetadata {
        self.users.lock()[id].user_metadata.clone()
    }

    pub fn credits(&self, id: &str) -> i64 {
        self.metadata(id).credits
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.users.lock().get(user_id).cloned())
    }

    async fn update_metadata(&self, user_id: &str, metadata: &UserMetadata) -> AppResult<()> {
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("metadata write refused".into()));
        }
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        match self.users.lock().get_mut(user_id) {
            Some(user) => {
                user.user_metadata = metadata.clone();
                Ok(())
            }
            None => Err(AppError::Upstream(format!("no user {}", user_id))),
        }
    }

    async fn update_password(&self, user_id: &str, password: &str) -> AppResult<()> {
        let email = self
            .users
            .lock()
            .get(user_id)
            .and_then(|u| u.email.clone())
            .ok_or_else(|| AppError::Upstream(format!("no user {}", user_id)))?;
        self.passwords.lock().insert(email, password.to_string());
        Ok(())
    }

    async fn update_own_password(&self, _access_token: &str, _password: &str) -> AppResult<()> {
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Option<SignIn>> {
        if self.passwords.lock().get(email).map(String::as_str) != Some(password) {
            return Ok(None);
        }
        let user = self
            .users
            .lock()
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned();
        Ok(user.map(|user| SignIn {
            user,
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }))
    }

    async fn sign_up(&self, request: &SignUp) -> AppResult<Option<UserRecord>> {
        let id = format!("user-{}", self.users.lock().len() + 1);
        let record = UserRecord {
            id: id.clone(),
            email: Some(request.email.clone()),
            user_metadata: serde_json::from_value(request.metadata.clone())
                .map_err(|e| AppError::Upstream(e.to_string()))?,
            confirmed_at: None,
        };
        self.users.lock().insert(id, record.clone());
        self.passwords
            .lock()
            .insert(request.email.clone(), request.password.clone());
        Ok(Some(record))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn resend_confirmation(&self, email: &str, _redirect_to: &str) -> AppResult<()> {
        self.resent.lock().push(email.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTables {
    pub jobs: Mutex<Vec<JobRecord>>,
    pub basket: Mutex<Vec<BasketImage>>,
}

impl FakeTables {
    pub fn add_job(&self, email: &str, id: &str, status: JobStatus) {
        let mut jobs = self.jobs.lock();
        let created_at = Utc::now() + Duration::seconds(jobs.len() as i64);
        jobs.push(JobRecord {
            id: id.to_string(),
            email: email.to_string(),
            prompt: Some("a lighthouse at dusk".into()),
            status,
            message: None,
            created_at,
        });
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|j| j.id.clone()).collect()
    }
}

#[async_trait]
impl TableService for FakeTables {
    async fn job_statuses(&self, email: &str) -> AppResult<Vec<JobStatusRow>> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.email == email)
            .map(|j| JobStatusRow {
                id: j.id.clone(),
                status: j.status,
            })
            .collect())
    }

    async fn job_page(&self, email: &str, offset: i64, limit: i64) -> AppResult<Vec<JobRecord>> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.email == email)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn completed_count(&self, email: &str) -> AppResult<usize> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.email == email && j.status == JobStatus::Completed)
            .count())
    }

    async fn delete_job(&self, email: &str, job_id: &str) -> AppResult<bool> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|j| !(j.email == email && j.id == job_id));
        Ok(jobs.len() != before)
    }

    async fn delete_all_jobs(&self, email: &str) -> AppResult<()> {
        self.jobs.lock().retain(|j| j.email != email);
        Ok(())
    }

    async fn basket_images(&self, email: &str) -> AppResult<Vec<BasketImage>> {
        Ok(self
            .basket
            .lock()
            .iter()
            .rev()
            .filter(|b| b.email == email)
            .cloned()
            .collect())
    }

    async fn insert_basket_image(&self, email: &str, image_id: &str) -> AppResult<()> {
        self.basket.lock().push(BasketImage {
            id: image_id.to_string(),
            email: email.to_string(),
        });
        Ok(())
    }

    async fn delete_basket_image(&self, email: &str, image_id: &str) -> AppResult<()> {
        self.basket
            .lock()
            .retain(|b| !(b.email == email && b.id == image_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub objects: Mutex<HashMap<String, (String, Bytes)>>,
    pub fetches: AtomicUsize,
}

impl FakeStorage {
    pub fn put(&self, key: &str, content_type: &str, body: &'static [u8]) {
        self.objects
            .lock()
            .insert(key.to_string(), (content_type.to_string(), Bytes::from_static(body)));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn public_url(&self, key: &str) -> String {
        format!("https://storage.test/{}", key)
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> AppResult<String> {
        self.objects
            .lock()
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> bool {
        self.objects.lock().remove(key).is_some()
    }

    async fn create_folder(&self, key: &str) -> bool {
        self.objects.lock().insert(
            format!("{}/.placeholder", key),
            ("application/octet-stream".into(), Bytes::new()),
        );
        true
    }

    async fn fetch(&self, key: &str) -> AppResult<FetchedObject> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(match self.objects.lock().get(key) {
            Some((content_type, body)) => FetchedObject {
                status: 200,
                content_type: Some(content_type.clone()),
                body: body.clone(),
            },
            None => FetchedObject {
                status: 404,
                content_type: None,
                body: Bytes::new(),
            },
        })
    }
}

/// Accepts the first `accept` calls and times out every call after that.
pub struct FakeWebhook {
    pub calls: AtomicUsize,
    pub accept: AtomicUsize,
    pub received: Mutex<Vec<GenerationPayload>>,
}

impl Default for FakeWebhook {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            accept: AtomicUsize::new(usize::MAX),
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationWebhook for FakeWebhook {
    async fn submit(&self, payload: &GenerationPayload) -> DispatchResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().push(payload.clone());
        if n < self.accept.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DispatchError::Timeout(60))
        }
    }
}

/// In-process store whose ledger writes can be switched off.
#[derive(Default)]
pub struct TestStore {
    pub inner: InProcessStore,
    pub fail_ledger_pushes: AtomicBool,
}

#[async_trait]
impl EphemeralStore for TestStore {
    async fn put_progress(
        &self,
        download_id: &str,
        entry: &ProgressEntry,
        ttl: std::time::Duration,
    ) -> AppResult<()> {
        self.inner.put_progress(download_id, entry, ttl).await
    }

    async fn get_progress(&self, download_id: &str) -> AppResult<Option<ProgressEntry>> {
        self.inner.get_progress(download_id).await
    }

    async fn latest_download(&self, owner: &str) -> AppResult<Option<String>> {
        self.inner.latest_download(owner).await
    }

    async fn cached_image(&self, key: &str) -> AppResult<Option<CachedImage>> {
        self.inner.cached_image(key).await
    }

    async fn cache_image(
        &self,
        key: &str,
        image: &CachedImage,
        ttl: std::time::Duration,
    ) -> AppResult<()> {
        self.inner.cache_image(key, image, ttl).await
    }

    async fn push_unsettled_charge(&self, charge: &UnsettledCharge) -> AppResult<()> {
        if self.fail_ledger_pushes.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("ledger write refused".into()));
        }
        self.inner.push_unsettled_charge(charge).await
    }

    async fn take_unsettled_charges(&self, user_id: &str) -> AppResult<Vec<UnsettledCharge>> {
        self.inner.take_unsettled_charges(user_id).await
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: Arc<FakeIdentity>,
    pub tables: Arc<FakeTables>,
    pub storage: Arc<FakeStorage>,
    pub webhook: Arc<FakeWebhook>,
    pub store: Arc<TestStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::from_toml("").expect("default config"))
    }

    pub fn with_config(config: Config) -> Self {
        let identity = Arc::new(FakeIdentity::default());
        let tables = Arc::new(FakeTables::default());
        let storage = Arc::new(FakeStorage::default());
        let webhook = Arc::new(FakeWebhook::default());
        let store = Arc::new(TestStore::default());

        let state = AppState {
            config: Arc::new(config),
            identity: identity.clone(),
            tables: tables.clone(),
            storage: storage.clone(),
            webhook: webhook.clone(),
            store: store.clone(),
            http: reqwest::Client::new(),
        };

        Self {
            router: build_router(state.clone()),
            state,
            identity,
            tables,
            storage,
            webhook,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Signs in through the login route and returns the session cookie.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("login sets a session cookie")
    }
}

pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("valid request")
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn form_request(method: &str, uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub async fn body_bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
