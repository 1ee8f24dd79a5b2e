use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::config::IdentityConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{UserMetadata, UserRecord};

/// Tokens and user returned by a successful password sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: UserRecord,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub metadata: Value,
    pub redirect_to: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>>;
    async fn update_metadata(&self, user_id: &str, metadata: &UserMetadata) -> AppResult<()>;
    async fn update_password(&self, user_id: &str, password: &str) -> AppResult<()>;
    /// Password change authorised by the user's own access token.
    async fn update_own_password(&self, access_token: &str, password: &str) -> AppResult<()>;
    /// `Ok(None)` when the credentials are rejected.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Option<SignIn>>;
    async fn sign_up(&self, request: &SignUp) -> AppResult<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;
    async fn resend_confirmation(&self, email: &str, redirect_to: &str) -> AppResult<()>;
}

/// GoTrue (Supabase auth) REST client. Admin calls use the service key,
/// end-user calls the anon key.
#[derive(Clone)]
pub struct SupabaseIdentity {
    client: Client,
    config: IdentityConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserRecord,
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<UserRecord>,
}

const USERS_PER_PAGE: usize = 1000;

impl SupabaseIdentity {
    pub fn new(client: Client, config: IdentityConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn admin(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.config.anon_key)
    }

    async fn put_admin_user(&self, user_id: &str, body: Value) -> AppResult<()> {
        let response = self
            .admin(self.client.put(self.endpoint(&format!("admin/users/{}", user_id))))
            .json(&body)
            .send()
            .await?;
        ensure_success(response, "update user").await?;
        Ok(())
    }
}

// Converts a non-2xx answer into an upstream error carrying the response text.
async fn ensure_success(response: reqwest::Response, action: &str) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("Identity service failed to {}: {} {}", action, status, body);
    Err(AppError::Upstream(format!("{} failed ({}): {}", action, status, body)))
}

#[async_trait]
impl IdentityService for SupabaseIdentity {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let response = self
            .admin(self.client.get(self.endpoint(&format!("admin/users/{}", user_id))))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, "fetch user").await?;
        Ok(Some(response.json().await?))
    }

    async fn update_metadata(&self, user_id: &str, metadata: &UserMetadata) -> AppResult<()> {
        self.put_admin_user(user_id, json!({ "user_metadata": metadata })).await
    }

    async fn update_password(&self, user_id: &str, password: &str) -> AppResult<()> {
        self.put_admin_user(user_id, json!({ "password": password })).await
    }

    async fn update_own_password(&self, access_token: &str, password: &str) -> AppResult<()> {
        let response = self
            .anon(self.client.put(self.endpoint("user")))
            .bearer_auth(access_token)
            .json(&json!({ "password": password }))
            .send()
            .await?;
        ensure_success(response, "update password").await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Option<SignIn>> {
        let response = self
            .anon(self.client.post(self.endpoint("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Ok(None);
        }
        let token: TokenResponse = ensure_success(response, "sign in").await?.json().await?;
        Ok(Some(SignIn {
            user: token.user,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        }))
    }

    async fn sign_up(&self, request: &SignUp) -> AppResult<Option<UserRecord>> {
        let response = self
            .anon(self.client.post(self.endpoint("signup")))
            .query(&[("redirect_to", request.redirect_to.as_str())])
            .json(&json!({
                "email": request.email,
                "password": request.password,
                "data": request.metadata,
            }))
            .send()
            .await?;
        let body: Value = ensure_success(response, "sign up").await?.json().await?;

        // With email confirmation enabled the user is the whole body, otherwise it is nested.
        let user = body.get("user").cloned().unwrap_or(body);
        Ok(serde_json::from_value(user).ok())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let mut page = 1;
        loop {
            let response = self
                .admin(self.client.get(self.endpoint("admin/users")))
                .query(&[("page", page.to_string()), ("per_page", USERS_PER_PAGE.to_string())])
                .send()
                .await?;
            let list: UserList = ensure_success(response, "list users").await?.json().await?;
            let exhausted = list.users.len() < USERS_PER_PAGE;
            if let Some(user) = list
                .users
                .into_iter()
                .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            {
                return Ok(Some(user));
            }
            if exhausted {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn resend_confirmation(&self, email: &str, redirect_to: &str) -> AppResult<()> {
        let response = self
            .anon(self.client.post(self.endpoint("resend")))
            .json(&json!({
                "type": "signup",
                "email": email,
                "options": { "email_redirect_to": redirect_to },
            }))
            .send()
            .await?;
        ensure_success(response, "resend confirmation").await?;
        Ok(())
    }
}
