use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder};
use serde_json::{json, Value};
use crate::config::IdentityConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{BasketImage, JobRecord, JobStatusRow};

const JOBS_TABLE: &str = "generated_images";
const BASKET_TABLE: &str = "my_images";

/// Reads and deletes on the two tables keyed by owner email.
#[async_trait]
pub trait TableService: Send + Sync {
    async fn job_statuses(&self, email: &str) -> AppResult<Vec<JobStatusRow>>;
    /// Newest first.
    async fn job_page(&self, email: &str, offset: i64, limit: i64) -> AppResult<Vec<JobRecord>>;
    async fn completed_count(&self, email: &str) -> AppResult<usize>;
    /// Returns whether a row was actually removed.
    async fn delete_job(&self, email: &str, job_id: &str) -> AppResult<bool>;
    async fn delete_all_jobs(&self, email: &str) -> AppResult<()>;
    /// Newest first.
    async fn basket_images(&self, email: &str) -> AppResult<Vec<BasketImage>>;
    async fn insert_basket_image(&self, email: &str, image_id: &str) -> AppResult<()>;
    async fn delete_basket_image(&self, email: &str, image_id: &str) -> AppResult<()>;
}

/// PostgREST client for the Supabase tables, authenticated with the service key.
#[derive(Clone)]
pub struct PostgrestTables {
    client: Client,
    config: IdentityConfig,
}

impl PostgrestTables {
    pub fn new(client: Client, config: IdentityConfig) -> Self {
        Self { client, config }
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table);
        self.client
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> AppResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Table request failed to {}: {} {}", action, status, body);
        Err(AppError::Upstream(format!("{} failed ({}): {}", action, status, body)))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

// `Content-Range: 0-0/42` or `*/0`
fn parse_total(content_range: Option<&str>) -> Option<usize> {
    content_range?.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl TableService for PostgrestTables {
    async fn job_statuses(&self, email: &str) -> AppResult<Vec<JobStatusRow>> {
        let request = self
            .table(Method::GET, JOBS_TABLE)
            .query(&[("select", "id,status".to_string()), ("email", eq(email))]);
        Ok(self.send(request, "read job statuses").await?.json().await?)
    }

    async fn job_page(&self, email: &str, offset: i64, limit: i64) -> AppResult<Vec<JobRecord>> {
        let request = self.table(Method::GET, JOBS_TABLE).query(&[
            ("select", "id,created_at,email,prompt,status,message".to_string()),
            ("email", eq(email)),
            ("order", "created_at.desc".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        Ok(self.send(request, "read jobs").await?.json().await?)
    }

    async fn completed_count(&self, email: &str) -> AppResult<usize> {
        let request = self
            .table(Method::GET, JOBS_TABLE)
            .query(&[
                ("select", "id".to_string()),
                ("email", eq(email)),
                ("status", eq("completed")),
                ("limit", "1".to_string()),
            ])
            .header("Prefer", "count=exact");
        let response = self.send(request, "count jobs").await?;
        let range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok());
        parse_total(range)
            .ok_or_else(|| AppError::Upstream("count jobs: missing Content-Range".into()))
    }

    async fn delete_job(&self, email: &str, job_id: &str) -> AppResult<bool> {
        let request = self
            .table(Method::DELETE, JOBS_TABLE)
            .query(&[("email", eq(email)), ("id", eq(job_id))])
            .header("Prefer", "return=representation");
        let removed: Vec<Value> = self.send(request, "delete job").await?.json().await?;
        Ok(!removed.is_empty())
    }

    async fn delete_all_jobs(&self, email: &str) -> AppResult<()> {
        let request = self
            .table(Method::DELETE, JOBS_TABLE)
            .query(&[("email", eq(email))]);
        self.send(request, "delete jobs").await?;
        Ok(())
    }

    async fn basket_images(&self, email: &str) -> AppResult<Vec<BasketImage>> {
        let request = self.table(Method::GET, BASKET_TABLE).query(&[
            ("select", "id,email".to_string()),
            ("email", eq(email)),
            ("order", "created_at.desc".to_string()),
        ]);
        Ok(self.send(request, "read basket").await?.json().await?)
    }

    async fn insert_basket_image(&self, email: &str, image_id: &str) -> AppResult<()> {
        let request = self
            .table(Method::POST, BASKET_TABLE)
            .json(&json!({ "email": email, "id": image_id }));
        self.send(request, "insert basket image").await?;
        Ok(())
    }

    async fn delete_basket_image(&self, email: &str, image_id: &str) -> AppResult<()> {
        let request = self
            .table(Method::DELETE, BASKET_TABLE)
            .query(&[("email", eq(email)), ("id", eq(image_id))]);
        self.send(request, "delete basket image").await?;
        Ok(())
    }
}
