//! Submission of generation batches and the credit accounting around them.
//!
//! A batch of `repeat` webhook calls is charged only when every call was
//! accepted. Calls that were accepted in a failed batch are not charged.
//! If the credit write itself fails after a fully accepted batch, the amount
//! is recorded as an unsettled charge and applied on the next submission.

pub mod credits;
pub mod fanout;
pub mod payload;

use uuid::Uuid;
use crate::config::GenerationConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{CurrentUser, GenerateForm, LastData, UserMetadata};
use crate::state::AppState;

pub use fanout::{CallOutcome, DispatchReport};
pub use payload::GenerationPayload;

/// A generation request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub repeat: u32,
    pub images: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub kind: Option<String>,
    pub resolution: String,
}

impl GenerationRequest {
    pub fn validate(form: GenerateForm, max_batch: u32) -> AppResult<Self> {
        let prompt = form
            .prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Validation("Prompt is required.".into()))?;

        if form.repeat == 0 {
            return Err(AppError::Validation("Repeat must be at least 1.".into()));
        }
        if form.repeat > max_batch {
            return Err(AppError::Validation(format!(
                "Repeat must not exceed {}.",
                max_batch
            )));
        }
        if form.width == 0 || form.height == 0 {
            return Err(AppError::Validation("Width and height must be positive.".into()));
        }

        Ok(Self {
            prompt,
            repeat: form.repeat,
            images: form.images,
            width: form.width,
            height: form.height,
            kind: form.kind,
            resolution: form.resolution,
        })
    }

    pub fn last_data(&self) -> LastData {
        LastData {
            last_prompt: Some(self.prompt.clone()),
            last_selected_images: self.images.clone(),
            last_width: Some(self.width),
            last_height: Some(self.height),
            last_repeat: Some(self.repeat),
            last_resolution: Some(self.resolution.clone()),
            last_type: self.kind.clone(),
        }
    }
}

/// Rejects disabled accounts and empty balances before anything is written or sent.
pub fn check_eligibility(metadata: &UserMetadata) -> AppResult<()> {
    if metadata.is_disabled() {
        return Err(AppError::Forbidden("Your account is temporarily disabled.".into()));
    }
    if metadata.credits <= 0 {
        return Err(AppError::Forbidden("No credits left.".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Every call was accepted and the balance was written.
    Charged { report: DispatchReport, remaining: i64 },
    /// At least one call failed; the balance is untouched.
    NotCharged { report: DispatchReport },
    /// Every call was accepted but the balance write failed; recorded in the ledger.
    ChargeFailed { report: DispatchReport },
}

/// Model for a request type: the alternate type maps to the alternate model,
/// anything else (or no type) to the primary one.
pub fn model_for(generation: &GenerationConfig, kind: Option<&str>) -> String {
    if kind == Some(generation.alternate_type.as_str()) {
        generation.alternate_model.clone()
    } else {
        generation.primary_model.clone()
    }
}

fn build_payloads(state: &AppState, user: &CurrentUser, request: &GenerationRequest) -> Vec<GenerationPayload> {
    let references: Vec<String> = request
        .images
        .iter()
        .map(|id| state.image_url(&user.email, "my_images", id))
        .collect();
    let model = model_for(&state.config.generation, request.kind.as_deref());

    (0..request.repeat)
        .map(|_| {
            GenerationPayload::new(
                &user.email,
                Uuid::new_v4().to_string(),
                &request.prompt,
                request.width,
                request.height,
                references.clone(),
                &model,
            )
        })
        .collect()
}

/// Checks the account and applies outstanding charges. Returns the balance the
/// batch is charged against; nothing about the request is written before this.
pub async fn prepare(state: &AppState, user: &CurrentUser) -> AppResult<i64> {
    check_eligibility(&user.metadata)?;

    let balance = credits::settle_outstanding(state, user).await?;
    if balance <= 0 {
        return Err(AppError::Forbidden("No credits left.".into()));
    }
    Ok(balance)
}

/// Sends the batch and charges `balance` for it when every call was accepted.
pub async fn submit(
    state: &AppState,
    user: &CurrentUser,
    request: &GenerationRequest,
    balance: i64,
) -> AppResult<SubmissionOutcome> {
    let payloads = build_payloads(state, user, request);
    tracing::info!(
        "Dispatching {} generation request(s) for {}",
        payloads.len(),
        user.email
    );
    let report = fanout::dispatch_all(state.webhook.as_ref(), &payloads).await;

    if !report.all_succeeded() {
        tracing::warn!(
            "{} of {} generation request(s) failed for {}, credits left untouched",
            report.failures().len(),
            payloads.len(),
            user.email
        );
        return Ok(SubmissionOutcome::NotCharged { report });
    }

    let amount = i64::from(request.repeat);
    let remaining = credits::charge(balance, amount);
    match credits::write_credits(state, &user.id, remaining).await {
        Ok(()) => Ok(SubmissionOutcome::Charged { report, remaining }),
        Err(e) => {
            tracing::error!("Failed to update credits for {}: {}", user.email, e);
            credits::record_unsettled(state, user, amount, report.succeeded_ids()).await;
            Ok(SubmissionOutcome::ChargeFailed { report })
        }
    }
}
