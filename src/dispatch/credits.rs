use chrono::Utc;
use crate::errors::{AppError, AppResult};
use crate::models::{CurrentUser, UnsettledCharge};
use crate::state::AppState;

/// Balance after spending `amount`, never below zero.
pub fn charge(balance: i64, amount: i64) -> i64 {
    balance.saturating_sub(amount).max(0)
}

/// Writes `credits` into the user's metadata, re-read first so concurrent
/// metadata edits are kept.
pub async fn write_credits(state: &AppState, user_id: &str, credits: i64) -> AppResult<()> {
    let user = state
        .identity
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::Upstream(format!("User {} not found", user_id)))?;

    let mut metadata = user.user_metadata;
    metadata.credits = credits;
    state.identity.update_metadata(user_id, &metadata).await?;

    tracing::info!("Credits for user {} set to {}", user_id, credits);
    Ok(())
}

/// Records credits owed for a batch that was dispatched but never charged.
pub async fn record_unsettled(state: &AppState, user: &CurrentUser, amount: i64, job_ids: Vec<String>) {
    let charge = UnsettledCharge {
        user_id: user.id.clone(),
        amount,
        job_ids,
        recorded_at: Utc::now(),
    };
    match state.store.push_unsettled_charge(&charge).await {
        Ok(()) => tracing::warn!("Recorded unsettled charge of {} for user {}", amount, user.id),
        Err(e) => tracing::error!(
            "Failed to record unsettled charge of {} for user {} (jobs {:?}): {}",
            amount,
            user.id,
            charge.job_ids,
            e
        ),
    }
}

/// Applies outstanding charges to the balance seen by the auth gate and returns
/// the balance to use for this request. On a failed write the charges go back
/// into the ledger and the original balance is used. Charges that cannot be put
/// back are logged and do not fail the request.
pub async fn settle_outstanding(state: &AppState, user: &CurrentUser) -> AppResult<i64> {
    let balance = user.metadata.credits;
    let charges = state.store.take_unsettled_charges(&user.id).await?;
    if charges.is_empty() {
        return Ok(balance);
    }

    let owed: i64 = charges.iter().map(|c| c.amount).sum();
    let settled = charge(balance, owed);
    match write_credits(state, &user.id, settled).await {
        Ok(()) => {
            tracing::info!("Settled {} outstanding credit(s) for user {}", owed, user.id);
            Ok(settled)
        }
        Err(e) => {
            tracing::error!("Failed to settle outstanding credits for user {}: {}", user.id, e);
            // Each charge is re-queued on its own.
            for charge in &charges {
                if let Err(e) = state.store.push_unsettled_charge(charge).await {
                    tracing::error!(
                        "Failed to re-queue unsettled charge of {} for user {} (jobs {:?}): {}",
                        charge.amount,
                        charge.user_id,
                        charge.job_ids,
                        e
                    );
                }
            }
            Ok(balance)
        }
    }
}
