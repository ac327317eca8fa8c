use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    constants::EXECUTE_GRACE_MS,
    core::domain::Submission,
    http::{
        AppState,
        error::ApiError,
        extractors::AppJson,
        models::{
            CreateSubmissionRequest, ExecuteRequest, ExecuteResponse, SubmissionCreated,
            SubmissionView,
        },
    },
};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Runs one program once, outside of any submission.
#[tracing::instrument(skip_all)]
pub async fn execute(
    State(state): State<AppState>,
    AppJson(request): AppJson<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    tracing::debug!("Execute request, language={:?}", request.language);
    let spec = request.into_run_spec(state.defaults)?;
    let budget = Duration::from_millis(spec.limits.time_limit_ms.saturating_add(EXECUTE_GRACE_MS));

    match tokio::time::timeout(budget, state.sandbox.run(&spec)).await {
        Ok(Ok(result)) => Ok(Json(result.into())),
        Ok(Err(e)) => Err(ApiError::Internal(e.to_string())),
        Err(_) => Err(ApiError::Internal(format!(
            "sandbox did not return within {} ms",
            budget.as_millis()
        ))),
    }
}

#[tracing::instrument(skip_all)]
pub async fn create_submission(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionCreated>), ApiError> {
    let submission = request.into_submission(state.defaults)?;
    let submission_id = submission.id;
    tracing::info!(
        "Accepted submission {} for problem {} with {} test cases",
        submission_id,
        submission.problem_id,
        submission.test_cases_total()
    );

    state.store.insert(submission);
    if let Err(e) = state.queue.enqueue(submission_id).await {
        state.store.remove(submission_id);
        return Err(e.into());
    }

    Ok((StatusCode::ACCEPTED, Json(SubmissionCreated { submission_id })))
}

pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionView>, ApiError> {
    let submission = state
        .store
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Submission {id} not found")))?;
    Ok(Json(SubmissionView::from(&submission)))
}

/// Resets a judged submission to PENDING and queues it again. Refused while
/// the submission is still waiting or being judged.
#[tracing::instrument(skip(state))]
pub async fn rejudge_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmissionCreated>), ApiError> {
    state.store.update(id, Submission::rejudge)?;
    state.queue.enqueue(id).await?;
    tracing::info!("Submission {} queued for rejudge", id);

    Ok((StatusCode::ACCEPTED, Json(SubmissionCreated { submission_id: id })))
}

/// Removes the record and stops its judge run if one is active.
#[tracing::instrument(skip(state))]
pub async fn delete_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .remove(id)
        .ok_or_else(|| ApiError::NotFound(format!("Submission {id} not found")))?;

    if state.queue.cancel(id) {
        tracing::info!("Cancelled judging of deleted submission {}", id);
    }

    Ok(StatusCode::NO_CONTENT)
}
