//! HTTP surface of the judge: synchronous single runs, submission intake,
//! polling and operator controls.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::{
    domain::ExecutionLimits, pipeline::workers::JudgeQueue, store::SubmissionStore,
    traits::sandbox::Sandbox,
};

pub mod error;
pub mod extractors;
pub mod mappers;
pub mod models;
pub mod services;

#[derive(Clone, Debug)]
pub struct AppState {
    pub sandbox: Arc<dyn Sandbox>,
    pub store: SubmissionStore,
    pub queue: JudgeQueue,
    /// Limits applied when a request omits its own.
    pub defaults: ExecutionLimits,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(services::health))
        .route("/execute", post(services::execute))
        .route("/submissions", post(services::create_submission))
        .route(
            "/submissions/{id}",
            get(services::get_submission).delete(services::delete_submission),
        )
        .route(
            "/submissions/{id}/rejudge",
            post(services::rejudge_submission),
        )
        .with_state(state)
}
