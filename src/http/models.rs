//! Wire types of the HTTP API.
//!
//! Request fields are optional so that a missing field is reported as a
//! validation error by the mappers instead of a generic decode failure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::domain::{ExecutionStatus, SubmissionStatus, TestCaseVerdict};

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    pub code: Option<String>,
    #[serde(default)]
    pub input: String,
    pub time_limit_ms: Option<i64>,
    pub memory_limit_kb: Option<i64>,
    /// Informational only, the interpreter is fixed per deployment.
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    pub status: ExecutionStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSubmissionRequest {
    pub code: Option<String>,
    pub language: Option<String>,
    pub problem_id: Option<String>,
    pub time_limit_ms: Option<i64>,
    pub memory_limit_kb: Option<i64>,
    pub test_cases: Option<Vec<TestCaseRequest>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestCaseRequest {
    #[serde(default)]
    pub input: String,
    pub expected_output: Option<String>,
    #[serde(default)]
    pub is_sample: bool,
    pub points: Option<u32>,
    pub sequence_number: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionCreated {
    pub submission_id: Uuid,
}

/// Poll response. Clients re-poll while `status` is PENDING or PROCESSING.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionView {
    pub submission_id: Uuid,
    pub problem_id: String,
    pub language: String,
    pub status: SubmissionStatus,
    pub test_cases_passed: usize,
    pub test_cases_total: usize,
    pub points_earned: u32,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_test_case_details: Option<FailedTestCaseView>,
    pub results: Vec<TestCaseResultView>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Input and expected output are only filled in for sample test cases. A
/// wrong answer on a hidden case also drops `error`, since the line diff
/// quotes the expected output.
#[derive(Debug, Serialize, Deserialize)]
pub struct FailedTestCaseView {
    pub sequence_number: u32,
    pub verdict: TestCaseVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    pub actual_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output and diagnostic are withheld for hidden cases: a passed hidden
/// case's output is its expected output.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestCaseResultView {
    pub sequence_number: u32,
    pub verdict: TestCaseVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    pub points: u32,
}
