use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    core::{
        domain::{
            ExecutionLimits, ExecutionResult, FailedTestCaseDetails, Submission,
            SubmissionStatus, TestCase, TestCaseOutcome, TestCaseVerdict,
        },
        traits::sandbox::RunSpec,
    },
    http::models::{
        CreateSubmissionRequest, ExecuteRequest, ExecuteResponse, FailedTestCaseView,
        SubmissionView, TestCaseRequest, TestCaseResultView,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },
    #[error("Invalid field {field}: {msg}")]
    InvalidField { field: String, msg: String },
}

fn required(value: Option<String>, field: &str) -> Result<String, ConversionError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConversionError::MissingField {
            field: field.to_string(),
        })
}

/// Applies deployment defaults to omitted limits and rejects values no
/// sandbox could honour.
fn resolve_limits(
    time_limit_ms: Option<i64>,
    memory_limit_kb: Option<i64>,
    defaults: ExecutionLimits,
) -> Result<ExecutionLimits, ConversionError> {
    let time_limit_ms = match time_limit_ms {
        None => defaults.time_limit_ms,
        Some(ms) if ms > 0 => ms as u64,
        Some(ms) => {
            return Err(ConversionError::InvalidField {
                field: "time_limit_ms".to_string(),
                msg: format!("must be positive, got {ms}"),
            });
        }
    };
    let memory_limit_kb = match memory_limit_kb {
        None => defaults.memory_limit_kb,
        Some(kb) if kb >= 0 => kb as u64,
        Some(kb) => {
            return Err(ConversionError::InvalidField {
                field: "memory_limit_kb".to_string(),
                msg: format!("must not be negative, got {kb}"),
            });
        }
    };

    Ok(ExecutionLimits {
        time_limit_ms,
        memory_limit_kb,
    })
}

impl ExecuteRequest {
    pub fn into_run_spec(self, defaults: ExecutionLimits) -> Result<RunSpec, ConversionError> {
        let limits = resolve_limits(self.time_limit_ms, self.memory_limit_kb, defaults)?;
        Ok(RunSpec {
            code: required(self.code, "code")?,
            input: self.input,
            limits,
        })
    }
}

impl CreateSubmissionRequest {
    pub fn into_submission(self, defaults: ExecutionLimits) -> Result<Submission, ConversionError> {
        let code = required(self.code, "code")?;
        let language = required(self.language, "language")?;
        let problem_id = required(self.problem_id, "problem_id")?;
        let limits = resolve_limits(self.time_limit_ms, self.memory_limit_kb, defaults)?;

        let test_cases = self
            .test_cases
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, tc)| tc.into_test_case(idx))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        if let Some(dup) = test_cases
            .iter()
            .find(|tc| !seen.insert(tc.sequence_number))
        {
            return Err(ConversionError::InvalidField {
                field: "test_cases".to_string(),
                msg: format!("duplicate sequence_number {}", dup.sequence_number),
            });
        }

        let now = chrono::Utc::now();

        Ok(Submission {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            code,
            language,
            problem_id,
            limits,
            test_cases,
            status: SubmissionStatus::default(),
            results: Vec::new(),
            message: None,
        })
    }
}

impl TestCaseRequest {
    /// Test cases without an explicit sequence number run in request order.
    fn into_test_case(self, idx: usize) -> Result<TestCase, ConversionError> {
        let expected_output =
            self.expected_output
                .ok_or_else(|| ConversionError::MissingField {
                    field: format!("test_cases[{idx}].expected_output"),
                })?;

        Ok(TestCase {
            id: Uuid::new_v4(),
            input: self.input,
            expected_output,
            is_sample: self.is_sample,
            points: self.points.unwrap_or(1),
            sequence_number: self.sequence_number.unwrap_or(idx as u32 + 1),
        })
    }
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            output: result.output,
            execution_time_ms: result.execution_time_ms,
            memory_used_kb: result.memory_used_kb,
            status: result.status,
        }
    }
}

impl From<&FailedTestCaseDetails> for FailedTestCaseView {
    fn from(details: &FailedTestCaseDetails) -> Self {
        let visible = |value: &String| details.is_sample.then(|| value.clone());
        let hides_answer = !details.is_sample && details.verdict == TestCaseVerdict::WrongAnswer;
        Self {
            sequence_number: details.sequence_number,
            verdict: details.verdict,
            input: visible(&details.input),
            expected_output: visible(&details.expected_output),
            actual_output: details.actual_output.clone(),
            error: (!hides_answer).then(|| details.error.clone()),
        }
    }
}

impl From<&TestCaseOutcome> for TestCaseResultView {
    fn from(outcome: &TestCaseOutcome) -> Self {
        Self {
            sequence_number: outcome.sequence_number,
            verdict: outcome.verdict,
            actual_output: outcome.is_sample.then(|| outcome.actual_output.clone()),
            diagnostic: outcome.is_sample.then(|| outcome.diagnostic.clone()),
            execution_time_ms: outcome.execution_time_ms,
            memory_used_kb: outcome.memory_used_kb,
            points: outcome.points,
        }
    }
}

impl From<&Submission> for SubmissionView {
    fn from(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id,
            problem_id: submission.problem_id.clone(),
            language: submission.language.clone(),
            status: submission.status,
            test_cases_passed: submission.test_cases_passed(),
            test_cases_total: submission.test_cases_total(),
            points_earned: submission.points_earned(),
            execution_time_ms: submission.execution_time_ms(),
            memory_used_kb: submission.memory_used_kb(),
            message: submission.message.clone(),
            failed_test_case_details: submission.first_failure().map(Into::into),
            results: submission.results.iter().map(Into::into).collect(),
            created_at: submission.created_at,
            updated_at: submission.updated_at,
        }
    }
}
