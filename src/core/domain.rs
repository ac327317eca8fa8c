use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Submission {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub code: String,
    pub language: String,
    pub problem_id: String,
    pub limits: ExecutionLimits,
    pub test_cases: Vec<TestCase>,
    pub status: SubmissionStatus,
    /// Outcomes in execution order. Empty until a terminal status is reached.
    pub results: Vec<TestCaseOutcome>,
    pub message: Option<String>,
}

impl Submission {
    pub fn test_cases_total(&self) -> usize {
        self.test_cases.len()
    }

    pub fn test_cases_passed(&self) -> usize {
        self.results
            .iter()
            .filter(|outcome| outcome.verdict == TestCaseVerdict::Passed)
            .count()
    }

    pub fn points_earned(&self) -> u32 {
        self.results
            .iter()
            .filter(|outcome| outcome.verdict == TestCaseVerdict::Passed)
            .map(|outcome| outcome.points)
            .sum()
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.results
            .iter()
            .map(|outcome| outcome.execution_time_ms)
            .max()
            .unwrap_or(0)
    }

    pub fn memory_used_kb(&self) -> u64 {
        self.results
            .iter()
            .map(|outcome| outcome.memory_used_kb)
            .max()
            .unwrap_or(0)
    }

    pub fn first_failure(&self) -> Option<&FailedTestCaseDetails> {
        self.results
            .iter()
            .find_map(|outcome| outcome.failure.as_ref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub id: Uuid,
    pub input: String,
    pub expected_output: String,
    pub is_sample: bool,
    pub points: u32,
    pub sequence_number: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    /// The judge itself kept failing. Never caused by the submitted code.
    SystemError,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Accepted => "ACCEPTED",
            Self::WrongAnswer => "WRONG_ANSWER",
            Self::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            Self::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::CompilationError => "COMPILATION_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single sandbox run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub execution_time_ms: u64,
    /// Peak resident set size. Zero means the sandbox does not measure it.
    pub memory_used_kb: u64,
    pub status: ExecutionStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestCaseVerdict {
    Passed,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl From<TestCaseVerdict> for SubmissionStatus {
    fn from(verdict: TestCaseVerdict) -> Self {
        match verdict {
            TestCaseVerdict::Passed => SubmissionStatus::Accepted,
            TestCaseVerdict::WrongAnswer => SubmissionStatus::WrongAnswer,
            TestCaseVerdict::TimeLimitExceeded => SubmissionStatus::TimeLimitExceeded,
            TestCaseVerdict::MemoryLimitExceeded => SubmissionStatus::MemoryLimitExceeded,
            TestCaseVerdict::RuntimeError => SubmissionStatus::RuntimeError,
            TestCaseVerdict::CompilationError => SubmissionStatus::CompilationError,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCaseOutcome {
    pub test_case_id: Uuid,
    pub sequence_number: u32,
    pub is_sample: bool,
    pub verdict: TestCaseVerdict,
    pub actual_output: String,
    pub diagnostic: String,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    pub points: u32,
    /// Set only on the first failing test case.
    pub failure: Option<FailedTestCaseDetails>,
}

/// Verbatim record of the first failing test case. Whether input and
/// expected output are shown to the user is decided at the API boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTestCaseDetails {
    pub sequence_number: u32,
    pub is_sample: bool,
    pub verdict: TestCaseVerdict,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub error: String,
}
