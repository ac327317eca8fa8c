use itertools::Itertools;

use crate::core::{
    domain::{
        ExecutionResult, FailedTestCaseDetails, Submission, TestCase, TestCaseOutcome,
        TestCaseVerdict,
    },
    traits::sandbox::{RunSpec, Sandbox, SandboxError},
    verdict::{classify_test_case, first_difference, truncate_output},
};

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("judging was cancelled")]
    Cancelled,
}

/// Runs the submission against its test cases in sequence order and stops at
/// the first one that does not pass.
///
/// An infra failure aborts the whole run: a partial list of outcomes must
/// never be folded into a verdict.
#[tracing::instrument(skip_all, fields(submission_id = %submission.id))]
pub async fn judge_submission(
    sandbox: &dyn Sandbox,
    submission: &Submission,
    max_output_bytes: usize,
) -> Result<Vec<TestCaseOutcome>, SandboxError> {
    let mut outcomes = Vec::with_capacity(submission.test_cases.len());

    for test_case in submission
        .test_cases
        .iter()
        .sorted_by_key(|tc| tc.sequence_number)
    {
        let spec = RunSpec {
            code: submission.code.clone(),
            input: test_case.input.clone(),
            limits: submission.limits,
        };

        tracing::debug!("Running test case {}", test_case.sequence_number);
        let result = sandbox.run(&spec).await?;
        let outcome = evaluate(test_case, result, max_output_bytes);
        let verdict = outcome.verdict;
        outcomes.push(outcome);

        if verdict != TestCaseVerdict::Passed {
            tracing::info!(
                "Test case {} failed with {:?}, skipping the rest",
                test_case.sequence_number,
                verdict
            );
            break;
        }
    }

    Ok(outcomes)
}

fn evaluate(
    test_case: &TestCase,
    result: ExecutionResult,
    max_output_bytes: usize,
) -> TestCaseOutcome {
    let verdict = classify_test_case(&result, &test_case.expected_output);

    // Failed runs already carry stderr or the limit message as their output.
    let diagnostic = match verdict {
        TestCaseVerdict::Passed => String::new(),
        TestCaseVerdict::WrongAnswer => {
            first_difference(&test_case.expected_output, &result.output)
        }
        _ => result.output.clone(),
    };

    let failure = (verdict != TestCaseVerdict::Passed).then(|| FailedTestCaseDetails {
        sequence_number: test_case.sequence_number,
        is_sample: test_case.is_sample,
        verdict,
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output: result.output.clone(),
        error: diagnostic.clone(),
    });

    TestCaseOutcome {
        test_case_id: test_case.id,
        sequence_number: test_case.sequence_number,
        is_sample: test_case.is_sample,
        verdict,
        actual_output: truncate_output(&result.output, max_output_bytes),
        diagnostic: truncate_output(&diagnostic, max_output_bytes),
        execution_time_ms: result.execution_time_ms,
        memory_used_kb: result.memory_used_kb,
        points: if verdict == TestCaseVerdict::Passed {
            test_case.points
        } else {
            0
        },
        failure,
    }
}
