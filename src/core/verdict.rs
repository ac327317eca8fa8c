use itertools::{EitherOrBoth, Itertools};

use crate::{
    constants::TRUNCATION_MARKER,
    core::domain::{
        ExecutionResult, ExecutionStatus, SubmissionStatus, TestCaseOutcome, TestCaseVerdict,
    },
};

/// Splits output into lines with trailing whitespace removed and trailing
/// blank lines dropped. Everything else is compared exactly.
fn normalized_lines(output: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

pub fn outputs_match(expected: &str, actual: &str) -> bool {
    normalized_lines(expected) == normalized_lines(actual)
}

/// Short human readable description of where two outputs diverge.
pub fn first_difference(expected: &str, actual: &str) -> String {
    let expected = normalized_lines(expected);
    let actual = normalized_lines(actual);

    for (idx, pair) in expected.iter().zip_longest(actual.iter()).enumerate() {
        let line = idx + 1;
        match pair {
            EitherOrBoth::Both(e, a) if e != a => {
                return format!("line {line}: expected {e:?}, got {a:?}");
            }
            EitherOrBoth::Left(e) => {
                return format!("line {line}: expected {e:?}, got end of output");
            }
            EitherOrBoth::Right(a) => {
                return format!("line {line}: expected end of output, got {a:?}");
            }
            EitherOrBoth::Both(..) => {}
        }
    }

    String::new()
}

pub fn classify_test_case(result: &ExecutionResult, expected_output: &str) -> TestCaseVerdict {
    match result.status {
        ExecutionStatus::Success if outputs_match(expected_output, &result.output) => {
            TestCaseVerdict::Passed
        }
        ExecutionStatus::Success => TestCaseVerdict::WrongAnswer,
        ExecutionStatus::TimeLimitExceeded => TestCaseVerdict::TimeLimitExceeded,
        ExecutionStatus::MemoryLimitExceeded => TestCaseVerdict::MemoryLimitExceeded,
        ExecutionStatus::RuntimeError => TestCaseVerdict::RuntimeError,
        ExecutionStatus::CompilationError => TestCaseVerdict::CompilationError,
    }
}

/// Folds ordered outcomes into the submission verdict.
///
/// The first non-passing outcome in sequence order decides. A problem without
/// test cases, or a run that stopped early without a failure, is never
/// accepted.
pub fn aggregate(outcomes: &[TestCaseOutcome], total: usize) -> SubmissionStatus {
    if total == 0 {
        return SubmissionStatus::RuntimeError;
    }

    match outcomes
        .iter()
        .find(|outcome| outcome.verdict != TestCaseVerdict::Passed)
    {
        Some(failure) => failure.verdict.into(),
        None if outcomes.len() == total => SubmissionStatus::Accepted,
        None => SubmissionStatus::SystemError,
    }
}

pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }

    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &output[..end], TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn outcome(sequence_number: u32, verdict: TestCaseVerdict) -> TestCaseOutcome {
        TestCaseOutcome {
            test_case_id: Uuid::new_v4(),
            sequence_number,
            is_sample: false,
            verdict,
            actual_output: String::new(),
            diagnostic: String::new(),
            execution_time_ms: 10,
            memory_used_kb: 0,
            points: 1,
            failure: None,
        }
    }

    fn success(output: &str) -> ExecutionResult {
        ExecutionResult {
            output: output.to_string(),
            execution_time_ms: 5,
            memory_used_kb: 0,
            status: ExecutionStatus::Success,
        }
    }

    #[test]
    fn test_trailing_newline_is_ignored() {
        assert!(outputs_match("hello", "hello\n"));
        assert!(outputs_match("hello\n\n\n", "hello"));
        assert!(outputs_match("1 2 3   \n4 5\t\n", "1 2 3\n4 5"));
        assert!(outputs_match("a\r\nb\r\n", "a\nb\n"));
    }

    #[test]
    fn test_other_differences_are_significant() {
        assert!(!outputs_match("hello", " hello"));
        assert!(!outputs_match("hello", "Hello"));
        assert!(!outputs_match("a\n\nb", "a\nb"));
        assert!(!outputs_match("", "0"));
    }

    #[test]
    fn test_empty_outputs_pass() {
        assert_eq!(classify_test_case(&success(""), ""), TestCaseVerdict::Passed);
        assert_eq!(classify_test_case(&success("\n"), ""), TestCaseVerdict::Passed);
    }

    #[test]
    fn test_classify_maps_statuses() {
        let cases = [
            (ExecutionStatus::TimeLimitExceeded, TestCaseVerdict::TimeLimitExceeded),
            (ExecutionStatus::MemoryLimitExceeded, TestCaseVerdict::MemoryLimitExceeded),
            (ExecutionStatus::RuntimeError, TestCaseVerdict::RuntimeError),
            (ExecutionStatus::CompilationError, TestCaseVerdict::CompilationError),
        ];

        for (status, expected) in cases {
            let result = ExecutionResult {
                status,
                ..success("42")
            };
            // Matching output never rescues a failed run.
            assert_eq!(classify_test_case(&result, "42"), expected);
        }

        assert_eq!(
            classify_test_case(&success("41"), "42"),
            TestCaseVerdict::WrongAnswer
        );
    }

    #[test]
    fn test_aggregate_zero_test_cases_is_never_accepted() {
        assert_eq!(aggregate(&[], 0), SubmissionStatus::RuntimeError);
    }

    #[test]
    fn test_aggregate_all_passed() {
        let outcomes = vec![
            outcome(1, TestCaseVerdict::Passed),
            outcome(2, TestCaseVerdict::Passed),
        ];
        assert_eq!(aggregate(&outcomes, 2), SubmissionStatus::Accepted);
    }

    #[test]
    fn test_aggregate_first_failure_wins() {
        let outcomes = vec![
            outcome(1, TestCaseVerdict::Passed),
            outcome(2, TestCaseVerdict::WrongAnswer),
            outcome(3, TestCaseVerdict::TimeLimitExceeded),
        ];
        assert_eq!(aggregate(&outcomes, 3), SubmissionStatus::WrongAnswer);
    }

    #[test]
    fn test_aggregate_incomplete_run_is_not_accepted() {
        let outcomes = vec![outcome(1, TestCaseVerdict::Passed)];
        assert_eq!(aggregate(&outcomes, 3), SubmissionStatus::SystemError);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let outcomes = vec![
            outcome(1, TestCaseVerdict::Passed),
            outcome(2, TestCaseVerdict::RuntimeError),
        ];
        let first = aggregate(&outcomes, 4);
        for _ in 0..10 {
            assert_eq!(aggregate(&outcomes, 4), first);
        }
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(
            first_difference("1\n2\n3", "1\n5\n3"),
            "line 2: expected \"2\", got \"5\""
        );
        assert_eq!(
            first_difference("1\n2", "1"),
            "line 2: expected \"2\", got end of output"
        );
        assert_eq!(
            first_difference("1", "1\n2"),
            "line 2: expected end of output, got \"2\""
        );
        assert_eq!(first_difference("same\n", "same"), "");
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        assert_eq!(truncate_output("short", 10), "short");

        let truncated = truncate_output("ааааа", 3);
        assert_eq!(truncated, format!("а{}", TRUNCATION_MARKER));
    }
}
