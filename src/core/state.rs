//! Lifecycle transitions of a [`Submission`].
//!
//! Every transition is a pure function from one snapshot to the next; the
//! store applies them under its entry lock so pollers never observe a
//! half-applied change.

use crate::{
    constants::{NO_TEST_CASES_MSG, SYSTEM_ERROR_MSG},
    core::{
        domain::{Submission, SubmissionStatus, TestCaseOutcome},
        verdict::aggregate,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a submission that is {current}")]
    Illegal {
        action: &'static str,
        current: SubmissionStatus,
    },
}

impl Submission {
    fn change_state(&self, status: SubmissionStatus) -> Self {
        Self {
            status,
            updated_at: chrono::Utc::now(),
            ..self.clone()
        }
    }

    fn expect_status(
        &self,
        action: &'static str,
        allowed: impl Fn(SubmissionStatus) -> bool,
    ) -> Result<(), TransitionError> {
        if allowed(self.status) {
            Ok(())
        } else {
            Err(TransitionError::Illegal {
                action,
                current: self.status,
            })
        }
    }

    /// `PENDING -> PROCESSING`. Fails for anything else, which is what keeps
    /// two workers from judging the same submission.
    pub fn claim(&self) -> Result<Self, TransitionError> {
        self.expect_status("claim", |s| s == SubmissionStatus::Pending)?;
        Ok(self.change_state(SubmissionStatus::Processing))
    }

    /// `PROCESSING -> terminal`, with the status derived from the outcomes.
    pub fn complete(&self, results: Vec<TestCaseOutcome>) -> Result<Self, TransitionError> {
        self.expect_status("complete", |s| s == SubmissionStatus::Processing)?;

        let status = aggregate(&results, self.test_cases_total());
        let message = self
            .test_cases
            .is_empty()
            .then(|| NO_TEST_CASES_MSG.to_string());

        Ok(Self {
            results,
            message,
            ..self.change_state(status)
        })
    }

    /// `PROCESSING -> PENDING`, used when a judge run was interrupted and the
    /// submission must be picked up again.
    pub fn release(&self) -> Result<Self, TransitionError> {
        self.expect_status("release", |s| s == SubmissionStatus::Processing)?;
        Ok(Self {
            results: Vec::new(),
            message: None,
            ..self.change_state(SubmissionStatus::Pending)
        })
    }

    /// `PROCESSING -> SYSTEM_ERROR` once infra retries are exhausted.
    pub fn fail_system(&self) -> Result<Self, TransitionError> {
        self.expect_status("fail", |s| s == SubmissionStatus::Processing)?;
        Ok(Self {
            results: Vec::new(),
            message: Some(SYSTEM_ERROR_MSG.to_string()),
            ..self.change_state(SubmissionStatus::SystemError)
        })
    }

    /// `terminal -> PENDING`, clearing every prior outcome in the same step.
    pub fn rejudge(&self) -> Result<Self, TransitionError> {
        self.expect_status("rejudge", |s| s.is_terminal())?;
        Ok(Self {
            results: Vec::new(),
            message: None,
            ..self.change_state(SubmissionStatus::Pending)
        })
    }
}
