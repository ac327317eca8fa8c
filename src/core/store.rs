use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::core::{domain::Submission, state::TransitionError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("submission {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// In-memory submission records.
///
/// Readers get cloned snapshots. Writers go through [`SubmissionStore::update`],
/// which holds the entry's shard lock for the whole read-transition-write, so
/// two concurrent claims on one submission cannot both succeed.
#[derive(Clone, Debug, Default)]
pub struct SubmissionStore {
    submissions: Arc<DashMap<Uuid, Submission>>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, submission: Submission) {
        self.submissions.insert(submission.id, submission);
    }

    pub fn get(&self, id: Uuid) -> Option<Submission> {
        self.submissions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<Submission> {
        self.submissions.remove(&id).map(|(_, submission)| submission)
    }

    pub fn update<F>(&self, id: Uuid, transition: F) -> Result<Submission, StoreError>
    where
        F: FnOnce(&Submission) -> Result<Submission, TransitionError>,
    {
        let mut entry = self
            .submissions
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        let next = transition(entry.value())?;
        *entry.value_mut() = next.clone();
        Ok(next)
    }

    pub fn claim(&self, id: Uuid) -> Result<Submission, StoreError> {
        self.update(id, Submission::claim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{domain::SubmissionStatus, state::tests::create_submission};

    #[test]
    fn test_get_returns_snapshot() {
        let store = SubmissionStore::new();
        let submission = create_submission(1);
        store.insert(submission.clone());

        let snapshot = store.get(submission.id).unwrap();
        store.claim(submission.id).unwrap();

        assert_eq!(snapshot.status, SubmissionStatus::Pending);
        assert_eq!(
            store.get(submission.id).unwrap().status,
            SubmissionStatus::Processing
        );
    }

    #[test]
    fn test_update_missing_submission() {
        let store = SubmissionStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.claim(id).unwrap_err(), StoreError::NotFound(id));
    }

    #[test]
    fn test_failed_transition_leaves_record_untouched() {
        let store = SubmissionStore::new();
        let submission = create_submission(1);
        store.insert(submission.clone());

        assert!(matches!(
            store.update(submission.id, Submission::rejudge),
            Err(StoreError::Transition(_))
        ));
        assert_eq!(store.get(submission.id).unwrap().updated_at, submission.updated_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_single_winner() {
        let store = SubmissionStore::new();
        let submission = create_submission(1);
        store.insert(submission.clone());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim(submission.id).is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
