use async_trait::async_trait;
use cbt_core::model::{AttemptId, AttemptResult, Test, TestId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored result together with its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id: i64,
    pub result: AttemptResult,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, result: AttemptResult) -> Self {
        Self { id, result }
    }
}

/// Test provider: the authored catalog the engine reads from.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Persist or replace a test together with its questions and options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the test cannot be stored.
    async fn upsert_test(&self, test: &Test) -> Result<(), StorageError>;

    /// Fetch a test by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures; a missing test is `Ok(None)`.
    async fn get_test(&self, id: TestId) -> Result<Option<Test>, StorageError>;

    /// List tests ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn list_tests(&self, limit: u32) -> Result<Vec<Test>, StorageError>;
}

/// Result sink: receives each finished attempt once.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Store a result and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result for the same attempt already exists,
    /// or other storage errors.
    async fn save_result(&self, result: &AttemptResult) -> Result<i64, StorageError>;

    /// Fetch a result by its storage id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError>;

    /// Most recent results of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn list_results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tests: Arc<Mutex<HashMap<TestId, Test>>>,
    results: Arc<Mutex<Vec<AttemptResult>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: ToString>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn row_id(index: usize) -> i64 {
    i64::try_from(index + 1).unwrap_or(i64::MAX)
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn upsert_test(&self, test: &Test) -> Result<(), StorageError> {
        let mut guard = self.tests.lock().map_err(poisoned)?;
        guard.insert(test.id(), test.clone());
        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<Option<Test>, StorageError> {
        let guard = self.tests.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<Test>, StorageError> {
        let guard = self.tests.lock().map_err(poisoned)?;
        let mut tests: Vec<Test> = guard.values().cloned().collect();
        tests.sort_by_key(Test::id);
        tests.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(tests)
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn save_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
        let mut guard = self.results.lock().map_err(poisoned)?;
        let attempt_id: AttemptId = result.attempt_id();
        if guard.iter().any(|r| r.attempt_id() == attempt_id) {
            return Err(StorageError::Conflict);
        }
        guard.push(result.clone());
        Ok(row_id(guard.len() - 1))
    }

    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let index = id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(StorageError::NotFound)?;
        guard.get(index).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .enumerate()
            .filter(|(_, r)| r.user_id() == user_id)
            .map(|(i, r)| ResultRow::new(row_id(i), r.clone()))
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .completed_at()
                .cmp(&a.result.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates the collaborator repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tests: Arc<dyn TestRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let tests: Arc<dyn TestRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self { tests, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_catalog;
    use cbt_core::model::{AttemptStamp, SubmitTrigger};
    use cbt_core::scoring::ScoreSheet;
    use cbt_core::time::fixed_now;

    fn result_for(user: u64, minutes: i64) -> AttemptResult {
        AttemptResult::from_score(
            AttemptStamp {
                attempt_id: AttemptId::generate(),
                test_id: TestId::new(1),
                user_id: UserId::new(user),
                started_at: fixed_now(),
                completed_at: fixed_now() + chrono::Duration::minutes(minutes),
                trigger: SubmitTrigger::Manual,
            },
            ScoreSheet::from_outcomes(Vec::new()),
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_tests() {
        let repo = InMemoryRepository::new();
        for test in sample_catalog(fixed_now()).unwrap() {
            repo.upsert_test(&test).await.unwrap();
        }

        let fetched = repo.get_test(TestId::new(2)).await.unwrap().unwrap();
        assert_eq!(fetched.questions().len(), 20);
        assert!(repo.get_test(TestId::new(99)).await.unwrap().is_none());

        let listed = repo.list_tests(2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(Test::id).collect();
        assert_eq!(ids, vec![TestId::new(1), TestId::new(2)]);
    }

    #[tokio::test]
    async fn rejects_duplicate_attempt_results() {
        let repo = InMemoryRepository::new();
        let result = result_for(1, 5);
        let id = repo.save_result(&result).await.unwrap();
        assert_eq!(repo.get_result(id).await.unwrap(), result);
        assert!(matches!(
            repo.save_result(&result).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn lists_user_results_newest_first() {
        let repo = InMemoryRepository::new();
        repo.save_result(&result_for(1, 5)).await.unwrap();
        repo.save_result(&result_for(2, 6)).await.unwrap();
        let newest = repo.save_result(&result_for(1, 30)).await.unwrap();

        let rows = repo.list_results_for_user(UserId::new(1), 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, newest);
        assert!(matches!(repo.get_result(0).await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn out_of_range_result_ids_are_not_found() {
        let repo = InMemoryRepository::new();
        repo.save_result(&result_for(1, 5)).await.unwrap();
        for id in [i64::MIN, -1, 2, i64::MAX] {
            assert!(matches!(repo.get_result(id).await, Err(StorageError::NotFound)));
        }
    }
}
