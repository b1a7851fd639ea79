use std::sync::Arc;

use cbt_core::integrity::{EnvironmentSignal, SignalResponse};
use cbt_core::model::{ExamSettings, TestId};
use cbt_core::randomizer::QuestionRandomizer;
use storage::repository::{ResultRepository, TestRepository};

use super::session::{ExamSession, Finalization, SaveState, TickOutcome};
use crate::Clock;
use crate::error::SessionError;
use crate::identity::IdentityProvider;

/// Outcome of an explicit submit through the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This submit finalized the attempt and the sink stored the result.
    Saved { result_id: i64 },
    /// The attempt was already closed; nothing was sent to the sink.
    AlreadySubmitted,
}

/// Orchestrates attempt start, timer ticks and the hand-off to the result sink.
#[derive(Clone)]
pub struct ExamLoopService {
    clock: Clock,
    tests: Arc<dyn TestRepository>,
    results: Arc<dyn ResultRepository>,
    identity: Arc<dyn IdentityProvider>,
    settings: ExamSettings,
    shuffle_seed: Option<u64>,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        tests: Arc<dyn TestRepository>,
        results: Arc<dyn ResultRepository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            clock,
            tests,
            results,
            identity,
            settings: ExamSettings::default(),
            shuffle_seed: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExamSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fix the question order for every attempt started by this service.
    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    fn randomizer(&self) -> QuestionRandomizer {
        match self.shuffle_seed {
            Some(seed) => QuestionRandomizer::seeded(seed),
            None => QuestionRandomizer::from_entropy(),
        }
    }

    /// Start an attempt of `test_id` for the signed-in user.
    ///
    /// A test whose duration is already spent is finalized and handed to the
    /// sink before the session is returned; see [`Self::settle_closed_start`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unauthenticated` without a user,
    /// `SessionError::NotFound` for an unknown test, `SessionError::Unpublished`
    /// or `SessionError::Empty` when the test cannot be taken, and
    /// `SessionError::Storage` for backend failures.
    pub async fn start_attempt(&self, test_id: TestId) -> Result<ExamSession, SessionError> {
        let user = self
            .identity
            .current_user()
            .ok_or(SessionError::Unauthenticated)?;
        let test = self
            .tests
            .get_test(test_id)
            .await?
            .ok_or(SessionError::NotFound(test_id))?;

        let mut session = ExamSession::start(
            &test,
            user,
            self.randomizer(),
            &self.settings,
            self.clock.now(),
        )?;

        self.settle_closed_start(&mut session).await;
        Ok(session)
    }

    /// Saves an attempt that was already finalized when it started.
    ///
    /// A sink failure does not lose the session: the result stays on it with
    /// `SaveState::Failed` so the caller can use [`Self::retry_save`].
    async fn settle_closed_start(&self, session: &mut ExamSession) {
        if session.is_submitted() {
            // persist records the failure on the session and logs it.
            let _ = self.persist(session).await;
        }
    }

    /// Deliver one timer tick at the service clock's current time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if expiry finalized the attempt and the
    /// sink refused the result. The result stays on the session for a retry.
    pub async fn tick(&self, session: &mut ExamSession) -> Result<TickOutcome, SessionError> {
        let outcome = session.tick(self.clock.now());
        if outcome == TickOutcome::Expired {
            self.persist(session).await?;
        }
        Ok(outcome)
    }

    /// Forward an environment signal, stamped with the service clock.
    pub fn on_signal(&self, session: &mut ExamSession, signal: EnvironmentSignal) -> SignalResponse {
        session.on_signal(signal, self.clock.now())
    }

    /// Explicit submit by the student.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the sink refused the result.
    pub async fn submit(&self, session: &mut ExamSession) -> Result<SubmitOutcome, SessionError> {
        match session.request_submit(self.clock.now()) {
            Finalization::Finalized => {
                let result_id = self.persist(session).await?;
                Ok(SubmitOutcome::Saved { result_id })
            }
            Finalization::AlreadySubmitted => Ok(SubmitOutcome::AlreadySubmitted),
        }
    }

    /// Re-send a retained result after a failed save.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotSubmitted` if the attempt has no result yet,
    /// or `SessionError::Storage` if persistence fails again.
    pub async fn retry_save(&self, session: &mut ExamSession) -> Result<i64, SessionError> {
        if let SaveState::Saved { result_id } = session.save_state() {
            return Ok(*result_id);
        }
        self.persist(session).await
    }

    async fn persist(&self, session: &mut ExamSession) -> Result<i64, SessionError> {
        let Some(result) = session.unsaved_result() else {
            return Err(SessionError::NotSubmitted);
        };

        match self.results.save_result(result).await {
            Ok(result_id) => {
                tracing::info!(attempt_id = %session.attempt_id(), result_id, "result saved");
                session.mark_saved(result_id);
                Ok(result_id)
            }
            Err(err) => {
                tracing::warn!(attempt_id = %session.attempt_id(), %err, "result save failed");
                session.mark_save_failed(err.to_string());
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use async_trait::async_trait;
    use cbt_core::model::{
        AnswerOption, AttemptResult, OptionId, Question, QuestionId, QuestionKind, SubmitTrigger,
        Test, UserId, UserIdentity,
    };
    use cbt_core::time::fixed_now;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::{InMemoryRepository, ResultRow, StorageError};

    /// Sink that refuses every save until switched back on.
    #[derive(Default)]
    struct FlakySink {
        offline: AtomicBool,
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl ResultRepository for FlakySink {
        async fn save_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StorageError::Connection("offline".into()));
            }
            self.inner.save_result(result).await
        }

        async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
            self.inner.get_result(id).await
        }

        async fn list_results_for_user(
            &self,
            user_id: UserId,
            limit: u32,
        ) -> Result<Vec<ResultRow>, StorageError> {
            self.inner.list_results_for_user(user_id, limit).await
        }
    }

    fn one_question_test() -> Test {
        let question = Question::new(
            QuestionId::new(1),
            "Q1",
            QuestionKind::Single,
            vec![
                AnswerOption::new(OptionId::new(1), "a", true),
                AnswerOption::new(OptionId::new(2), "b", false),
            ],
        )
        .unwrap();
        Test::new(
            TestId::new(1),
            "Instant",
            None,
            1,
            vec![question],
            true,
            UserId::new(1),
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn closed_start_keeps_result_when_sink_fails() {
        let sink = Arc::new(FlakySink::default());
        sink.offline.store(true, Ordering::SeqCst);
        let svc = ExamLoopService::new(
            Clock::fixed(fixed_now()),
            Arc::new(InMemoryRepository::new()),
            sink.clone(),
            Arc::new(StaticIdentity::anonymous()),
        );

        let mut session = ExamSession::begin(
            &one_question_test(),
            UserIdentity::new(UserId::new(7), "Student"),
            QuestionRandomizer::seeded(1),
            &ExamSettings::default(),
            0,
            fixed_now(),
        )
        .unwrap();
        svc.settle_closed_start(&mut session).await;

        assert!(matches!(session.save_state(), SaveState::Failed { .. }));
        let result = session.result().unwrap();
        assert_eq!(result.trigger(), SubmitTrigger::TimeExpired);

        sink.offline.store(false, Ordering::SeqCst);
        let id = svc.retry_save(&mut session).await.unwrap();
        assert_eq!(session.save_state(), &SaveState::Saved { result_id: id });
        assert_eq!(
            sink.get_result(id).await.unwrap().attempt_id(),
            session.attempt_id()
        );
    }
}
