use chrono::{DateTime, Utc};
use std::fmt;

use cbt_core::integrity::{EnvironmentSignal, IntegrityMonitor, SignalResponse};
use cbt_core::ledger::{AnswerLedger, Selection};
use cbt_core::model::{
    AttemptId, AttemptResult, AttemptStamp, AttemptStatus, ExamSettings, IntegrityViolation,
    OptionId, Question, QuestionId, SubmitTrigger, Test, TestId, UserIdentity,
};
use cbt_core::randomizer::QuestionRandomizer;
use cbt_core::scoring;
use cbt_core::time::format_remaining;
use cbt_core::timer::{CountdownTimer, TimerEvent};

use super::progress::ExamProgress;
use crate::error::SessionError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Whether a presentation-layer call changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Applied,
    Ignored,
}

/// Result of asking the attempt to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// This call closed the attempt and produced its result.
    Finalized,
    /// The attempt was already submitted or abandoned; nothing happened.
    AlreadySubmitted,
}

/// What a timer tick did to the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running (attempt closed or countdown cancelled).
    Idle,
    Running { remaining_secs: i64 },
    /// Time ran out and this tick finalized the attempt.
    Expired,
}

/// Where the result hand-off to the result sink stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveState {
    /// No result exists yet.
    Idle,
    /// Result computed, not yet acknowledged by the sink.
    Pending,
    Saved { result_id: i64 },
    /// The sink refused the result; it is kept for a retry.
    Failed { reason: String },
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// State machine for one student's attempt at one test.
///
/// Every event (user input, timer tick, environment signal) is delivered on the
/// caller's execution context. Finalize is latched on `status`, so whichever of
/// manual submit or timer expiry arrives first wins and the other is a no-op.
pub struct ExamSession {
    attempt_id: AttemptId,
    test_id: TestId,
    test_title: String,
    user: UserIdentity,
    questions: Vec<Question>,
    question_ids: Vec<QuestionId>,
    current: usize,
    ledger: AnswerLedger,
    monitor: IntegrityMonitor,
    timer: CountdownTimer,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    result: Option<AttemptResult>,
    save_state: SaveState,
    low_time_warning_secs: i64,
}

impl ExamSession {
    /// Begin an attempt: randomize once, prepare the ledger, start the countdown
    /// and attach the integrity monitor.
    ///
    /// `now` should come from the services layer clock to keep time deterministic.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unpublished` for drafts when settings require
    /// publication, and `SessionError::Empty` if the test has no questions.
    pub fn start(
        test: &Test,
        user: UserIdentity,
        randomizer: QuestionRandomizer,
        settings: &ExamSettings,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        Self::begin(test, user, randomizer, settings, test.duration_secs(), now)
    }

    pub(crate) fn begin(
        test: &Test,
        user: UserIdentity,
        randomizer: QuestionRandomizer,
        settings: &ExamSettings,
        duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if settings.require_published() && !test.is_published() {
            return Err(SessionError::Unpublished(test.id()));
        }
        if test.questions().is_empty() {
            return Err(SessionError::Empty);
        }

        let questions = randomizer.randomize(test.questions());
        let question_ids: Vec<QuestionId> = questions.iter().map(Question::id).collect();
        let ledger = AnswerLedger::initialize(question_ids.iter().copied());

        let mut session = Self {
            attempt_id: AttemptId::generate(),
            test_id: test.id(),
            test_title: test.title().to_string(),
            user,
            questions,
            question_ids,
            current: 0,
            ledger,
            monitor: IntegrityMonitor::attached(),
            timer: CountdownTimer::new(),
            status: AttemptStatus::InProgress,
            started_at: now,
            ended_at: None,
            result: None,
            save_state: SaveState::Idle,
            low_time_warning_secs: i64::from(settings.low_time_warning_secs()),
        };

        tracing::info!(
            attempt_id = %session.attempt_id,
            test_id = %session.test_id,
            user_id = %session.user.id(),
            questions = session.questions.len(),
            duration_secs,
            "attempt started"
        );

        if let Some(TimerEvent::Expired) = session.timer.start(duration_secs, now) {
            session.finalize(SubmitTrigger::TimeExpired, now);
        }

        Ok(session)
    }

    //
    // ─── GETTERS ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn test_title(&self) -> &str {
        &self.test_title
    }

    #[must_use]
    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Questions in the randomized order fixed for this attempt.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.question(self.current)
    }

    #[must_use]
    pub fn selection(&self, question_id: QuestionId) -> Option<&Selection> {
        self.ledger.selection(question_id)
    }

    /// Returns a summary of the current attempt progress.
    #[must_use]
    pub fn progress(&self) -> ExamProgress {
        let total = self.question_ids.len();
        let answered = self.ledger.answered_among(&self.question_ids);
        ExamProgress {
            total,
            answered,
            unanswered: total.saturating_sub(answered),
            current_index: self.current,
            is_submitted: self.is_submitted(),
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        self.timer.remaining_secs()
    }

    /// Remaining time formatted for display.
    #[must_use]
    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining_secs())
    }

    /// True while the countdown is below the configured warning threshold.
    #[must_use]
    pub fn low_time_warning(&self) -> bool {
        self.timer.is_running() && self.remaining_secs() < self.low_time_warning_secs
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.monitor.violation_count()
    }

    #[must_use]
    pub fn violations(&self) -> &[IntegrityViolation] {
        self.monitor.violations()
    }

    /// Violation the student has not dismissed yet.
    #[must_use]
    pub fn violation_notice(&self) -> Option<IntegrityViolation> {
        self.monitor.pending_notice()
    }

    pub fn acknowledge_violation(&mut self) {
        self.monitor.acknowledge();
    }

    /// Result computed at finalize; kept even if saving it failed.
    #[must_use]
    pub fn result(&self) -> Option<&AttemptResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn save_state(&self) -> &SaveState {
        &self.save_state
    }

    //
    // ─── PRESENTATION OPERATIONS ───────────────────────────────────────────────
    //

    /// Replace the selection for a question. Ignored once the attempt is closed
    /// and for questions that are not part of it.
    pub fn answer(
        &mut self,
        question_id: QuestionId,
        selected: impl IntoIterator<Item = OptionId>,
    ) -> Mutation {
        if self.status != AttemptStatus::InProgress {
            return Mutation::Ignored;
        }
        match self.ledger.record(question_id, selected) {
            Ok(()) => Mutation::Applied,
            Err(_) => Mutation::Ignored,
        }
    }

    /// Jump to `index`. Out-of-range indices and closed attempts are ignored.
    pub fn navigate(&mut self, index: usize) -> Mutation {
        if self.status != AttemptStatus::InProgress || index >= self.questions.len() {
            return Mutation::Ignored;
        }
        self.current = index;
        Mutation::Applied
    }

    pub fn next(&mut self) -> Mutation {
        self.navigate(self.current.saturating_add(1))
    }

    pub fn previous(&mut self) -> Mutation {
        match self.current.checked_sub(1) {
            Some(index) => self.navigate(index),
            None => Mutation::Ignored,
        }
    }

    /// Explicit submission by the student.
    pub fn request_submit(&mut self, now: DateTime<Utc>) -> Finalization {
        self.finalize(SubmitTrigger::Manual, now)
    }

    /// Deliver a timer tick. Expiry finalizes the attempt.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.status != AttemptStatus::InProgress {
            return TickOutcome::Idle;
        }
        match self.timer.tick(now) {
            None => TickOutcome::Idle,
            Some(TimerEvent::Tick { remaining_secs }) => TickOutcome::Running { remaining_secs },
            Some(TimerEvent::Expired) => match self.finalize(SubmitTrigger::TimeExpired, now) {
                Finalization::Finalized => TickOutcome::Expired,
                Finalization::AlreadySubmitted => TickOutcome::Idle,
            },
        }
    }

    /// Deliver an environment signal to the integrity monitor.
    pub fn on_signal(&mut self, signal: EnvironmentSignal, now: DateTime<Utc>) -> SignalResponse {
        let response = self.monitor.observe(signal, now);
        if let Some(violation) = response.violation {
            tracing::warn!(
                attempt_id = %self.attempt_id,
                sequence = violation.sequence,
                "visibility lost during attempt"
            );
        }
        response
    }

    /// Leave the attempt without submitting. Releases timer and monitor, no scoring.
    pub fn abandon(&mut self) -> Mutation {
        if self.status != AttemptStatus::InProgress {
            return Mutation::Ignored;
        }
        self.status = AttemptStatus::Abandoned;
        self.release();
        tracing::info!(attempt_id = %self.attempt_id, "attempt abandoned");
        Mutation::Applied
    }

    //
    // ─── FINALIZE ──────────────────────────────────────────────────────────────
    //

    fn finalize(&mut self, trigger: SubmitTrigger, now: DateTime<Utc>) -> Finalization {
        if self.status != AttemptStatus::InProgress {
            tracing::debug!(
                attempt_id = %self.attempt_id,
                trigger = trigger.as_str(),
                "finalize ignored, attempt already closed"
            );
            return Finalization::AlreadySubmitted;
        }
        self.status = AttemptStatus::Submitted;
        self.release();

        let completed_at = now.max(self.started_at);
        self.ended_at = Some(completed_at);

        debug_assert!(
            self.question_ids
                .iter()
                .all(|id| self.ledger.selection(*id).is_some()),
            "ledger is missing a presented question"
        );
        let sheet = scoring::score(&self.questions, &self.ledger.snapshot());
        let stamp = AttemptStamp {
            attempt_id: self.attempt_id,
            test_id: self.test_id,
            user_id: self.user.id(),
            started_at: self.started_at,
            completed_at,
            trigger,
        };

        match AttemptResult::from_score(stamp, sheet, self.monitor.violation_count()) {
            Ok(result) => {
                tracing::info!(
                    attempt_id = %self.attempt_id,
                    trigger = trigger.as_str(),
                    correct = result.correct_answers(),
                    total = result.total_questions(),
                    score = result.score(),
                    "attempt finalized"
                );
                self.result = Some(result);
                self.save_state = SaveState::Pending;
            }
            Err(err) => {
                tracing::error!(attempt_id = %self.attempt_id, %err, "could not build result");
            }
        }

        Finalization::Finalized
    }

    /// Stop the countdown, detach the monitor and freeze answers.
    fn release(&mut self) {
        self.timer.cancel();
        self.monitor.detach();
        self.ledger.seal();
    }

    //
    // ─── PERSISTENCE BOOKKEEPING ───────────────────────────────────────────────
    //

    /// Result waiting for the sink, if any.
    pub(crate) fn unsaved_result(&self) -> Option<&AttemptResult> {
        match self.save_state {
            SaveState::Pending | SaveState::Failed { .. } => self.result.as_ref(),
            SaveState::Idle | SaveState::Saved { .. } => None,
        }
    }

    pub(crate) fn mark_saved(&mut self, result_id: i64) {
        self.save_state = SaveState::Saved { result_id };
    }

    pub(crate) fn mark_save_failed(&mut self, reason: String) {
        self.save_state = SaveState::Failed { reason };
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        if self.status == AttemptStatus::InProgress {
            let _ = self.abandon();
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("attempt_id", &self.attempt_id)
            .field("test_id", &self.test_id)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .field("ended_at", &self.ended_at)
            .field("save_state", &self.save_state)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
