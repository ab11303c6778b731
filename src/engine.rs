use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::{
    catalog::{Catalog, Level, Mode},
    database::Store,
    error::QuizError,
    session::{AnswerFeedback, Completion, QuestionView, QuizSession},
    state::QuizState,
    stats::Statistics,
};

/// What the user should see after advancing.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Question(QuestionView),
    Finished(Completion),
}

/// Drives every user's quiz state machine.
///
/// Each user gets their own lock, held for the whole transition including the
/// store round-trip, so a single user's actions apply one at a time while
/// different users proceed independently. The in-memory map is only a cache:
/// on a miss the session is rehydrated from the store.
pub struct SessionEngine<S> {
    catalog: Catalog,
    store: S,
    users: Mutex<HashMap<i64, Arc<Mutex<QuizState>>>>,
}

impl<S: Store> SessionEngine<S> {
    pub fn new(catalog: Catalog, store: S) -> Self {
        Self {
            catalog,
            store,
            users: Mutex::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current cached state, without touching the store.
    pub async fn cached_state(&self, user_id: i64) -> QuizState {
        let slot = self.users.lock().await.get(&user_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => QuizState::NoSession,
        }
    }

    async fn slot(&self, user_id: i64) -> Arc<Mutex<QuizState>> {
        let mut users = self.users.lock().await;
        users.entry(user_id).or_default().clone()
    }

    /// Drops the cache entry of an idle user. An entry another call is still
    /// queued on stays; that call releases it when it is done.
    async fn release(&self, user_id: i64, slot: &Arc<Mutex<QuizState>>, state: &QuizState) {
        if *state != QuizState::NoSession {
            return;
        }

        let mut users = self.users.lock().await;
        let idle = users
            .get(&user_id)
            .is_some_and(|cached| Arc::ptr_eq(cached, slot) && Arc::strong_count(slot) <= 2);
        if idle {
            users.remove(&user_id);
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn register_user(&self, user_id: i64, username: Option<&str>, first_name: &str) {
        if let Err(e) = self.store.upsert_user(user_id, username, first_name).await {
            error!("Failed to save user {}: {}", user_id, e);
        }
    }

    /// Drops any session of the user, cached or persisted.
    #[instrument(level = "info", skip(self))]
    pub async fn start_over(&self, user_id: i64) {
        let slot = self.slot(user_id).await;
        let mut state = slot.lock().await;
        *state = QuizState::NoSession;

        self.discard(user_id).await;
        self.release(user_id, &slot, &state).await;
        info!("User {} is back to level selection", user_id);
    }

    /// Picking a level abandons any session in progress, persisted copy included.
    #[instrument(level = "info", skip(self))]
    pub async fn choose_level(&self, user_id: i64, level: &str) -> Result<Level, QuizError> {
        let level: Level = level.parse()?;
        if self.catalog.len(level) == 0 {
            return Err(QuizError::InvalidLevel(level.to_string()));
        }

        let slot = self.slot(user_id).await;
        let mut state = slot.lock().await;
        self.discard(user_id).await;
        *state = QuizState::LevelChosen { level };
        info!("User {} chose level {}", user_id, level);

        Ok(level)
    }

    /// Starts a fresh session, discarding whatever the user had before.
    #[instrument(level = "info", skip(self))]
    pub async fn choose_mode(&self, user_id: i64, level: &str, mode: &str) -> Result<Step, QuizError> {
        let level: Level = level.parse()?;
        let mode: Mode = mode.parse()?;

        let session = QuizSession::start(&self.catalog, level, mode, &mut rand::thread_rng());
        info!(
            "User {} started {} test on {} level, attempt {} with {} questions",
            user_id,
            mode,
            level,
            session.attempt_id(),
            session.total_questions()
        );

        let slot = self.slot(user_id).await;
        let mut state = slot.lock().await;
        self.persist(user_id, &session).await;
        *state = QuizState::Active { session };

        self.step(user_id, &slot, &mut state).await
    }

    /// Scores `selected` against question number `question` (1-based). An
    /// answer to any other question than the current one is `StaleAnswer` and
    /// leaves the session untouched.
    #[instrument(level = "info", skip(self))]
    pub async fn submit_answer(
        &self,
        user_id: i64,
        question: usize,
        selected: usize,
    ) -> Result<AnswerFeedback, QuizError> {
        let slot = self.slot(user_id).await;
        let mut state = slot.lock().await;
        if let Err(e) = self.resolve(user_id, &mut state).await {
            self.release(user_id, &slot, &state).await;
            return Err(e);
        }
        let session = state.session_mut().ok_or(QuizError::SessionExpired)?;

        if question != session.current_index() + 1 {
            return Err(QuizError::StaleAnswer(question));
        }
        let feedback = session.answer(selected)?;
        info!(
            "User {} answered question {}/{}: {}",
            user_id,
            feedback.answered,
            feedback.total,
            if feedback.is_correct { "correct" } else { "wrong" }
        );

        self.persist(user_id, session).await;

        Ok(feedback)
    }

    /// Presents the next question, or records the result once every question
    /// has been answered.
    #[instrument(level = "info", skip(self))]
    pub async fn advance(&self, user_id: i64) -> Result<Step, QuizError> {
        let slot = self.slot(user_id).await;
        let mut state = slot.lock().await;
        if let Err(e) = self.resolve(user_id, &mut state).await {
            self.release(user_id, &slot, &state).await;
            return Err(e);
        }

        self.step(user_id, &slot, &mut state).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn stats(&self, user_id: i64) -> Statistics {
        match self.store.get_results(user_id).await {
            Ok(history) => Statistics::from_history(&history),
            Err(e) => {
                error!("Failed to load results of user {}: {}", user_id, e);
                Statistics::Empty
            }
        }
    }

    async fn step(
        &self,
        user_id: i64,
        slot: &Arc<Mutex<QuizState>>,
        state: &mut QuizState,
    ) -> Result<Step, QuizError> {
        let session = state.session().ok_or(QuizError::SessionExpired)?;

        if let Some(question) = session.current_question() {
            return Ok(Step::Question(question));
        }

        // The stored row goes away together with the result row, so a
        // reloaded session is never finished twice.
        let completion = session.completion();
        if let Err(e) = self.store.finish_session(user_id, &completion).await {
            error!(
                "Failed to save result of attempt {} for user {}: {}",
                completion.attempt_id, user_id, e
            );
        }
        *state = QuizState::NoSession;
        self.release(user_id, slot, state).await;

        info!(
            "User {} completed test: {}/{} ({:.1}%)",
            user_id,
            completion.correct,
            completion.total,
            completion.percentage()
        );

        Ok(Step::Finished(completion))
    }

    /// Makes sure `state` holds a session, rehydrating it from the store on a
    /// cache miss.
    async fn resolve(&self, user_id: i64, state: &mut QuizState) -> Result<(), QuizError> {
        if state.session().is_some() {
            return Ok(());
        }

        match self.store.get_session(user_id).await {
            Ok(Some(session)) => {
                info!("Restored session {} of user {} from storage", session.attempt_id(), user_id);
                *state = QuizState::Active { session };
                Ok(())
            }
            Ok(None) => Err(QuizError::SessionExpired),
            Err(e) => {
                error!("Failed to load session of user {}: {}", user_id, e);
                Err(QuizError::SessionExpired)
            }
        }
    }

    async fn persist(&self, user_id: i64, session: &QuizSession) {
        if let Err(e) = self.store.put_session(user_id, session).await {
            warn!(
                "Failed to persist session {} of user {}: {}",
                session.attempt_id(),
                user_id,
                e
            );
        }
    }

    async fn discard(&self, user_id: i64) {
        if let Err(e) = self.store.delete_session(user_id).await {
            error!("Failed to delete session of user {}: {}", user_id, e);
        }
    }

    #[cfg(test)]
    async fn cached_users(&self) -> usize {
        self.users.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        catalog::QuestionRecord,
        database::{records::ResultHistory, Connection},
        error::StorageError,
    };

    fn catalog() -> Catalog {
        let level = |name: &str, size: usize| -> Vec<QuestionRecord> {
            (0..size)
                .map(|i| {
                    QuestionRecord::new(
                        format!("{name} prompt {i}"),
                        vec!["first".into(), "second".into(), format!("{name} {i}")],
                        2,
                        format!("{name} explanation {i}"),
                    )
                })
                .collect()
        };
        Catalog::new(HashMap::from([
            (Level::Junior, level("junior", 30)),
            (Level::Middle, level("middle", 7)),
        ]))
        .unwrap()
    }

    async fn engine() -> SessionEngine<Connection> {
        SessionEngine::new(catalog(), Connection::in_memory().await.unwrap())
    }

    fn question(step: Step) -> QuestionView {
        match step {
            Step::Question(q) => q,
            other => panic!("expected a question, got {other:?}"),
        }
    }

    fn correct_index(view: &QuestionView) -> usize {
        view.options
            .iter()
            .position(|o| o.contains(' '))
            .unwrap()
    }

    #[tokio::test]
    async fn full_quick_run_records_result() {
        let engine = engine().await;
        engine.choose_level(1, "junior").await.unwrap();
        let mut view = question(engine.choose_mode(1, "junior", "quick").await.unwrap());
        assert_eq!(view.total, 10);

        for i in 0..10 {
            assert_eq!(view.number, i + 1);
            let pick = if i < 7 { correct_index(&view) } else { (correct_index(&view) + 1) % 3 };
            let feedback = engine.submit_answer(1, view.number, pick).await.unwrap();
            assert_eq!(feedback.is_correct, i < 7);

            match engine.advance(1).await.unwrap() {
                Step::Question(next) => view = next,
                Step::Finished(done) => {
                    assert_eq!(i, 9);
                    assert_eq!((done.correct, done.total), (7, 10));
                    assert_eq!(done.percentage(), 70.0);
                }
            }
        }

        assert_eq!(engine.cached_state(1).await, QuizState::NoSession);
        assert!(engine.store().get_session(1).await.unwrap().is_none());

        let history = engine.store().get_results(1).await.unwrap();
        assert_eq!(history.overall.total_tests, 1);
        assert_eq!(history.recent[0].percentage, 70.0);
    }

    #[tokio::test]
    async fn small_level_is_clamped() {
        let engine = engine().await;
        let view = question(engine.choose_mode(2, "middle", "full").await.unwrap());
        assert_eq!(view.total, 7);
    }

    #[tokio::test]
    async fn unknown_level_and_mode_are_rejected() {
        let engine = engine().await;
        assert!(matches!(
            engine.choose_level(1, "staff").await,
            Err(QuizError::InvalidLevel(_))
        ));
        // Known level with an empty catalog partition
        assert!(matches!(
            engine.choose_level(1, "senior").await,
            Err(QuizError::InvalidLevel(_))
        ));
        assert!(matches!(
            engine.choose_mode(1, "junior", "endless").await,
            Err(QuizError::InvalidMode(_))
        ));
        assert_eq!(engine.cached_state(1).await, QuizState::NoSession);
    }

    #[tokio::test]
    async fn empty_level_finishes_immediately_with_zero_percent() {
        let engine = engine().await;
        match engine.choose_mode(3, "senior", "quick").await.unwrap() {
            Step::Finished(done) => {
                assert_eq!(done.total, 0);
                assert_eq!(done.percentage(), 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn answers_without_session_are_expired() {
        let engine = engine().await;
        assert!(matches!(
            engine.submit_answer(4, 1, 0).await,
            Err(QuizError::SessionExpired)
        ));
        assert!(matches!(engine.advance(4).await, Err(QuizError::SessionExpired)));
    }

    #[tokio::test]
    async fn answer_after_last_question_is_rejected() {
        let engine = engine().await;
        engine.choose_mode(5, "middle", "quick").await.unwrap();
        for _ in 0..7 {
            let view = question(engine.advance(5).await.unwrap());
            engine
                .submit_answer(5, view.number, (correct_index(&view) + 1) % 3)
                .await
                .unwrap();
        }

        assert!(matches!(
            engine.submit_answer(5, 8, 0).await,
            Err(QuizError::SessionExpired)
        ));
        let session = engine.store().get_session(5).await.unwrap().unwrap();
        assert_eq!(session.current_index(), 7);
        assert_eq!(session.correct_count(), 0);
    }

    #[tokio::test]
    async fn stale_answer_leaves_session_alone() {
        let engine = engine().await;
        let view = question(engine.choose_mode(12, "junior", "quick").await.unwrap());
        engine
            .submit_answer(12, view.number, correct_index(&view))
            .await
            .unwrap();

        // Same button tapped again before the message was replaced
        assert!(matches!(
            engine.submit_answer(12, view.number, 0).await,
            Err(QuizError::StaleAnswer(1))
        ));
        assert!(matches!(
            engine.submit_answer(12, 5, 0).await,
            Err(QuizError::StaleAnswer(5))
        ));

        let session = engine.store().get_session(12).await.unwrap().unwrap();
        assert_eq!((session.current_index(), session.correct_count()), (1, 1));
    }

    #[tokio::test]
    async fn choosing_level_abandons_running_session() {
        let engine = engine().await;
        let view = question(engine.choose_mode(13, "junior", "quick").await.unwrap());
        engine
            .submit_answer(13, view.number, correct_index(&view))
            .await
            .unwrap();

        engine.choose_level(13, "middle").await.unwrap();

        assert_eq!(
            engine.cached_state(13).await,
            QuizState::LevelChosen { level: Level::Middle }
        );
        assert!(engine.store().get_session(13).await.unwrap().is_none());
        assert!(matches!(engine.advance(13).await, Err(QuizError::SessionExpired)));
    }

    #[tokio::test]
    async fn idle_users_are_not_cached() {
        let engine = engine().await;
        for user_id in 20..25 {
            assert!(engine.advance(user_id).await.is_err());
            assert!(engine.submit_answer(user_id, 1, 0).await.is_err());
        }
        assert_eq!(engine.cached_users().await, 0);

        engine.choose_mode(30, "middle", "quick").await.unwrap();
        assert_eq!(engine.cached_users().await, 1);
        engine.start_over(30).await;
        assert_eq!(engine.cached_users().await, 0);
    }

    #[tokio::test]
    async fn reselecting_mode_discards_previous_session() {
        let engine = engine().await;
        let view = question(engine.choose_mode(6, "junior", "full").await.unwrap());
        engine.submit_answer(6, view.number, correct_index(&view)).await.unwrap();

        let view = question(engine.choose_mode(6, "junior", "quick").await.unwrap());
        assert_eq!((view.number, view.total), (1, 10));

        let session = engine.store().get_session(6).await.unwrap().unwrap();
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.correct_count(), 0);
        assert_eq!(session.total_questions(), 10);
    }

    #[tokio::test]
    async fn start_over_clears_cache_and_store() {
        let engine = engine().await;
        engine.choose_mode(7, "junior", "quick").await.unwrap();

        engine.start_over(7).await;
        engine.start_over(7).await;

        assert_eq!(engine.cached_state(7).await, QuizState::NoSession);
        assert!(engine.store().get_session(7).await.unwrap().is_none());
        assert!(matches!(engine.advance(7).await, Err(QuizError::SessionExpired)));
    }

    #[tokio::test]
    async fn session_survives_cache_loss() {
        let catalog = catalog();
        let first = SessionEngine::new(catalog.clone(), Connection::in_memory().await.unwrap());
        let view = question(first.choose_mode(8, "junior", "quick").await.unwrap());
        first.submit_answer(8, view.number, correct_index(&view)).await.unwrap();

        // A new engine over the same store has an empty cache.
        let restarted = SessionEngine::new(catalog, first.store);
        let view = question(restarted.advance(8).await.unwrap());
        assert_eq!(view.number, 2);
        assert_eq!(
            restarted.cached_state(8).await.session().unwrap().correct_count(),
            1
        );
    }

    #[tokio::test]
    async fn concurrent_users_do_not_interfere() {
        let engine = Arc::new(engine().await);
        engine.choose_mode(10, "junior", "quick").await.unwrap();
        engine.choose_mode(11, "junior", "quick").await.unwrap();

        let run = |user_id: i64, right: bool| {
            let engine = engine.clone();
            tokio::spawn(async move {
                loop {
                    let view = match engine.advance(user_id).await.unwrap() {
                        Step::Question(view) => view,
                        Step::Finished(done) => return done,
                    };
                    let correct = correct_index(&view);
                    let pick = if right { correct } else { (correct + 1) % 3 };
                    engine.submit_answer(user_id, view.number, pick).await.unwrap();
                }
            })
        };

        let (a, b) = tokio::join!(run(10, true), run(11, false));
        assert_eq!(a.unwrap().correct, 10);
        assert_eq!(b.unwrap().correct, 0);
    }

    struct BrokenStore;

    fn broken() -> StorageError {
        StorageError::Snapshot("disk on fire".into())
    }

    impl Store for BrokenStore {
        async fn upsert_user(&self, _: i64, _: Option<&str>, _: &str) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn append_result(&self, _: i64, _: &Completion) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn finish_session(&self, _: i64, _: &Completion) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn put_session(&self, _: i64, _: &QuizSession) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn get_session(&self, _: i64) -> Result<Option<QuizSession>, StorageError> {
            Err(broken())
        }

        async fn delete_session(&self, _: i64) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn get_results(&self, _: i64) -> Result<ResultHistory, StorageError> {
            Err(broken())
        }
    }

    #[tokio::test]
    async fn storage_failures_degrade_instead_of_failing() {
        let engine = SessionEngine::new(catalog(), BrokenStore);
        engine.register_user(1, None, "Ann").await;

        // Writes fail, the cached session keeps the quiz going.
        let view = question(engine.choose_mode(1, "middle", "quick").await.unwrap());
        let feedback = engine.submit_answer(1, view.number, correct_index(&view)).await.unwrap();
        assert!(feedback.is_correct);
        assert!(matches!(engine.advance(1).await, Ok(Step::Question(_))));

        // Reads fail: no cached session means an expired one.
        engine.start_over(1).await;
        assert!(matches!(engine.advance(1).await, Err(QuizError::SessionExpired)));
        assert_eq!(engine.stats(1).await, Statistics::Empty);
    }

    /// Real storage, except that plain deletes always fail.
    struct UndeletableSessions(Connection);

    impl Store for UndeletableSessions {
        async fn upsert_user(
            &self,
            user_id: i64,
            username: Option<&str>,
            first_name: &str,
        ) -> Result<(), StorageError> {
            self.0.upsert_user(user_id, username, first_name).await
        }

        async fn append_result(&self, user_id: i64, completion: &Completion) -> Result<(), StorageError> {
            self.0.append_result(user_id, completion).await
        }

        async fn finish_session(&self, user_id: i64, completion: &Completion) -> Result<(), StorageError> {
            self.0.finish_session(user_id, completion).await
        }

        async fn put_session(&self, user_id: i64, session: &QuizSession) -> Result<(), StorageError> {
            self.0.put_session(user_id, session).await
        }

        async fn get_session(&self, user_id: i64) -> Result<Option<QuizSession>, StorageError> {
            self.0.get_session(user_id).await
        }

        async fn delete_session(&self, _: i64) -> Result<(), StorageError> {
            Err(broken())
        }

        async fn get_results(&self, user_id: i64) -> Result<ResultHistory, StorageError> {
            self.0.get_results(user_id).await
        }
    }

    #[tokio::test]
    async fn finished_quiz_is_recorded_once() {
        let store = UndeletableSessions(Connection::in_memory().await.unwrap());
        let engine = SessionEngine::new(catalog(), store);

        let mut step = engine.choose_mode(1, "middle", "quick").await.unwrap();
        while let Step::Question(view) = step {
            engine
                .submit_answer(1, view.number, correct_index(&view))
                .await
                .unwrap();
            step = engine.advance(1).await.unwrap();
        }
        assert!(matches!(step, Step::Finished(done) if done.correct == 7));

        for _ in 0..2 {
            assert!(matches!(engine.advance(1).await, Err(QuizError::SessionExpired)));
        }
        let history = engine.store().get_results(1).await.unwrap();
        assert_eq!(history.overall.total_tests, 1);
    }
}
