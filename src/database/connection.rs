use std::{future::Future, str::FromStr};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::records::{LevelSummary, OverallSummary, RecentResult, ResultHistory, SessionRow};
use crate::{
    error::StorageError,
    session::{Completion, QuizSession},
};

const RECENT_RESULTS: i64 = 5;

/// Durable mirror of users, results and in-flight sessions, keyed by user id.
pub trait Store: Send + Sync + 'static {
    /// Inserts the user if absent; an existing record is left as is.
    fn upsert_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Records a result. A second call for the same attempt is a no-op.
    fn append_result(
        &self,
        user_id: i64,
        completion: &Completion,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Records the result and drops the session as one unit: either both
    /// happen or neither does.
    fn finish_session(
        &self,
        user_id: i64,
        completion: &Completion,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Replaces whatever session the user had.
    fn put_session(
        &self,
        user_id: i64,
        session: &QuizSession,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_session(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<QuizSession>, StorageError>> + Send;

    fn delete_session(&self, user_id: i64) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_results(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<ResultHistory, StorageError>> + Send;
}

pub struct Connection {
    pool: SqlitePool,
}

impl Connection {
    pub async fn connect(connection_string: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(connection_string)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let connection = Self { pool };
        connection.migrate().await?;
        info!("Database ready at {}", connection_string);
        Ok(connection)
    }

    /// Single-connection in-memory database; every pooled connection to
    /// `:memory:` would otherwise see its own empty schema.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let connection = Self { pool };
        connection.migrate().await?;
        Ok(connection)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("Running migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

impl Store for Connection {
    async fn upsert_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: &str,
    ) -> Result<(), StorageError> {
        // Rows created as placeholders by `append_result` get their name filled once.
        sqlx::query(
            "INSERT INTO users (user_id, username, first_name) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, first_name = excluded.first_name
             WHERE users.first_name = ''",
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_result(&self, user_id: i64, completion: &Completion) -> Result<(), StorageError> {
        debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        insert_result(&mut *tx, user_id, completion).await?;

        debug!("Closing transaction");
        tx.commit().await?;

        Ok(())
    }

    async fn finish_session(&self, user_id: i64, completion: &Completion) -> Result<(), StorageError> {
        debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        insert_result(&mut *tx, user_id, completion).await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        debug!("Closing transaction");
        tx.commit().await?;

        Ok(())
    }

    async fn put_session(&self, user_id: i64, session: &QuizSession) -> Result<(), StorageError> {
        let questions_json = serde_json::to_string(session.questions())?;

        sqlx::query(
            "INSERT INTO sessions
             (user_id, attempt_id, level, mode, questions_json, current_question, correct_answers, total_questions)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                started_at = CASE WHEN sessions.attempt_id = excluded.attempt_id
                    THEN sessions.started_at ELSE CURRENT_TIMESTAMP END,
                attempt_id = excluded.attempt_id,
                level = excluded.level,
                mode = excluded.mode,
                questions_json = excluded.questions_json,
                current_question = excluded.current_question,
                correct_answers = excluded.correct_answers,
                total_questions = excluded.total_questions",
        )
        .bind(user_id)
        .bind(session.attempt_id())
        .bind(session.level().as_str())
        .bind(session.mode().as_str())
        .bind(questions_json)
        .bind(session.current_index() as i64)
        .bind(session.correct_count() as i64)
        .bind(session.total_questions() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, user_id: i64) -> Result<Option<QuizSession>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT attempt_id, level, mode, questions_json, current_question, correct_answers
             FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QuizSession::try_from).transpose()
    }

    async fn delete_session(&self, user_id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_results(&self, user_id: i64) -> Result<ResultHistory, StorageError> {
        let mut tx = self.pool.begin().await?;

        let overall = sqlx::query_as::<_, OverallSummary>(
            "SELECT
                COUNT(*) AS total_tests,
                AVG(percentage) AS avg_percentage,
                MAX(percentage) AS best_percentage,
                SUM(correct_answers) AS total_correct,
                SUM(total_questions) AS total_questions
             FROM test_results WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let per_level = sqlx::query_as::<_, LevelSummary>(
            "SELECT
                level,
                COUNT(*) AS attempts,
                AVG(percentage) AS avg_percentage,
                MAX(percentage) AS best_percentage
             FROM test_results WHERE user_id = ?
             GROUP BY level",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let recent = sqlx::query_as::<_, RecentResult>(
            "SELECT level, mode, percentage, completed_at
             FROM test_results WHERE user_id = ?
             ORDER BY completed_at DESC, id DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(RECENT_RESULTS)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ResultHistory {
            overall,
            per_level,
            recent,
        })
    }
}

async fn insert_result(
    conn: &mut SqliteConnection,
    user_id: i64,
    completion: &Completion,
) -> Result<(), StorageError> {
    sqlx::query("INSERT OR IGNORE INTO users (user_id, first_name) VALUES (?, '')")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO test_results
         (user_id, attempt_id, level, mode, correct_answers, total_questions, percentage)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(attempt_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(completion.attempt_id)
    .bind(completion.level.as_str())
    .bind(completion.mode.as_str())
    .bind(completion.correct as i64)
    .bind(completion.total as i64)
    .bind(completion.percentage())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
