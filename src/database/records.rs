use chrono::NaiveDateTime;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    catalog::{Level, Mode, QuestionRecord},
    error::StorageError,
    session::QuizSession,
};

/// Aggregates over every result of one user. `total_tests` is zero and the
/// other columns are `None` when the user has not finished any test.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct OverallSummary {
    pub total_tests: i64,
    pub avg_percentage: Option<f64>,
    pub best_percentage: Option<f64>,
    pub total_correct: Option<i64>,
    pub total_questions: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LevelSummary {
    pub level: String,
    pub attempts: i64,
    pub avg_percentage: f64,
    pub best_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RecentResult {
    pub level: String,
    pub mode: String,
    pub percentage: f64,
    pub completed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHistory {
    pub overall: OverallSummary,
    pub per_level: Vec<LevelSummary>,
    pub recent: Vec<RecentResult>,
}

#[derive(Debug, FromRow)]
pub(crate) struct SessionRow {
    pub(crate) attempt_id: Uuid,
    pub(crate) level: String,
    pub(crate) mode: String,
    pub(crate) questions_json: String,
    pub(crate) current_question: i64,
    pub(crate) correct_answers: i64,
}

impl TryFrom<SessionRow> for QuizSession {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let level: Level = row
            .level
            .parse()
            .map_err(|e| StorageError::Snapshot(format!("{e}")))?;
        let mode: Mode = row
            .mode
            .parse()
            .map_err(|e| StorageError::Snapshot(format!("{e}")))?;
        let questions: Vec<QuestionRecord> = serde_json::from_str(&row.questions_json)?;
        let current_index = usize::try_from(row.current_question)
            .map_err(|_| StorageError::Snapshot("negative cursor".into()))?;
        let correct_count = usize::try_from(row.correct_answers)
            .map_err(|_| StorageError::Snapshot("negative score".into()))?;

        QuizSession::restore(
            row.attempt_id,
            level,
            mode,
            questions,
            current_index,
            correct_count,
        )
    }
}
