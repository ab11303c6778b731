use std::fmt;

/// Failures of the quiz core. Every variant is recoverable inside a single
/// conversation turn.
#[derive(Debug)]
pub enum QuizError {
    InvalidLevel(String),
    InvalidMode(String),
    InvalidAnswer(usize),
    // A tap on a question that is no longer the current one
    StaleAnswer(usize),
    // Neither the cache nor the store has a session for this user
    SessionExpired,
    Storage(StorageError),
}

impl QuizError {
    /// Short apology plus what to do next, safe to show to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            QuizError::InvalidLevel(_) | QuizError::InvalidMode(_) => {
                "❌ Не удалось распознать выбор. Выберите уровень ещё раз."
            }
            QuizError::InvalidAnswer(_) => "❌ Такого варианта ответа нет. Выберите вариант из списка.",
            QuizError::StaleAnswer(_) => "⏳ На этот вопрос уже дан ответ.",
            QuizError::SessionExpired => "❌ Сессия истекла. Начните заново: /start",
            QuizError::Storage(_) => "❌ Произошла ошибка. Используйте /reset, чтобы начать заново.",
        }
    }
}

impl fmt::Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizError::InvalidLevel(level) => write!(f, "unknown level '{level}'"),
            QuizError::InvalidMode(mode) => write!(f, "unknown mode '{mode}'"),
            QuizError::InvalidAnswer(index) => write!(f, "answer #{index} is out of range"),
            QuizError::StaleAnswer(question) => write!(f, "question #{question} was already answered"),
            QuizError::SessionExpired => write!(f, "no active session"),
            QuizError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for QuizError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QuizError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for QuizError {
    fn from(err: StorageError) -> Self {
        QuizError::Storage(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    Database(sqlx::Error),
    Migration(sqlx::migrate::MigrateError),
    // A persisted session whose columns do not decode into a snapshot
    Snapshot(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "database error: {e}"),
            StorageError::Migration(e) => write!(f, "migration error: {e}"),
            StorageError::Snapshot(msg) => write!(f, "corrupt session snapshot: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Database(e) => Some(e),
            StorageError::Migration(e) => Some(e),
            StorageError::Snapshot(_) => None,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err)
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Snapshot(err.to_string())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::Invalid { key, reason } => write!(f, "{key} is invalid: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_snapshot_is_reported_as_corrupt() {
        let err: StorageError = serde_json::from_str::<Vec<String>>("[1,").unwrap_err().into();
        assert!(matches!(err, StorageError::Snapshot(_)));
        assert!(err.to_string().starts_with("corrupt session snapshot: "));

        let quiz: QuizError = err.into();
        assert!(matches!(quiz, QuizError::Storage(StorageError::Snapshot(_))));
    }
}
