use chrono::NaiveDateTime;
use tracing::warn;

use crate::{
    catalog::{Level, Mode},
    database::records::ResultHistory,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    pub level: Level,
    pub attempts: i64,
    pub average: f64,
    pub best: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentTest {
    pub level: Level,
    pub mode: Mode,
    pub percentage: f64,
    pub completed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub tests_taken: i64,
    pub average: f64,
    pub best: f64,
    pub total_correct: i64,
    pub total_questions: i64,
    /// In junior, middle, senior order; levels never attempted are absent.
    pub per_level: Vec<LevelStats>,
    /// Newest first.
    pub recent: Vec<RecentTest>,
}

/// Display-ready view of a user's history.
#[derive(Debug, Clone, PartialEq)]
pub enum Statistics {
    // No finished tests yet
    Empty,
    Summary(Summary),
}

impl Statistics {
    pub fn from_history(history: &ResultHistory) -> Self {
        let overall = &history.overall;
        if overall.total_tests == 0 {
            return Statistics::Empty;
        }

        let mut per_level: Vec<LevelStats> = history
            .per_level
            .iter()
            .filter_map(|row| match row.level.parse::<Level>() {
                Ok(level) => Some(LevelStats {
                    level,
                    attempts: row.attempts,
                    average: row.avg_percentage,
                    best: row.best_percentage,
                }),
                Err(e) => {
                    warn!("Skipping stored results: {}", e);
                    None
                }
            })
            .collect();
        per_level.sort_by_key(|stats| Level::ALL.iter().position(|l| *l == stats.level));

        let recent = history
            .recent
            .iter()
            .filter_map(|row| {
                let level = row.level.parse().ok()?;
                let mode = row.mode.parse().ok()?;
                Some(RecentTest {
                    level,
                    mode,
                    percentage: row.percentage,
                    completed_at: row.completed_at,
                })
            })
            .collect();

        Statistics::Summary(Summary {
            tests_taken: overall.total_tests,
            average: overall.avg_percentage.unwrap_or_default(),
            best: overall.best_percentage.unwrap_or_default(),
            total_correct: overall.total_correct.unwrap_or_default(),
            total_questions: overall.total_questions.unwrap_or_default(),
            per_level,
            recent,
        })
    }
}
