use std::{fmt, str::FromStr};

use crate::catalog::{Level, Mode};

/// Decoded callback data of an inline button.
///
/// Levels and modes are kept as raw strings so that an unknown value surfaces
/// as `InvalidLevel`/`InvalidMode` from the engine instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SelectLevel(String),
    SelectMode { level: String, mode: String },
    // 1-based question number and option index
    Answer { question: usize, option: usize },
    Next,
    ShowStats,
    ChooseLevel,
    Retry { level: String, mode: String },
}

impl Action {
    pub fn select_level(level: Level) -> Self {
        Action::SelectLevel(level.as_str().to_owned())
    }

    pub fn select_mode(level: Level, mode: Mode) -> Self {
        Action::SelectMode {
            level: level.as_str().to_owned(),
            mode: mode.as_str().to_owned(),
        }
    }

    pub fn answer(question: usize, option: usize) -> Self {
        Action::Answer { question, option }
    }

    pub fn retry(level: Level, mode: Mode) -> Self {
        Action::Retry {
            level: level.as_str().to_owned(),
            mode: mode.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown callback data '{}'", self.0)
    }
}

impl std::error::Error for UnknownAction {}

fn level_and_mode(rest: &str) -> Option<(String, String)> {
    let (level, mode) = rest.split_once('_')?;
    Some((level.to_owned(), mode.to_owned()))
}

fn question_and_option(rest: &str) -> Option<Action> {
    let (question, option) = rest.split_once('_')?;
    Some(Action::answer(question.parse().ok()?, option.parse().ok()?))
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(data.to_owned());

        match data {
            "next_question" => return Ok(Action::Next),
            "show_stats" => return Ok(Action::ShowStats),
            "choose_level" => return Ok(Action::ChooseLevel),
            _ => {}
        }

        if let Some(level) = data.strip_prefix("select_") {
            Ok(Action::SelectLevel(level.to_owned()))
        } else if let Some(rest) = data.strip_prefix("mode_") {
            let (level, mode) = level_and_mode(rest).ok_or_else(unknown)?;
            Ok(Action::SelectMode { level, mode })
        } else if let Some(rest) = data.strip_prefix("retry_") {
            let (level, mode) = level_and_mode(rest).ok_or_else(unknown)?;
            Ok(Action::Retry { level, mode })
        } else if let Some(rest) = data.strip_prefix("answer_") {
            question_and_option(rest).ok_or_else(unknown)
        } else {
            Err(unknown())
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SelectLevel(level) => write!(f, "select_{level}"),
            Action::SelectMode { level, mode } => write!(f, "mode_{level}_{mode}"),
            Action::Answer { question, option } => write!(f, "answer_{question}_{option}"),
            Action::Next => f.write_str("next_question"),
            Action::ShowStats => f.write_str("show_stats"),
            Action::ChooseLevel => f.write_str("choose_level"),
            Action::Retry { level, mode } => write!(f, "retry_{level}_{mode}"),
        }
    }
}
