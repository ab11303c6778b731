use crate::{catalog::Level, session::QuizSession};

/// Where one user stands in the quiz conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QuizState {
    #[default]
    NoSession,
    // Level picked, not durable until a mode is picked too
    LevelChosen {
        level: Level,
    },
    Active {
        session: QuizSession,
    },
}

impl QuizState {
    pub fn session(&self) -> Option<&QuizSession> {
        match self {
            QuizState::Active { session } => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut QuizSession> {
        match self {
            QuizState::Active { session } => Some(session),
            _ => None,
        }
    }
}
