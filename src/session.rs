use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    catalog::{Catalog, Level, Mode, QuestionRecord},
    error::{QuizError, StorageError},
};

/// Shuffles the options of `question` and returns them with the index at
/// which the originally correct option ended up.
pub fn reshuffle<R: Rng + ?Sized>(question: &QuestionRecord, rng: &mut R) -> (Vec<String>, usize) {
    let mut tagged: Vec<(usize, &String)> = question.options.iter().enumerate().collect();
    tagged.shuffle(rng);

    let correct = tagged
        .iter()
        .position(|(original, _)| *original == question.correct)
        .unwrap_or_default();
    let options = tagged.into_iter().map(|(_, text)| text.clone()).collect();

    (options, correct)
}

/// `correct / total * 100`, with an empty test scoring zero.
pub fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    NeedsPractice,
}

impl Grade {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Grade::Excellent
        } else if percentage >= 70.0 {
            Grade::Good
        } else if percentage >= 50.0 {
            Grade::Fair
        } else {
            Grade::NeedsPractice
        }
    }
}

/// What the user learns right after answering.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFeedback {
    pub is_correct: bool,
    pub correct_option: String,
    pub explanation: String,
    pub answered: usize,
    pub total: usize,
}

/// Aggregate of a finished session, the payload of a test result.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub attempt_id: Uuid,
    pub level: Level,
    pub mode: Mode,
    pub correct: usize,
    pub total: usize,
}

impl Completion {
    pub fn percentage(&self) -> f64 {
        percentage(self.correct, self.total)
    }

    pub fn grade(&self) -> Grade {
        Grade::from_percentage(self.percentage())
    }
}

/// Read-only view of the question a user has to answer next.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub level: Level,
    pub mode: Mode,
    pub number: usize,
    pub total: usize,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    attempt_id: Uuid,
    level: Level,
    mode: Mode,
    questions: Vec<QuestionRecord>,
    current_index: usize,
    correct_count: usize,
    total_questions: usize,
}

impl QuizSession {
    pub fn start<R: Rng + ?Sized>(catalog: &Catalog, level: Level, mode: Mode, rng: &mut R) -> Self {
        let sampled = catalog.sample(level, mode.question_count(), rng);
        let questions: Vec<QuestionRecord> = sampled
            .into_iter()
            .map(|question| {
                let (options, correct) = reshuffle(question, rng);
                QuestionRecord {
                    prompt: question.prompt.clone(),
                    options,
                    correct,
                    explanation: question.explanation.clone(),
                }
            })
            .collect();

        Self {
            attempt_id: Uuid::new_v4(),
            level,
            mode,
            total_questions: questions.len(),
            questions,
            current_index: 0,
            correct_count: 0,
        }
    }

    /// Rebuilds a session from its persisted columns, rejecting rows that
    /// break the cursor/score invariants.
    pub fn restore(
        attempt_id: Uuid,
        level: Level,
        mode: Mode,
        questions: Vec<QuestionRecord>,
        current_index: usize,
        correct_count: usize,
    ) -> Result<Self, StorageError> {
        if let Some(index) = questions.iter().position(|q| !q.is_well_formed()) {
            return Err(StorageError::Snapshot(format!("question #{index} is malformed")));
        }

        let total_questions = questions.len();
        if current_index > total_questions || correct_count > current_index {
            return Err(StorageError::Snapshot(format!(
                "cursor {current_index}, score {correct_count}, {total_questions} questions"
            )));
        }

        Ok(Self {
            attempt_id,
            level,
            mode,
            questions,
            current_index,
            correct_count,
            total_questions,
        })
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    pub fn is_complete(&self) -> bool {
        self.current_index == self.total_questions
    }

    pub fn current_question(&self) -> Option<QuestionView> {
        self.questions.get(self.current_index).map(|q| QuestionView {
            level: self.level,
            mode: self.mode,
            number: self.current_index + 1,
            total: self.total_questions,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        })
    }

    /// Scores `selected` against the current question and moves the cursor.
    pub fn answer(&mut self, selected: usize) -> Result<AnswerFeedback, QuizError> {
        let question = self
            .questions
            .get(self.current_index)
            .ok_or(QuizError::SessionExpired)?;
        if selected >= question.options.len() {
            return Err(QuizError::InvalidAnswer(selected));
        }

        let is_correct = selected == question.correct;
        let feedback = AnswerFeedback {
            is_correct,
            correct_option: question.correct_option().to_owned(),
            explanation: question.explanation.clone(),
            answered: self.current_index + 1,
            total: self.total_questions,
        };

        if is_correct {
            self.correct_count += 1;
        }
        self.current_index += 1;

        Ok(feedback)
    }

    pub fn completion(&self) -> Completion {
        Completion {
            attempt_id: self.attempt_id,
            level: self.level,
            mode: self.mode,
            correct: self.correct_count,
            total: self.total_questions,
        }
    }
}
