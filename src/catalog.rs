use std::{collections::HashMap, fmt, str::FromStr};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::error::QuizError;

const BUILTIN_CATALOG: &str = include_str!("../assets/questions.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Junior,
    Middle,
    Senior,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Junior, Level::Middle, Level::Senior];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Junior => "junior",
            Level::Middle => "middle",
            Level::Senior => "senior",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "junior" => Ok(Level::Junior),
            "middle" => Ok(Level::Middle),
            "senior" => Ok(Level::Senior),
            other => Err(QuizError::InvalidLevel(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Full,
    Quick,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::Quick => "quick",
        }
    }

    /// Requested number of questions, before clamping to the catalog size.
    pub fn question_count(&self) -> usize {
        match self {
            Mode::Full => 20,
            Mode::Quick => 10,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Mode::Full),
            "quick" => Ok(Mode::Quick),
            other => Err(QuizError::InvalidMode(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
    pub explanation: String,
}

impl QuestionRecord {
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct: usize,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct,
            explanation: explanation.into(),
        }
    }

    pub fn correct_option(&self) -> &str {
        &self.options[self.correct]
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.options.len() >= 2 && self.correct < self.options.len()
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Parse(serde_json::Error),
    Malformed { level: Level, index: usize },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Parse(e) => write!(f, "question catalog is not valid JSON: {e}"),
            CatalogError::Malformed { level, index } => write!(
                f,
                "question #{index} of level '{level}' needs at least two options and a correct index inside them"
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Static, per-level question bank. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    levels: HashMap<Level, Vec<QuestionRecord>>,
}

impl Catalog {
    pub fn new(levels: HashMap<Level, Vec<QuestionRecord>>) -> Result<Self, CatalogError> {
        for (level, questions) in &levels {
            if let Some(index) = questions.iter().position(|q| !q.is_well_formed()) {
                return Err(CatalogError::Malformed {
                    level: *level,
                    index,
                });
            }
        }
        Ok(Self { levels })
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let levels = serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        Self::new(levels)
    }

    /// The question bank shipped with the bot.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn questions(&self, level: Level) -> &[QuestionRecord] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self, level: Level) -> usize {
        self.questions(level).len()
    }

    /// Draws `min(count, catalog size)` distinct questions uniformly at random.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        level: Level,
        count: usize,
        rng: &mut R,
    ) -> Vec<&QuestionRecord> {
        self.questions(level).choose_multiple(rng, count).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn record(i: usize) -> QuestionRecord {
        QuestionRecord::new(
            format!("question {i}"),
            vec![format!("right {i}"), format!("wrong {i}")],
            0,
            "because",
        )
    }

    #[test]
    fn builtin_catalog_has_every_level() {
        let catalog = Catalog::builtin().unwrap();
        for level in Level::ALL {
            assert!(catalog.len(level) >= Mode::Full.question_count());
        }
    }

    #[test]
    fn sampling_is_clamped_and_without_repeats() {
        let catalog =
            Catalog::new(HashMap::from([(Level::Middle, (0..7).map(record).collect())])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let drawn = catalog.sample(Level::Middle, Mode::Full.question_count(), &mut rng);
        assert_eq!(drawn.len(), 7);

        let prompts: HashSet<_> = drawn.iter().map(|q| q.prompt.as_str()).collect();
        assert_eq!(prompts.len(), 7);
    }

    #[test]
    fn missing_level_samples_nothing() {
        let catalog = Catalog::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(catalog.sample(Level::Senior, 10, &mut rng).is_empty());
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let mut broken = record(0);
        broken.correct = 2;
        let err = Catalog::new(HashMap::from([(Level::Junior, vec![record(1), broken])]))
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Malformed {
                level: Level::Junior,
                index: 1
            }
        ));
    }

    #[test]
    fn parses_levels_and_modes() {
        assert_eq!("senior".parse::<Level>().unwrap(), Level::Senior);
        assert_eq!("quick".parse::<Mode>().unwrap(), Mode::Quick);
        assert!(matches!(
            "lead".parse::<Level>(),
            Err(QuizError::InvalidLevel(l)) if l == "lead"
        ));
        assert!(matches!("long".parse::<Mode>(), Err(QuizError::InvalidMode(_))));
    }
}
