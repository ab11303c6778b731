//! Outbound screens: a text plus rows of buttons, independent of the chat
//! transport. `keyboard` turns the buttons into Telegram markup.

use teloxide::utils::html::escape;

use crate::{
    action::Action,
    catalog::{Catalog, Level, Mode},
    error::QuizError,
    session::{AnswerFeedback, Completion, Grade, QuestionView},
    stats::Statistics,
};

const WRAP_WIDTH: usize = 35;
const PROGRESS_CELLS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Screen {
    fn new(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

fn level_emoji(level: Level) -> &'static str {
    match level {
        Level::Junior => "🌱",
        Level::Middle => "🚀",
        Level::Senior => "👑",
    }
}

fn level_title(level: Level) -> &'static str {
    match level {
        Level::Junior => "Junior QA",
        Level::Middle => "Middle QA",
        Level::Senior => "Senior QA",
    }
}

fn mode_emoji(mode: Mode) -> &'static str {
    match mode {
        Mode::Full => "📝",
        Mode::Quick => "⚡️",
    }
}

fn mode_title(mode: Mode) -> String {
    match mode {
        Mode::Full => format!("Полный тест ({} вопросов)", mode.question_count()),
        Mode::Quick => format!("Быстрый тест ({} вопросов)", mode.question_count()),
    }
}

/// `[███░░░░░░░] 3/10`
pub fn progress_bar(current: usize, total: usize, cells: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (cells * current / total).min(cells)
    };
    format!(
        "[{}{}] {}/{}",
        "█".repeat(filled),
        "░".repeat(cells - filled),
        current,
        total
    )
}

/// Greedy word wrap; words longer than `width` keep a line of their own.
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let fits = line.chars().count() + word.chars().count() + 1 <= width;
        if !line.is_empty() && !fits {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

fn level_rows(with_stats: bool) -> Vec<Vec<Button>> {
    let mut rows: Vec<Vec<Button>> = Level::ALL
        .iter()
        .map(|level| {
            vec![Button::new(
                format!("{} {}", level_title(*level), level_emoji(*level)),
                Action::select_level(*level),
            )]
        })
        .collect();
    if with_stats {
        rows.push(vec![Button::new("📊 Моя статистика", Action::ShowStats)]);
    }
    rows
}

pub fn welcome(first_name: &str, catalog: &Catalog) -> Screen {
    let levels: String = Level::ALL
        .iter()
        .map(|level| {
            let topic = match level {
                Level::Junior => "основы тестирования, базовая терминология",
                Level::Middle => "API, автоматизация, CI/CD, безопасность",
                Level::Senior => "TDD/BDD, метрики, архитектурные подходы",
            };
            format!(
                "{} <b>{}</b> — {} ({} вопросов)\n",
                level_emoji(*level),
                level.as_str().to_uppercase(),
                topic,
                catalog.len(*level)
            )
        })
        .collect();

    let text = format!(
        "👋 Привет, {}!\n\n\
         Я помогу подготовиться к собеседованию на позицию QA Engineer.\n\n\
         📚 <b>Уровни тестирования:</b>\n{}\n\
         🎮 <b>Режимы:</b>\n\
         • {}\n\
         • {}\n\n\
         💡 <b>Команды:</b>\n\
         /start — начать заново\n\
         /stats — статистика\n\
         /reset — сбросить текущий тест\n\n\
         ⚡️ <b>Выбери уровень и начинай!</b>",
        escape(first_name),
        levels,
        mode_title(Mode::Full),
        mode_title(Mode::Quick)
    );

    Screen::new(text, level_rows(true))
}

pub fn level_menu() -> Screen {
    Screen::new("🎯 Выбери уровень для прохождения теста:", level_rows(true))
}

pub fn reset_done() -> Screen {
    Screen::new(
        "🔄 Текущий тест сброшен!\n\nВыбери уровень для нового теста:",
        level_rows(false),
    )
}

pub fn mode_menu(level: Level) -> Screen {
    let text = format!(
        "{} <b>{}</b>\n\nВыбери режим тестирования:\n\n\
         📝 <b>Полный тест</b> — {} случайных вопросов\n\
         ⚡️ <b>Быстрый тест</b> — {} случайных вопросов",
        level_emoji(level),
        level_title(level),
        Mode::Full.question_count(),
        Mode::Quick.question_count()
    );
    let buttons = [Mode::Full, Mode::Quick]
        .into_iter()
        .map(|mode| {
            vec![Button::new(
                format!("{} {}", mode_emoji(mode), mode_title(mode)),
                Action::select_mode(level, mode),
            )]
        })
        .chain(std::iter::once(vec![Button::new("◀️ Назад", Action::ChooseLevel)]))
        .collect();

    Screen::new(text, buttons)
}

pub fn question(view: &QuestionView) -> Screen {
    let text = format!(
        "{} {} Вопрос {}/{}\n\n{}\n\n❓ <b>{}</b>",
        level_emoji(view.level),
        mode_emoji(view.mode),
        view.number,
        view.total,
        progress_bar(view.number - 1, view.total, PROGRESS_CELLS),
        escape(&wrap_text(&view.prompt, WRAP_WIDTH))
    );
    let buttons = view
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| vec![Button::new(option.as_str(), Action::answer(view.number, index))])
        .collect();

    Screen::new(text, buttons)
}

pub fn feedback(feedback: &AnswerFeedback) -> Screen {
    let explanation = escape(&wrap_text(&feedback.explanation, WRAP_WIDTH));
    let text = if feedback.is_correct {
        format!("✅ <b>Правильно!</b>\n\n💡 {explanation}")
    } else {
        format!(
            "❌ <b>Неправильно!</b>\n\n<b>Правильный ответ:</b>\n{}\n\n💡 {}",
            escape(&wrap_text(&feedback.correct_option, WRAP_WIDTH)),
            explanation
        )
    };
    let label = if feedback.answered < feedback.total {
        "Следующий вопрос ➡️"
    } else {
        "Результаты 🎓"
    };

    Screen::new(text, vec![vec![Button::new(label, Action::Next)]])
}

fn grade_text(grade: Grade) -> (&'static str, &'static str) {
    match grade {
        Grade::Excellent => ("Отлично! 🌟", "Ты отлично подготовлен к собеседованию!"),
        Grade::Good => ("Хорошо! 👍", "Неплохой результат, но есть куда расти."),
        Grade::Fair => (
            "Удовлетворительно 📚",
            "Стоит подтянуть знания по некоторым темам.",
        ),
        Grade::NeedsPractice => (
            "Нужно больше практики 💪",
            "Рекомендую повторить материал и попробовать ещё раз.",
        ),
    }
}

pub fn results(completion: &Completion) -> Screen {
    let (grade, comment) = grade_text(completion.grade());
    let text = format!(
        "🎓 <b>Результаты теста</b>\n{}\n\n\
         Уровень: {} Engineer {}\n\
         Режим: {}\n\
         Правильных ответов: {}/{}\n\
         Процент: {:.1}%\n\n\
         <b>{}</b>\n{}",
        "=".repeat(30),
        level_title(completion.level),
        level_emoji(completion.level),
        mode_title(completion.mode),
        completion.correct,
        completion.total,
        completion.percentage(),
        grade,
        comment
    );
    let buttons = vec![
        vec![Button::new(
            "Пройти тест заново 🔄",
            Action::retry(completion.level, completion.mode),
        )],
        vec![Button::new("Выбрать другой уровень 🎯", Action::ChooseLevel)],
        vec![Button::new("Моя статистика 📊", Action::ShowStats)],
    ];

    Screen::new(text, buttons)
}

pub fn statistics(stats: &Statistics) -> Screen {
    let summary = match stats {
        Statistics::Empty => {
            return Screen::new(
                "📊 <b>Статистика</b>\n\n\
                 У вас пока нет завершённых тестов.\n\
                 Пройдите первый тест, чтобы увидеть статистику!",
                vec![vec![Button::new("Начать тест 🚀", Action::ChooseLevel)]],
            );
        }
        Statistics::Summary(summary) => summary,
    };

    let mut text = format!(
        "📊 <b>Ваша статистика</b>\n{}\n\n\
         <b>Общая статистика:</b>\n\
         Пройдено тестов: {}\n\
         Средний результат: {:.1}%\n\
         Лучший результат: {:.1}%\n\
         Правильных ответов: {}/{}\n",
        "=".repeat(30),
        summary.tests_taken,
        summary.average,
        summary.best,
        summary.total_correct,
        summary.total_questions
    );

    if !summary.per_level.is_empty() {
        text.push_str("\n<b>По уровням:</b>\n");
        for level in &summary.per_level {
            text.push_str(&format!(
                "\n{} {}:\n  • Попыток: {}\n  • Средний: {:.1}%\n  • Лучший: {:.1}%\n",
                level_title(level.level),
                level_emoji(level.level),
                level.attempts,
                level.average,
                level.best
            ));
        }
    }

    if !summary.recent.is_empty() {
        text.push_str("\n<b>Последние тесты:</b>\n");
        for (i, test) in summary.recent.iter().take(3).enumerate() {
            text.push_str(&format!(
                "{}. {} {} - {:.0}% ({})\n",
                i + 1,
                mode_emoji(test.mode),
                test.level,
                test.percentage,
                test.completed_at.format("%d.%m.%Y")
            ));
        }
    }

    Screen::new(
        text,
        vec![vec![Button::new("Пройти новый тест 🚀", Action::ChooseLevel)]],
    )
}

pub fn error(err: &QuizError) -> Screen {
    let buttons = match err {
        QuizError::InvalidLevel(_) | QuizError::InvalidMode(_) => level_rows(true),
        _ => Vec::new(),
    };
    Screen::new(err.user_message(), buttons)
}
