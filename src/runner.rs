use std::sync::Arc;

use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{EditMessageTextSetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, ChatId, MessageId, ParseMode},
    Bot, RequestError,
};
use tracing::{debug, instrument, warn};

use crate::{
    action::Action,
    database::Store,
    engine::{SessionEngine, Step},
    error::QuizError,
    keyboard::inline_keyboard,
    render::{self, Screen},
    HandlerResult,
};

pub(crate) async fn send_screen(bot: &Bot, chat_id: ChatId, screen: &Screen) -> Result<(), RequestError> {
    let mut request = bot
        .send_message(chat_id, &screen.text)
        .parse_mode(ParseMode::Html);
    if !screen.buttons.is_empty() {
        request = request.reply_markup(inline_keyboard(&screen.buttons));
    }
    request.await?;
    Ok(())
}

pub(crate) async fn edit_screen(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    screen: &Screen,
) -> Result<(), RequestError> {
    let mut request = bot
        .edit_message_text(chat_id, message_id, &screen.text)
        .parse_mode(ParseMode::Html);
    if !screen.buttons.is_empty() {
        request = request.reply_markup(inline_keyboard(&screen.buttons));
    }
    request.await?;
    Ok(())
}

fn step_screen(step: Step) -> Screen {
    match step {
        Step::Question(view) => render::question(&view),
        Step::Finished(completion) => render::results(&completion),
    }
}

/// Applies one button press to the user's quiz and returns what to show.
/// `None` means the press was stale and the message stays as it is.
pub(crate) async fn apply<S: Store>(
    engine: &SessionEngine<S>,
    user_id: i64,
    action: Action,
) -> Option<Screen> {
    let outcome = match action {
        Action::SelectLevel(level) => engine
            .choose_level(user_id, &level)
            .await
            .map(render::mode_menu),
        Action::SelectMode { level, mode } | Action::Retry { level, mode } => engine
            .choose_mode(user_id, &level, &mode)
            .await
            .map(step_screen),
        Action::Answer { question, option } => engine
            .submit_answer(user_id, question, option)
            .await
            .map(|feedback| render::feedback(&feedback)),
        Action::Next => engine.advance(user_id).await.map(step_screen),
        Action::ShowStats => Ok(render::statistics(&engine.stats(user_id).await)),
        Action::ChooseLevel => {
            engine.start_over(user_id).await;
            Ok(render::level_menu())
        }
    };

    match outcome {
        Ok(screen) => Some(screen),
        Err(e @ QuizError::StaleAnswer(_)) => {
            debug!("User {}: {}", user_id, e);
            None
        }
        Err(e) => {
            warn!("User {}: {}", user_id, e);
            Some(render::error(&e))
        }
    }
}

#[instrument(level = "info", skip(bot, q, engine), fields(user = %q.from.id, data = ?q.data))]
pub(crate) async fn handle_callback<S: Store>(
    bot: Bot,
    q: CallbackQuery,
    engine: Arc<SessionEngine<S>>,
) -> HandlerResult {
    bot.answer_callback_query(&q.id).await?;

    let (Some(chat_id), Some(data)) = (q.chat_id(), q.data.as_deref()) else {
        return Ok(());
    };
    let user_id = q.from.id.0 as i64;

    let screen = match data.parse::<Action>() {
        Ok(action) => apply(&engine, user_id, action).await,
        Err(e) => {
            warn!("User {}: {}", user_id, e);
            Some(render::level_menu())
        }
    };
    let Some(screen) = screen else {
        return Ok(());
    };

    match &q.message {
        Some(message) => edit_screen(&bot, chat_id, message.id(), &screen).await?,
        None => send_screen(&bot, chat_id, &screen).await?,
    }

    Ok(())
}
