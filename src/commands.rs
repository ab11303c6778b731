use std::sync::Arc;

use teloxide::{
    prelude::Requester,
    types::{Message, User},
    utils::command::BotCommands,
    Bot,
};
use tracing::{info, instrument};

use crate::{
    database::Store, engine::SessionEngine, render, runner::send_screen, HandlerResult,
};

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "начать заново и выбрать уровень.")]
    Start,
    #[command(description = "показать статистику.")]
    Stats,
    #[command(description = "сбросить текущий тест.")]
    Reset,
    #[command(description = "показать это сообщение.")]
    Help,
}

fn display_name(user: &User) -> &str {
    if user.first_name.trim().is_empty() {
        "друг"
    } else {
        &user.first_name
    }
}

pub(crate) async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn start<S: Store>(
    bot: Bot,
    msg: Message,
    engine: Arc<SessionEngine<S>>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    engine
        .register_user(user_id, user.username.as_deref(), &user.first_name)
        .await;
    engine.start_over(user_id).await;

    send_screen(&bot, msg.chat.id, &render::welcome(display_name(user), engine.catalog())).await?;
    info!("User {} ({}) started the bot", user_id, display_name(user));

    Ok(())
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn stats<S: Store>(
    bot: Bot,
    msg: Message,
    engine: Arc<SessionEngine<S>>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    let stats = engine.stats(user_id).await;
    send_screen(&bot, msg.chat.id, &render::statistics(&stats)).await?;
    info!("User {} requested stats", user_id);

    Ok(())
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn reset<S: Store>(
    bot: Bot,
    msg: Message,
    engine: Arc<SessionEngine<S>>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    engine.start_over(user_id).await;
    send_screen(&bot, msg.chat.id, &render::reset_done()).await?;
    info!("User {} reset their test", user_id);

    Ok(())
}
