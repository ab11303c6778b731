use teloxide::{
    dispatching::{UpdateFilterExt, UpdateHandler},
    prelude::*,
};
use tracing::{debug, instrument};

use crate::{
    commands::{self, Command},
    database::Connection,
    runner, HandlerResult,
};

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;
    debug!("Building dispatch tree");

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Start].endpoint(commands::start::<Connection>))
        .branch(case![Command::Stats].endpoint(commands::stats::<Connection>))
        .branch(case![Command::Reset].endpoint(commands::reset::<Connection>));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .endpoint(invalid_input);

    let callback_handler =
        Update::filter_callback_query().endpoint(runner::handle_callback::<Connection>);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}

#[instrument(level = "info", skip(bot, msg), fields(chat = %msg.chat.id))]
async fn invalid_input(bot: Bot, msg: Message) -> HandlerResult {
    debug!("Unhandled message {:?}", msg.text());
    bot.send_message(
        msg.chat.id,
        "Не понимаю это сообщение. Используйте кнопки или /help.",
    )
    .await?;
    Ok(())
}
