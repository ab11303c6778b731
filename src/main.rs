use std::sync::Arc;

use qabot::{
    catalog::Catalog, config::Config, database::Connection, schema::schema, telemetry, Engine,
};
use teloxide::error_handlers::IgnoringErrorHandlerSafe;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    telemetry::init_tracing(config.as_ref().map_or("info", |c| c.log_level.as_str()));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Refusing to start: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match Catalog::builtin() {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load question catalog: {}", e);
            std::process::exit(1);
        }
    };

    let connection = match Connection::connect(&config.database_url).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let engine: Arc<Engine> = Arc::new(Engine::new(catalog, connection));
    let bot = Bot::new(config.bot_token);
    info!("Starting bot...");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build();

    if let Some(webhook) = config.webhook {
        info!("Listening for webhooks on {}", webhook.addr);
        let listener = match webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to build a webhook listener: {}", e);
                std::process::exit(1);
            }
        };
        dispatcher
            .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
            .await
    } else {
        dispatcher.dispatch().await
    }
}
