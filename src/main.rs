use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use animebot::bot::{BotState, run_notifier, schema};
use animebot::config::{Config, DEFAULT_CONFIG_PATH};
use animebot::payments::webhook::{self, WebhookState};
use animebot::store::Database;
use animebot::telegram_log;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("animebot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let chat_layer = telegram_log::LogChatLayer::new(bot.clone(), log_chat_id);
        registry.with(chat_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting animebot...");
    info!("Loaded config from {config_path}");
    info!("Admin IDs: {:?}", config.admin_ids);

    let db = match Database::open(&config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let webhook_state = WebhookState {
        db: db.clone(),
        events: events_tx,
        prices: config.prices.clone(),
        signing_token: config.webhook_signing_token(),
        user_agent_marker: config.webhook_user_agent_marker.clone(),
    };
    if webhook_state.signing_token.is_none() && webhook_state.user_agent_marker.is_none() {
        warn!("Payment webhook accepts unauthenticated requests");
    }

    let app = webhook::router(&config.webhook_path, webhook_state);
    match tokio::net::TcpListener::bind(config.webhook_bind).await {
        Ok(listener) => {
            info!("💳 Payment webhook on http://{}{}", config.webhook_bind, config.webhook_path);
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("Webhook server stopped: {e}");
                }
            });
        }
        Err(e) => error!("Failed to bind webhook on {}: {e}", config.webhook_bind),
    }

    tokio::spawn(run_notifier(bot.clone(), events_rx));

    if let Err(e) = bot
        .set_my_commands(vec![BotCommand::new("start", "Главное меню")])
        .await
    {
        warn!("Failed to register bot commands: {e}");
    }

    let bot_username = match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(e) => {
            warn!("Failed to fetch bot info, inline results get no deep links: {e}");
            None
        }
    };

    let state = Arc::new(BotState::new(config, db, bot_username));

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
