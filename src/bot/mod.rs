//! Telegram surface: commands, callbacks, messages and inline search.

pub mod callbacks;
pub mod commands;
pub mod inline;
pub mod keyboards;
pub mod messages;
pub mod screens;
pub mod session;
pub mod texts;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metadata::MetadataService;
use crate::payments::{PaymentEvent, cryptobot};
use crate::store::{Database, StoreError};
use commands::Command;
use session::Sessions;

pub struct BotState {
    pub config: Config,
    pub db: Arc<Database>,
    pub metadata: MetadataService,
    /// Present when a Crypto Pay token is configured.
    pub crypto: Option<cryptobot::Client>,
    pub sessions: Sessions,
    /// Used for `t.me` deep links; `None` if `getMe` failed at startup.
    pub bot_username: Option<String>,
}

impl BotState {
    pub fn new(config: Config, db: Arc<Database>, bot_username: Option<String>) -> Self {
        let crypto = config
            .crypto_pay_token
            .clone()
            .map(|token| cryptobot::Client::new(token, config.crypto_pay_api_url.clone()));
        if crypto.is_none() {
            info!("Crypto payments disabled (no crypto_pay_token)");
        }

        Self {
            config,
            db,
            metadata: MetadataService::new(),
            crypto,
            sessions: Sessions::new(),
            bot_username,
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.config.is_admin(user)
    }

    /// Admins always pass; everyone else needs an active subscription.
    pub fn is_entitled(&self, user: UserId) -> Result<bool, StoreError> {
        if self.is_admin(user) {
            return Ok(true);
        }
        self.db.is_entitled(user.0 as i64, Utc::now())
    }
}

#[derive(Debug)]
pub enum HandlerError {
    Telegram(RequestError),
    Store(StoreError),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram(e) => write!(f, "telegram error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<RequestError> for HandlerError {
    fn from(e: RequestError) -> Self {
        Self::Telegram(e)
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Store failures are logged and swallowed; Telegram errors go to the dispatcher.
pub(crate) fn finish(result: HandlerResult) -> ResponseResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(HandlerError::Store(e)) => {
            error!("Database failure while handling update: {}", e);
            Ok(())
        }
        Err(HandlerError::Telegram(e)) => Err(e),
    }
}

pub fn schema() -> UpdateHandler<RequestError> {
    let message = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(commands::handle),
        )
        .branch(dptree::endpoint(messages::handle));

    dptree::entry()
        .branch(message)
        .branch(Update::filter_callback_query().endpoint(callbacks::handle))
        .branch(Update::filter_inline_query().endpoint(inline::handle))
}

/// Tells users about payments credited by the webhook.
pub async fn run_notifier(bot: Bot, mut events: mpsc::UnboundedReceiver<PaymentEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PaymentEvent::Credited { user_id, plan, .. } => {
                info!(target: "payments", "📣 Notifying user {} about {}", user_id, plan.key());
                if let Err(e) = bot
                    .send_message(ChatId(user_id), texts::subscription_activated(plan.term()))
                    .reply_markup(keyboards::back_to_menu())
                    .await
                {
                    warn!("Failed to notify user {} about payment: {}", user_id, e);
                }
            }
        }
    }
    info!("Payment notifier stopped");
}
