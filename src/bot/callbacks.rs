//! Inline keyboard presses.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{MaybeInaccessibleMessage, ParseMode};
use tracing::{info, warn};

use super::screens::{self, Viewer};
use super::{BotState, HandlerResult, finish, keyboards, texts};
use crate::catalog::Callback;
use crate::payments::cryptobot;
use crate::store::{Provider, Registration, Settlement};


pub async fn handle(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    finish(dispatch(&bot, &q, &state).await)
}

async fn ack(bot: &Bot, q: &CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn alert(bot: &Bot, q: &CallbackQuery, text: &str) -> HandlerResult {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await?;
    Ok(())
}

async fn dispatch(bot: &Bot, q: &CallbackQuery, state: &BotState) -> HandlerResult {
    let Some(callback) = q.data.as_deref().and_then(Callback::parse) else {
        warn!("Unknown callback data {:?} from {}", q.data, q.from.id);
        return ack(bot, q).await;
    };
    let Some(message) = q.message.as_ref() else {
        return ack(bot, q).await;
    };
    let viewer = Viewer { user: q.from.id, chat: message.chat().id };

    match callback {
        Callback::Approve { payment } => return approve(bot, q, state, message, payment).await,
        Callback::Reject { payment } => return reject(bot, q, state, message, payment).await,
        Callback::EditTitle { key } => return edit_title(bot, q, state, viewer, &key).await,
        _ => {}
    }

    // The pressed message belongs to the current screen
    state.sessions.track(viewer.user, viewer.chat, message.id()).await;

    match callback {
        Callback::Menu => {
            ack(bot, q).await?;
            screens::menu(bot, state, viewer).await
        }
        Callback::Register => match state.db.register(viewer.user_id(), state.config.trial_days, Utc::now())? {
            Registration::Registered(_) => {
                ack(bot, q).await?;
                screens::show_text(
                    bot,
                    state,
                    viewer,
                    texts::registered(state.config.trial_days),
                    keyboards::after_registration(),
                )
                .await
            }
            Registration::AlreadyRegistered => alert(bot, q, texts::ALREADY_REGISTERED).await,
        },
        Callback::Plans => {
            ack(bot, q).await?;
            screens::show_text(bot, state, viewer, texts::CHOOSE_PLAN, keyboards::plans(&state.config.prices)).await
        }
        Callback::Status => {
            ack(bot, q).await?;
            let subscription = state.db.subscription(viewer.user_id())?;
            let text = texts::subscription_status(subscription.as_ref(), Utc::now());
            screens::show_text(bot, state, viewer, text, keyboards::back_to_menu()).await
        }
        Callback::List { page } => {
            if !state.is_entitled(viewer.user)? {
                alert(bot, q, texts::ACCESS_CLOSED_ALERT).await?;
                return screens::access_closed(bot, state, viewer).await;
            }
            ack(bot, q).await?;
            screens::anime_list(bot, state, viewer, page).await
        }
        Callback::Anime { key } => {
            let Some(anime) = state.db.anime_by_key(&key)? else {
                return alert(bot, q, texts::GONE).await;
            };
            ack(bot, q).await?;
            screens::anime_card(bot, state, viewer, &anime).await
        }
        Callback::Season { key } => {
            ack(bot, q).await?;
            screens::dubs(bot, state, viewer, &key).await
        }
        Callback::Dub { key, page } => {
            ack(bot, q).await?;
            screens::episodes(bot, state, viewer, &key, page).await
        }
        Callback::Episode { id, page } => {
            if !state.is_entitled(viewer.user)? {
                alert(bot, q, texts::EPISODE_NEEDS_SUBSCRIPTION).await?;
                return screens::access_closed(bot, state, viewer).await;
            }
            ack(bot, q).await?;
            screens::playback(bot, state, viewer, id, page).await
        }
        Callback::Buy(plan) => {
            state.sessions.select_plan(viewer.user, plan).await;
            ack(bot, q).await?;
            let text = texts::plan_selected(plan, state.config.prices.price(plan));
            screens::show_text(bot, state, viewer, text, keyboards::payment_methods(state.crypto.is_some())).await
        }
        Callback::PayCrypto => pay_crypto(bot, q, state, viewer).await,
        Callback::PayTransfer => {
            let Some(plan) = state.sessions.selected_plan(viewer.user).await else {
                return alert(bot, q, texts::PICK_PLAN_FIRST).await;
            };
            ack(bot, q).await?;
            let text = texts::transfer_instructions(state.config.prices.price(plan), &state.config.transfer_details);
            screens::show_text(bot, state, viewer, text, keyboards::confirm_transfer()).await
        }
        Callback::ConfirmPayment => {
            let Some(plan) = state.sessions.await_receipt(viewer.user).await else {
                return alert(bot, q, texts::PICK_PLAN_FIRST).await;
            };
            info!("🧾 User {} will send a receipt for {}", viewer.user, plan.key());
            ack(bot, q).await?;
            screens::show_text(bot, state, viewer, texts::SEND_RECEIPT, keyboards::back_to_menu()).await
        }
        Callback::Approve { .. } | Callback::Reject { .. } | Callback::EditTitle { .. } => Ok(()),
    }
}

/// Approximate amounts for the configured assets. Missing rates drop the asset.
fn asset_quotes(price: u32, assets: &[String], rates: &[cryptobot::ExchangeRate], margin: f64) -> Vec<(String, String)> {
    assets
        .iter()
        .filter_map(|asset| cryptobot::quote(price, asset, rates, margin).map(|amount| (asset.clone(), amount)))
        .collect()
}

async fn pay_crypto(bot: &Bot, q: &CallbackQuery, state: &BotState, viewer: Viewer) -> HandlerResult {
    let Some(plan) = state.sessions.selected_plan(viewer.user).await else {
        return alert(bot, q, texts::PLAN_MISSING).await;
    };
    let Some(client) = state.crypto.as_ref() else {
        return alert(bot, q, texts::INVOICE_FAILED).await;
    };
    let price = state.config.prices.price(plan);

    let invoice = match client.create_invoice(viewer.user_id(), plan, price).await {
        Ok(invoice) => invoice,
        Err(e) => {
            warn!("Failed to create invoice for user {}: {}", viewer.user, e);
            return alert(bot, q, texts::INVOICE_FAILED).await;
        }
    };
    let Some(pay_url) = invoice.url().and_then(|url| Url::parse(url).ok()) else {
        warn!("Invoice {} has no usable pay url", invoice.invoice_id);
        return alert(bot, q, texts::INVOICE_FAILED).await;
    };

    state.db.record_invoice(
        Provider::CryptoBot,
        &invoice.invoice_id.to_string(),
        viewer.user_id(),
        plan,
        price,
        Utc::now(),
    )?;
    info!(target: "payments", "🧾 Invoice {} ({}, {}₽) for user {}", invoice.invoice_id, plan.key(), price, viewer.user);

    let quotes = match client.exchange_rates().await {
        Ok(rates) => asset_quotes(price, &state.config.crypto_assets, &rates, state.config.crypto_margin),
        Err(e) => {
            warn!("Failed to fetch exchange rates: {}", e);
            Vec::new()
        }
    };

    ack(bot, q).await?;
    let text = texts::crypto_invoice(plan, price, &quotes);
    screens::show_text(bot, state, viewer, text, keyboards::crypto_invoice(pay_url)).await
}

async fn require_admin(bot: &Bot, q: &CallbackQuery, state: &BotState) -> Result<bool, super::HandlerError> {
    if state.is_admin(q.from.id) {
        return Ok(true);
    }
    alert(bot, q, texts::NO_RIGHTS).await?;
    Ok(false)
}

/// Drops the review buttons and appends the outcome to the admin's copy.
async fn close_review(bot: &Bot, message: &MaybeInaccessibleMessage, outcome: String) {
    if let Err(e) = bot.edit_message_reply_markup(message.chat().id, message.id()).await {
        warn!("Could not remove review buttons: {}", e);
    }
    if let Err(e) = bot.send_message(message.chat().id, outcome).await {
        warn!("Could not report review outcome: {}", e);
    }
}

async fn approve(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    message: &MaybeInaccessibleMessage,
    payment_id: i64,
) -> HandlerResult {
    if !require_admin(bot, q, state).await? {
        return Ok(());
    }

    match state.db.settle_by_id(payment_id, Utc::now())? {
        Settlement::Credited { payment, .. } => {
            ack(bot, q).await?;
            let term = payment.plan.term();
            close_review(bot, message, texts::payment_settled(payment_id, payment.user_id, term)).await;
            if let Err(e) = bot
                .send_message(ChatId(payment.user_id), texts::subscription_activated(term))
                .reply_markup(keyboards::back_to_menu())
                .await
            {
                warn!("Could not notify user {} about approval: {}", payment.user_id, e);
            }
            Ok(())
        }
        Settlement::AlreadySettled => already_processed(bot, q, state, payment_id).await,
        Settlement::Unknown => alert(bot, q, texts::GONE).await,
    }
}

/// Tells the reviewer how an earlier press resolved the request.
async fn already_processed(bot: &Bot, q: &CallbackQuery, state: &BotState, payment_id: i64) -> HandlerResult {
    let status = state.db.payment(payment_id)?.map(|p| p.status);
    alert(bot, q, texts::already_processed(status)).await
}

async fn reject(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    message: &MaybeInaccessibleMessage,
    payment_id: i64,
) -> HandlerResult {
    if !require_admin(bot, q, state).await? {
        return Ok(());
    }

    let Some(payment) = state.db.reject(payment_id, Utc::now())? else {
        return already_processed(bot, q, state, payment_id).await;
    };
    ack(bot, q).await?;
    close_review(bot, message, texts::payment_rejected(payment_id, payment.user_id)).await;
    if let Err(e) = bot.send_message(ChatId(payment.user_id), texts::REJECTED).await {
        warn!("Could not notify user {} about rejection: {}", payment.user_id, e);
    }
    Ok(())
}

async fn edit_title(bot: &Bot, q: &CallbackQuery, state: &BotState, viewer: Viewer, key: &str) -> HandlerResult {
    if !require_admin(bot, q, state).await? {
        return Ok(());
    }
    let Some(anime) = state.db.anime_by_key(key)? else {
        return alert(bot, q, texts::GONE).await;
    };

    state.sessions.start_title_edit(viewer.user, anime.key.clone()).await;
    ack(bot, q).await?;
    bot.send_message(viewer.chat, texts::edit_title_prompt(&anime.name))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
