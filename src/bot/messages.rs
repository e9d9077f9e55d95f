//! Non-command messages: uploads, receipts, title edits and search.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use teloxide::utils::html::escape;
use tracing::{info, warn};

use super::screens::{self, Viewer};
use super::{BotState, HandlerResult, finish, keyboards, texts};
use crate::catalog::pages::title_case;
use crate::payments::Plan;

pub const SEARCH_LIMIT: usize = 5;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// First http(s) link in `text`.
pub fn find_link(text: &str) -> Option<&str> {
    URL.find(text).map(|m| m.as_str())
}

/// Telegram file id of a receipt: the largest photo size, else the document.
fn receipt_file(msg: &Message) -> Option<String> {
    if let Some(sizes) = msg.photo() {
        return sizes.iter().max_by_key(|p| p.width * p.height).map(|p| p.file.id.0.clone());
    }
    msg.document().map(|d| d.file.id.0.clone())
}

pub async fn handle(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    finish(dispatch(&bot, &msg, &state).await)
}

async fn dispatch(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let viewer = Viewer { user: user.id, chat: msg.chat.id };
    let is_admin = state.is_admin(user.id);

    if is_admin && let Some(video) = msg.video() {
        return store_upload(bot, msg, state, &video.file.id.0, texts::VIDEO_SAVED).await;
    }

    if let Some(file_ref) = receipt_file(msg)
        && let Some(plan) = state.sessions.take_receipt(user.id).await
    {
        return receipt(bot, msg, state, viewer, user.username.as_deref(), plan, &file_ref).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }

    if is_admin {
        if let Some(anime_key) = state.sessions.editing_title(user.id).await {
            return set_title(bot, msg, state, viewer, &anime_key, text).await;
        }
        if let Some(link) = find_link(text) {
            return store_upload(bot, msg, state, link, texts::LINK_SAVED).await;
        }
    }

    search(bot, state, viewer, text).await
}

async fn store_upload(bot: &Bot, msg: &Message, state: &BotState, file_ref: &str, saved: &str) -> HandlerResult {
    if state.db.add_pending(i64::from(msg.id.0), file_ref, msg.date)? {
        info!("📥 Pending upload {} stored", msg.id);
    }
    bot.send_message(msg.chat.id, saved).await?;
    Ok(())
}

async fn receipt(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    viewer: Viewer,
    username: Option<&str>,
    plan: Plan,
    file_ref: &str,
) -> HandlerResult {
    let price = state.config.prices.price(plan);
    let payment_id = state
        .db
        .open_transfer(viewer.user_id(), plan, price, msg.chat.id.0, msg.id.0, Utc::now())?;
    info!(
        target: "payments",
        "🧾 Transfer receipt #{} from user {} for {} (file {})",
        payment_id, viewer.user, plan.key(), file_ref
    );

    let caption = texts::receipt_for_admins(viewer.user_id(), username, plan, price, payment_id);
    for admin in &state.config.admin_ids {
        if let Err(e) = bot
            .copy_message(ChatId::from(*admin), msg.chat.id, msg.id)
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::review(payment_id))
            .await
        {
            warn!("Could not forward receipt #{} to admin {}: {}", payment_id, admin, e);
        }
    }

    screens::show_text(bot, state, viewer, texts::WAIT_FOR_APPROVAL, keyboards::back_to_menu()).await
}

async fn set_title(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    viewer: Viewer,
    anime_key: &str,
    text: &str,
) -> HandlerResult {
    let title = text.trim();
    if title.is_empty() {
        bot.send_message(msg.chat.id, texts::EMPTY_TITLE).await?;
        return Ok(());
    }

    let Some(anime) = state.db.anime_by_key(anime_key)? else {
        state.sessions.finish_title_edit(viewer.user).await;
        bot.send_message(msg.chat.id, texts::GONE).await?;
        return Ok(());
    };

    state.db.set_english_title(anime_key, title)?;
    state.sessions.finish_title_edit(viewer.user).await;
    info!("✏ English title of '{}' set to '{}'", anime.name, title);

    bot.send_message(msg.chat.id, texts::title_updated(&anime.name, title))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// One card per match, with a poster when one can be found.
async fn search(bot: &Bot, state: &BotState, viewer: Viewer, query: &str) -> HandlerResult {
    let hits = state.db.search(query, SEARCH_LIMIT)?;
    if hits.is_empty() {
        return screens::show_text(bot, state, viewer, texts::NOT_FOUND, keyboards::back_to_menu()).await;
    }

    screens::clear(bot, state, viewer).await;
    for anime in hits {
        let info = state.metadata.info(&anime.name).await;
        let english = state.db.english_title(&anime.key)?;
        let poster = state
            .metadata
            .poster(&anime.name, english.as_deref(), info.as_ref())
            .await
            .and_then(|url| Url::parse(&url).ok());

        let caption = match &info {
            Some(info) => format!(
                "<b>{}</b>\n{}",
                escape(&title_case(&anime.name)),
                escape(&info.short_line())
            ),
            None => format!("<b>{}</b>", escape(&title_case(&anime.name))),
        };
        let markup = keyboards::search_hit(&anime.key);

        let sent = match poster {
            Some(url) => {
                bot.send_photo(viewer.chat, InputFile::url(url))
                    .caption(caption.clone())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
                    .await
            }
            None => {
                bot.send_message(viewer.chat, caption.clone())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
                    .await
            }
        };

        let message = match sent {
            Ok(message) => message,
            Err(e) => {
                warn!("Search card for '{}' failed, sending text: {}", anime.name, e);
                bot.send_message(viewer.chat, caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup)
                    .await?
            }
        };
        state.sessions.track(viewer.user, message.chat.id, message.id).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_link() {
        assert_eq!(
            find_link("серия тут https://cloud.example/ep1.mp4 спасибо"),
            Some("https://cloud.example/ep1.mp4")
        );
        assert_eq!(find_link("http://a.b/c"), Some("http://a.b/c"));
        assert_eq!(find_link("no links here"), None);
        assert_eq!(find_link("ftp://files.example/x"), None);
    }
}
