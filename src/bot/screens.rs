//! Screens shared by commands, callbacks and messages.
//!
//! Every screen first removes the bot messages the user still has on screen,
//! then sends a new message and tracks it.

use std::path::PathBuf;

use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{FileId, InlineKeyboardMarkup, InputFile, Message, ParseMode};
use tracing::{debug, info, warn};

use super::{BotState, HandlerResult, keyboards, texts};
use crate::catalog::pages::{ANIME_PER_PAGE, EPISODES_PER_PAGE, page_of, paginate};
use crate::store::AnimeEntry;

/// Who is looking at the screen and where.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub user: UserId,
    pub chat: ChatId,
}

impl Viewer {
    pub fn user_id(&self) -> i64 {
        self.user.0 as i64
    }
}

/// Deletes tracked bot messages. Failures are ignored.
pub async fn clear(bot: &Bot, state: &BotState, viewer: Viewer) {
    for (chat, message) in state.sessions.take_tracked(viewer.user).await {
        if let Err(e) = bot.delete_message(chat, message).await {
            debug!("Could not delete message {} in {}: {}", message, chat, e);
        }
    }
}

async fn remember(state: &BotState, viewer: Viewer, message: &Message) {
    state.sessions.track(viewer.user, message.chat.id, message.id).await;
}

/// Replaces the screen with an HTML text message.
pub async fn show_text(
    bot: &Bot,
    state: &BotState,
    viewer: Viewer,
    text: impl Into<String>,
    markup: InlineKeyboardMarkup,
) -> HandlerResult {
    clear(bot, state, viewer).await;
    let message = bot
        .send_message(viewer.chat, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(markup)
        .await?;
    remember(state, viewer, &message).await;
    Ok(())
}

/// Replaces the screen with a photo, falling back to text if the photo is rejected.
async fn show_photo(
    bot: &Bot,
    state: &BotState,
    viewer: Viewer,
    photo: InputFile,
    caption: String,
    markup: InlineKeyboardMarkup,
) -> HandlerResult {
    clear(bot, state, viewer).await;
    let sent = bot
        .send_photo(viewer.chat, photo)
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(markup.clone())
        .await;

    match sent {
        Ok(message) => {
            remember(state, viewer, &message).await;
            Ok(())
        }
        Err(e) => {
            warn!("Failed to send photo, falling back to text: {}", e);
            show_text(bot, state, viewer, caption, markup).await
        }
    }
}

/// Where the configured welcome photo lives.
#[derive(Debug, PartialEq, Eq)]
pub enum PhotoSource {
    Url(Url),
    File(PathBuf),
    FileId(String),
}

impl PhotoSource {
    pub fn parse(source: &str) -> Self {
        if let Ok(url) = Url::parse(source)
            && matches!(url.scheme(), "http" | "https")
        {
            return Self::Url(url);
        }
        let path = PathBuf::from(source);
        if path.exists() { Self::File(path) } else { Self::FileId(source.to_string()) }
    }

    fn into_input_file(self) -> InputFile {
        match self {
            Self::Url(url) => InputFile::url(url),
            Self::File(path) => InputFile::file(path),
            Self::FileId(id) => InputFile::file_id(FileId(id)),
        }
    }
}

pub async fn welcome(bot: &Bot, state: &BotState, viewer: Viewer) -> HandlerResult {
    let registered = state.db.is_registered(viewer.user_id())?;
    let markup = keyboards::welcome(registered);
    let text = texts::welcome(state.config.trial_days);

    match &state.config.welcome_photo {
        Some(source) => {
            let photo = PhotoSource::parse(source).into_input_file();
            show_photo(bot, state, viewer, photo, text, markup).await
        }
        None => show_text(bot, state, viewer, text, markup).await,
    }
}

pub async fn menu(bot: &Bot, state: &BotState, viewer: Viewer) -> HandlerResult {
    show_text(bot, state, viewer, texts::MAIN_MENU, keyboards::main_menu()).await
}

pub async fn access_closed(bot: &Bot, state: &BotState, viewer: Viewer) -> HandlerResult {
    show_text(bot, state, viewer, texts::ACCESS_CLOSED, keyboards::access_closed()).await
}

pub async fn gone(bot: &Bot, state: &BotState, viewer: Viewer) -> HandlerResult {
    show_text(bot, state, viewer, texts::GONE, keyboards::back_to_menu()).await
}

pub async fn anime_list(bot: &Bot, state: &BotState, viewer: Viewer, page: usize) -> HandlerResult {
    let animes = state.db.anime_list()?;
    if animes.is_empty() {
        return show_text(bot, state, viewer, texts::EMPTY_CATALOG, keyboards::back_to_menu()).await;
    }

    let page = paginate(&animes, page, ANIME_PER_PAGE);
    show_text(bot, state, viewer, texts::CHOOSE_ANIME, keyboards::anime_list(&page)).await
}

/// Card with Shikimori data and a poster, then season buttons.
pub async fn anime_card(bot: &Bot, state: &BotState, viewer: Viewer, anime: &AnimeEntry) -> HandlerResult {
    let seasons = state.db.seasons(&anime.key)?;
    let english = state.db.english_title(&anime.key)?;

    let info = state.metadata.info(&anime.name).await;
    let poster = state
        .metadata
        .poster(&anime.name, english.as_deref(), info.as_ref())
        .await
        .and_then(|url| Url::parse(&url).ok());

    let caption = texts::anime_card(&anime.name, info.as_ref());
    let markup = keyboards::anime_card(&seasons);

    match poster {
        Some(url) => show_photo(bot, state, viewer, InputFile::url(url), caption, markup).await,
        None => show_text(bot, state, viewer, caption, markup).await,
    }
}

pub async fn dubs(bot: &Bot, state: &BotState, viewer: Viewer, season_key: &str) -> HandlerResult {
    let Some((anime, _season)) = state.db.season_by_key(season_key)? else {
        return gone(bot, state, viewer).await;
    };
    let dubs = state.db.dubs(season_key)?;
    show_text(bot, state, viewer, texts::CHOOSE_DUB, keyboards::dubs(&anime.key, &dubs)).await
}

pub async fn episodes(bot: &Bot, state: &BotState, viewer: Viewer, dub_key: &str, page: usize) -> HandlerResult {
    let Some(selection) = state.db.dub_by_key(dub_key)? else {
        return gone(bot, state, viewer).await;
    };
    let episodes = state.db.episodes(dub_key)?;
    let page = paginate(&episodes, page, EPISODES_PER_PAGE);
    let markup = keyboards::episodes(&selection.dub.key, &selection.season.key, &page);
    show_text(bot, state, viewer, texts::CHOOSE_EPISODE, markup).await
}

/// Sends the episode as a protected video, or a download button for links.
pub async fn playback(bot: &Bot, state: &BotState, viewer: Viewer, video_id: i64, page: usize) -> HandlerResult {
    let Some(video) = state.db.episode(video_id)? else {
        return gone(bot, state, viewer).await;
    };
    let (prev, next) = state.db.neighbours(&video)?;
    let episodes = state.db.episodes(&video.dub.key)?;
    let grid_page = |id: i64| episodes.iter().position(|e| e.id == id).map(|i| page_of(i, EPISODES_PER_PAGE));
    let page = grid_page(video.id).unwrap_or(page);
    let prev = prev.map(|id| (id, grid_page(id).unwrap_or(page)));
    let next = next.map(|id| (id, grid_page(id).unwrap_or(page)));
    let caption = texts::episode_caption(&video);

    info!(
        "▶️ User {} watches '{}' [{}] {}",
        viewer.user, video.anime.name, video.dub.dub, video.season.season.episode_caption(video.episode)
    );

    if video.is_link() {
        let download = Url::parse(&video.file_ref).ok();
        if download.is_none() {
            warn!("Episode {} has an unparsable link '{}'", video.id, video.file_ref);
        }
        let markup = keyboards::playback(&video.dub.key, page, prev, next, download);
        clear(bot, state, viewer).await;
        let message = bot
            .send_message(viewer.chat, caption)
            .parse_mode(ParseMode::Html)
            .protect_content(true)
            .reply_markup(markup)
            .await?;
        remember(state, viewer, &message).await;
        return Ok(());
    }

    let markup = keyboards::playback(&video.dub.key, page, prev, next, None);
    clear(bot, state, viewer).await;
    let message = bot
        .send_video(viewer.chat, InputFile::file_id(FileId(video.file_ref.clone())))
        .caption(caption)
        .parse_mode(ParseMode::Html)
        .protect_content(true)
        .reply_markup(markup)
        .await?;
    remember(state, viewer, &message).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_sources() {
        assert_eq!(
            PhotoSource::parse("https://example.com/welcome.jpg"),
            PhotoSource::Url(Url::parse("https://example.com/welcome.jpg").unwrap())
        );
        assert_eq!(
            PhotoSource::parse("AgACAgIAAxkBAAIB"),
            PhotoSource::FileId("AgACAgIAAxkBAAIB".into())
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("welcome.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        assert_eq!(PhotoSource::parse(path.to_str().unwrap()), PhotoSource::File(path));
    }
}
