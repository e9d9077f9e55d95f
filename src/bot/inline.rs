//! Inline-mode search. A chosen result posts the anime name, which the
//! message handler turns into a search card, plus a deep link back into the bot.

use std::sync::Arc;

use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQueryResult, InlineQueryResultArticle, InputMessageContent, InputMessageContentText,
};
use tracing::warn;

use super::messages::SEARCH_LIMIT;
use super::{BotState, keyboards};
use crate::catalog::deep_link;
use crate::catalog::pages::title_case;
use crate::metadata::AnimeInfo;
use crate::store::AnimeEntry;

fn article(
    anime: &AnimeEntry,
    info: Option<&AnimeInfo>,
    thumbnail: Option<Url>,
    bot_username: Option<&str>,
) -> InlineQueryResult {
    let title = title_case(&anime.name);
    let mut article = InlineQueryResultArticle::new(
        anime.key.clone(),
        title.clone(),
        InputMessageContent::Text(InputMessageContentText::new(title)),
    );
    if let Some(info) = info {
        article = article.description(info.short_line());
    }
    if let Some(url) = thumbnail {
        article = article.thumbnail_url(url);
    }
    if let Some(link) = bot_username.and_then(|name| Url::parse(&deep_link::share_url(name, &anime.name)).ok()) {
        article = article.reply_markup(keyboards::open_in_bot(link));
    }
    InlineQueryResult::Article(article)
}

pub async fn handle(bot: Bot, q: InlineQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let hits = match state.db.search(&q.query, SEARCH_LIMIT) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Inline search for '{}' failed: {}", q.query, e);
            Vec::new()
        }
    };

    let mut results = Vec::with_capacity(hits.len());
    for anime in &hits {
        let info = state.metadata.info(&anime.name).await;
        let english = state.db.english_title(&anime.key).unwrap_or_else(|e| {
            warn!("Could not load English title for '{}': {}", anime.name, e);
            None
        });
        let thumbnail = state
            .metadata
            .poster(&anime.name, english.as_deref(), info.as_ref())
            .await
            .and_then(|url| Url::parse(&url).ok());
        results.push(article(anime, info.as_ref(), thumbnail, state.bot_username.as_deref()));
    }

    bot.answer_inline_query(q.id.clone(), results)
        .cache_time(1)
        .is_personal(true)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_article_sends_name_as_text() {
        let anime = AnimeEntry { key: "0123456789ab".into(), name: "one piece".into() };
        let InlineQueryResult::Article(article) = article(&anime, None, None, None) else {
            panic!("expected an article");
        };
        assert_eq!(article.title, "One Piece");
        assert_eq!(article.description, None);
        assert!(article.reply_markup.is_none());
        let InputMessageContent::Text(content) = article.input_message_content else {
            panic!("expected text content");
        };
        assert_eq!(content.message_text, "One Piece");
    }

    #[test]
    fn test_article_links_back_to_card() {
        let anime = AnimeEntry { key: "0123456789ab".into(), name: "one piece".into() };
        let InlineQueryResult::Article(article) = article(&anime, None, None, Some("anime4k_bot")) else {
            panic!("expected an article");
        };
        let markup = article.reply_markup.expect("deep link button");
        let InlineKeyboardButtonKind::Url(url) = &markup.inline_keyboard[0][0].kind else {
            panic!("expected a url button");
        };
        let param = url.query().and_then(|q| q.strip_prefix("start=")).unwrap();
        assert_eq!(deep_link::candidates(param)[0], "one piece");
    }
}
