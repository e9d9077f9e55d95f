//! Anime cards and posters from Shikimori and AniList.

pub mod anilist;
pub mod shikimori;

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use anilist::AnilistClient;
use shikimori::ShikimoriClient;

pub const USER_AGENT: &str = "Mozilla/5.0 (Telegram Bot)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeInfo {
    /// Russian title, else the original one.
    pub title: String,
    pub original_title: Option<String>,
    pub title_en: Option<String>,
    pub score: String,
    pub year: String,
    pub genres: String,
    /// Raw description; see `catalog::description` for display.
    pub description: String,
    pub status: &'static str,
    pub poster: Option<String>,
}

impl AnimeInfo {
    /// One-line summary used for inline results.
    pub fn short_line(&self) -> String {
        format!("⭐ {} | 🎭 {} | 📅 {}", self.score, self.genres, self.year)
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Status(u16),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Status(code) => write!(f, "unexpected status {code}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Candidate titles for an AniList poster search, best first.
pub fn poster_candidates<'a>(
    stored_name: &'a str,
    english_title: Option<&'a str>,
    info: Option<&'a AnimeInfo>,
) -> Vec<&'a str> {
    let mut candidates: Vec<&str> = Vec::new();
    let mut push = |s: Option<&'a str>| {
        if let Some(s) = s.map(str::trim).filter(|s| !s.is_empty())
            && !candidates.iter().any(|c| c.eq_ignore_ascii_case(s))
        {
            candidates.push(s);
        }
    };

    push(english_title);
    push(info.and_then(|i| i.title_en.as_deref()));
    push(info.and_then(|i| i.original_title.as_deref()));
    push(info.map(|i| i.title.as_str()));
    push(Some(stored_name));
    candidates
}

/// Shikimori cards cached per stored name, plus the poster fallback chain.
pub struct MetadataService {
    shikimori: ShikimoriClient,
    anilist: AnilistClient,
    cache: Mutex<HashMap<String, AnimeInfo>>,
}

impl Default for MetadataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataService {
    pub fn new() -> Self {
        Self {
            shikimori: ShikimoriClient::new(),
            anilist: AnilistClient::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Card for `name`. Failures are logged and yield `None`.
    pub async fn info(&self, name: &str) -> Option<AnimeInfo> {
        if let Some(info) = self.cache.lock().await.get(name) {
            return Some(info.clone());
        }

        match self.shikimori.lookup(name).await {
            Ok(Some(info)) => {
                self.cache.lock().await.insert(name.to_string(), info.clone());
                Some(info)
            }
            Ok(None) => {
                debug!("No Shikimori match for '{}'", name);
                None
            }
            Err(e) => {
                warn!("Shikimori lookup for '{}' failed: {}", name, e);
                None
            }
        }
    }

    /// AniList cover by the best available title, else the Shikimori poster.
    pub async fn poster(
        &self,
        stored_name: &str,
        english_title: Option<&str>,
        info: Option<&AnimeInfo>,
    ) -> Option<String> {
        for candidate in poster_candidates(stored_name, english_title, info) {
            match self.anilist.poster(candidate).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => {}
                Err(e) => {
                    warn!("AniList poster lookup for '{}' failed: {}", candidate, e);
                    break;
                }
            }
        }
        info.and_then(|i| i.poster.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> AnimeInfo {
        AnimeInfo {
            title: "Милый во Франксе".into(),
            original_title: Some("Darling in the FranXX".into()),
            title_en: Some("DARLING in the FRANXX".into()),
            score: "7.2".into(),
            year: "2018".into(),
            genres: "Меха".into(),
            description: String::new(),
            status: "Вышло",
            poster: Some("https://shikimori.one/x.jpg".into()),
        }
    }

    #[test]
    fn test_poster_candidates_order_and_dedup() {
        let info = info();
        let candidates = poster_candidates("darling in the franxx", Some("Darling"), Some(&info));
        assert_eq!(
            candidates,
            vec!["Darling", "DARLING in the FRANXX", "Милый во Франксе"]
        );
    }

    #[test]
    fn test_poster_candidates_without_info() {
        assert_eq!(poster_candidates("naruto", None, None), vec!["naruto"]);
        assert_eq!(poster_candidates("naruto", Some("  "), None), vec!["naruto"]);
    }

    #[test]
    fn test_short_line() {
        assert_eq!(info().short_line(), "⭐ 7.2 | 🎭 Меха | 📅 2018");
    }
}
