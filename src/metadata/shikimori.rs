//! Shikimori lookups: search by name, then fetch the full card.

use reqwest::Client;
use serde::Deserialize;

use super::{AnimeInfo, Error, USER_AGENT};
use crate::catalog::description::MISSING_DESCRIPTION;

const SHIKIMORI_URL: &str = "https://shikimori.one";

const PLACEHOLDER: &str = "—";

#[derive(Deserialize)]
struct SearchHit {
    id: i64,
}

#[derive(Deserialize)]
struct Genre {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    russian: Option<String>,
}

#[derive(Deserialize)]
struct Image {
    original: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct Detail {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    russian: Option<String>,
    #[serde(default)]
    english: Option<Vec<Option<String>>>,
    #[serde(default)]
    score: Option<String>,
    #[serde(default)]
    aired_on: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<Image>,
}

fn status_text(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "released" => "Вышло",
        "ongoing" => "Онгоинг",
        "anons" => "Анонс",
        _ => "Неизвестно",
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Detail {
    pub(super) fn into_info(self, fallback_title: &str) -> AnimeInfo {
        let genres = self
            .genres
            .into_iter()
            .filter_map(|g| non_empty(g.russian).or(non_empty(g.name)))
            .collect::<Vec<_>>()
            .join(", ");

        let year = non_empty(self.aired_on)
            .map(|d| d.chars().take(4).collect::<String>())
            .unwrap_or_else(|| PLACEHOLDER.to_string());

        let title_en = self
            .english
            .unwrap_or_default()
            .into_iter()
            .find_map(non_empty);

        AnimeInfo {
            title: non_empty(self.russian)
                .or_else(|| non_empty(self.name.clone()))
                .unwrap_or_else(|| fallback_title.to_string()),
            original_title: non_empty(self.name),
            title_en,
            score: non_empty(self.score)
                .filter(|s| s != "0.0")
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            year,
            genres: if genres.is_empty() { PLACEHOLDER.to_string() } else { genres },
            description: non_empty(self.description).unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
            status: status_text(self.status.as_deref().unwrap_or_default()),
            poster: self
                .image
                .and_then(|i| non_empty(i.original))
                .map(|path| if path.starts_with("http") { path } else { format!("{SHIKIMORI_URL}{path}") }),
        }
    }
}

#[derive(Clone)]
pub struct ShikimoriClient {
    client: Client,
}

impl Default for ShikimoriClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ShikimoriClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, Error> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }

        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }

    /// Best-ranked match for `title`, or `None` when the search is empty.
    pub async fn lookup(&self, title: &str) -> Result<Option<AnimeInfo>, Error> {
        let hits: Vec<SearchHit> = self
            .get(
                &format!("{SHIKIMORI_URL}/api/animes"),
                &[("search", title), ("limit", "1"), ("order", "ranked")],
            )
            .await?;

        let Some(hit) = hits.first() else {
            return Ok(None);
        };

        let detail: Detail = self
            .get(&format!("{SHIKIMORI_URL}/api/animes/{}", hit.id), &[])
            .await?;
        Ok(Some(detail.into_info(title)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_mapping() {
        let detail: Detail = serde_json::from_str(
            r#"{
                "id": 1,
                "name": "Darling in the FranXX",
                "russian": "Милый во Франксе",
                "english": ["DARLING in the FRANXX"],
                "score": "7.2",
                "aired_on": "2018-01-13",
                "status": "released",
                "genres": [{"name": "Mecha", "russian": "Меха"}, {"name": "Romance", "russian": null}],
                "description": "Далёкое будущее.",
                "image": {"original": "/system/animes/original/35849.jpg"}
            }"#,
        )
        .unwrap();

        let info = detail.into_info("darling in the franxx");
        assert_eq!(info.title, "Милый во Франксе");
        assert_eq!(info.title_en.as_deref(), Some("DARLING in the FRANXX"));
        assert_eq!(info.year, "2018");
        assert_eq!(info.genres, "Меха, Romance");
        assert_eq!(info.status, "Вышло");
        assert_eq!(
            info.poster.as_deref(),
            Some("https://shikimori.one/system/animes/original/35849.jpg")
        );
    }

    #[test]
    fn test_detail_defaults() {
        let detail: Detail = serde_json::from_str(r#"{"id": 2, "status": "weird", "english": [null]}"#).unwrap();
        let info = detail.into_info("unknown show");
        assert_eq!(info.title, "unknown show");
        assert_eq!(info.title_en, None);
        assert_eq!(info.score, "—");
        assert_eq!(info.year, "—");
        assert_eq!(info.genres, "—");
        assert_eq!(info.description, MISSING_DESCRIPTION);
        assert_eq!(info.status, "Неизвестно");
        assert_eq!(info.poster, None);
    }
}
