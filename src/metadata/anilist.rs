//! AniList GraphQL poster lookup.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Error, USER_AGENT};

const ANILIST_API: &str = "https://graphql.anilist.co";

const POSTER_QUERY: &str = r#"
    query ($search: String) {
        Media(search: $search, type: ANIME) {
            coverImage { extraLarge large }
        }
    }
"#;

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    search: &'a str,
}

#[derive(Deserialize)]
struct GraphQLResponse {
    data: Option<Data>,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "Media")]
    media: Option<Media>,
}

#[derive(Deserialize)]
struct Media {
    #[serde(rename = "coverImage")]
    cover_image: Option<CoverImage>,
}

#[derive(Deserialize)]
struct CoverImage {
    #[serde(rename = "extraLarge")]
    extra_large: Option<String>,
    large: Option<String>,
}

/// Strips punctuation AniList search trips over.
pub fn search_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, ':' | '!' | '"' | '\'' | '‘' | '’'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Clone)]
pub struct AnilistClient {
    client: Client,
}

impl Default for AnilistClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AnilistClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Largest cover image of the best match, if any.
    pub async fn poster(&self, title: &str) -> Result<Option<String>, Error> {
        let search = search_title(title);
        if search.is_empty() {
            return Ok(None);
        }

        let request_body = GraphQLRequest {
            query: POSTER_QUERY,
            variables: Variables { search: &search },
        };

        let response = self
            .client
            .post(ANILIST_API)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        // AniList answers 404 when nothing matches
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }

        let body: GraphQLResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(body
            .data
            .and_then(|d| d.media)
            .and_then(|m| m.cover_image)
            .and_then(|c| c.extra_large.or(c.large)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_title() {
        assert_eq!(search_title("Re:Zero ‘Kara’ Hajimeru!"), "ReZero Kara Hajimeru");
        assert_eq!(search_title(" \"!\" "), "");
    }

    #[test]
    fn test_cover_image_preference() {
        let body: GraphQLResponse = serde_json::from_str(
            r#"{"data":{"Media":{"coverImage":{"extraLarge":null,"large":"https://img/large.jpg"}}}}"#,
        )
        .unwrap();
        let cover = body.data.unwrap().media.unwrap().cover_image.unwrap();
        assert_eq!(cover.extra_large.or(cover.large).as_deref(), Some("https://img/large.jpg"));
    }
}
