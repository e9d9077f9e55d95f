//! `/start anime_<payload>` links that open an anime card directly.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

pub const PREFIX: &str = "anime_";

/// Start parameter for `name`: URL-safe base64 without padding.
pub fn encode(name: &str) -> String {
    format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(name.as_bytes()))
}

/// `t.me` link that starts `bot_username` on the card of `name`.
pub fn share_url(bot_username: &str, name: &str) -> String {
    format!("https://t.me/{}?start={}", bot_username.trim_start_matches('@'), encode(name))
}

/// Names a start parameter may refer to, most likely first.
///
/// Current links carry base64; older ones carried the percent-encoded name,
/// so both readings are offered and the caller picks the one in the catalog.
pub fn candidates(param: &str) -> Vec<String> {
    let Some(payload) = param.trim().strip_prefix(PREFIX) else {
        return Vec::new();
    };

    let mut names = Vec::new();
    if let Some(name) = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| !s.trim().is_empty())
    {
        names.push(name);
    }

    // Legacy payloads are unquoted as-is; reading `_` as a space is a last resort.
    for raw in [payload.to_string(), payload.replace('_', " ")] {
        if let Ok(name) = urlencoding::decode(&raw) {
            let name = name.into_owned();
            if !name.trim().is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_cyrillic() {
        let link = encode("милый во франксе");
        assert!(link.starts_with(PREFIX));
        assert!(link.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'));
        assert_eq!(candidates(&link)[0], "милый во франксе");
    }

    #[test]
    fn test_share_url_opens_card() {
        let url = share_url("@anime4k_bot", "frieren");
        let param = url.strip_prefix("https://t.me/anime4k_bot?start=").unwrap();
        assert_eq!(candidates(param)[0], "frieren");
    }

    #[test]
    fn test_legacy_percent_encoded() {
        let names = candidates("anime_naruto%20shippuden");
        assert!(names.contains(&"naruto shippuden".to_string()));
    }

    #[test]
    fn test_legacy_underscore_kept_before_space_reading() {
        let names = candidates("anime_re_zero");
        let literal = names.iter().position(|n| n == "re_zero").unwrap();
        let spaced = names.iter().position(|n| n == "re zero").unwrap();
        assert!(literal < spaced);
    }

    #[test]
    fn test_not_a_deep_link() {
        assert!(candidates("ref_123").is_empty());
        assert!(candidates("anime_").is_empty());
    }
}
