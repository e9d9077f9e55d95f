//! Callback tokens for the inline keyboards.
//!
//! Every screen of the bot is reachable through one of these tokens. Catalog
//! nodes are addressed by short persisted keys (see [`node_key`]) so a token
//! always fits in Telegram's 64-byte callback data limit.

use crate::payments::plans::Plan;

/// Telegram rejects callback data longer than this.
pub const MAX_CALLBACK_LEN: usize = 64;

const KEY_LEN: usize = 12;
const SEP: char = '|';

/// Stable identity of a catalog node: truncated MD5 over the `|`-joined parts.
pub fn node_key(parts: &[&str]) -> String {
    let digest = md5::compute(parts.join("|"));
    let mut hex = format!("{:x}", digest);
    hex.truncate(KEY_LEN);
    hex
}

fn is_key(s: &str) -> bool {
    s.len() == KEY_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Menu,
    Register,
    Plans,
    Status,
    List { page: usize },
    Anime { key: String },
    Season { key: String },
    Dub { key: String, page: usize },
    Episode { id: i64, page: usize },
    Buy(Plan),
    PayCrypto,
    PayTransfer,
    ConfirmPayment,
    Approve { payment: i64 },
    Reject { payment: i64 },
    EditTitle { key: String },
}

impl Callback {
    pub fn encode(&self) -> String {
        match self {
            Callback::Menu => "menu".to_string(),
            Callback::Register => "register".to_string(),
            Callback::Plans => "plans".to_string(),
            Callback::Status => "status".to_string(),
            Callback::List { page } => format!("list{SEP}{page}"),
            Callback::Anime { key } => format!("anime{SEP}{key}"),
            Callback::Season { key } => format!("season{SEP}{key}"),
            Callback::Dub { key, page } => format!("dub{SEP}{key}{SEP}{page}"),
            Callback::Episode { id, page } => format!("ep{SEP}{id}{SEP}{page}"),
            Callback::Buy(plan) => format!("buy{SEP}{}", plan.key()),
            Callback::PayCrypto => format!("pay{SEP}crypto"),
            Callback::PayTransfer => format!("pay{SEP}transfer"),
            Callback::ConfirmPayment => "confirm".to_string(),
            Callback::Approve { payment } => format!("approve{SEP}{payment}"),
            Callback::Reject { payment } => format!("reject{SEP}{payment}"),
            Callback::EditTitle { key } => format!("title{SEP}{key}"),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(SEP);
        let head = parts.next()?;
        let rest: Vec<&str> = parts.collect();

        let callback = match (head, rest.as_slice()) {
            ("menu", []) => Callback::Menu,
            ("register", []) => Callback::Register,
            ("plans", []) => Callback::Plans,
            ("status", []) => Callback::Status,
            ("list", []) => Callback::List { page: 0 },
            ("list", [page]) => Callback::List { page: page.parse().ok()? },
            ("anime", [key]) if is_key(key) => Callback::Anime { key: key.to_string() },
            ("season", [key]) if is_key(key) => Callback::Season { key: key.to_string() },
            ("dub", [key]) if is_key(key) => Callback::Dub { key: key.to_string(), page: 0 },
            ("dub", [key, page]) if is_key(key) => Callback::Dub {
                key: key.to_string(),
                page: page.parse().ok()?,
            },
            ("ep", [id, page]) => Callback::Episode {
                id: id.parse().ok()?,
                page: page.parse().ok()?,
            },
            ("buy", [plan]) => Callback::Buy(Plan::from_key(plan)?),
            ("pay", ["crypto"]) => Callback::PayCrypto,
            ("pay", ["transfer"]) => Callback::PayTransfer,
            ("confirm", []) => Callback::ConfirmPayment,
            ("approve", [id]) => Callback::Approve { payment: id.parse().ok()? },
            ("reject", [id]) => Callback::Reject { payment: id.parse().ok()? },
            ("title", [key]) if is_key(key) => Callback::EditTitle { key: key.to_string() },
            _ => return None,
        };
        Some(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_is_stable_and_short() {
        let a = node_key(&["one piece", "1"]);
        let b = node_key(&["one piece", "1"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), KEY_LEN);
        assert_ne!(a, node_key(&["one piece", "2"]));
    }

    #[test]
    fn test_node_key_separates_parts() {
        // "ab|c" and "a|bc" must not collide
        assert_ne!(node_key(&["ab", "c"]), node_key(&["a", "bc"]));
    }

    #[test]
    fn test_all_tokens_parse_back_within_limit() {
        let key = node_key(&["frieren", "anilibria", "1"]);
        let tokens = vec![
            Callback::Menu,
            Callback::Register,
            Callback::Plans,
            Callback::Status,
            Callback::List { page: 12 },
            Callback::Anime { key: key.clone() },
            Callback::Season { key: key.clone() },
            Callback::Dub { key: key.clone(), page: 3 },
            Callback::Episode { id: i64::MAX, page: usize::MAX },
            Callback::Buy(Plan::Forever),
            Callback::PayCrypto,
            Callback::PayTransfer,
            Callback::ConfirmPayment,
            Callback::Approve { payment: 42 },
            Callback::Reject { payment: 42 },
            Callback::EditTitle { key },
        ];
        for token in tokens {
            let encoded = token.encode();
            assert!(encoded.len() <= MAX_CALLBACK_LEN, "{encoded} too long");
            assert_eq!(Callback::parse(&encoded), Some(token));
        }
    }

    #[test]
    fn test_dub_without_page_defaults_to_first() {
        let key = node_key(&["x"]);
        assert_eq!(
            Callback::parse(&format!("dub|{key}")),
            Some(Callback::Dub { key, page: 0 })
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(Callback::parse(""), None);
        assert_eq!(Callback::parse("anime|not-a-key"), None);
        assert_eq!(Callback::parse("ep|abc|0"), None);
        assert_eq!(Callback::parse("buy|3_days"), None);
        assert_eq!(Callback::parse("menu|extra"), None);
        assert_eq!(Callback::parse("list|-1"), None);
    }
}
