//! Inline keyboards for every screen.

use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::catalog::Callback;
use crate::catalog::pages::{EPISODES_PER_ROW, Page, anime_button_title, cut_title};
use crate::payments::{Plan, PriceList};
use crate::store::{AnimeEntry, DubEntry, EpisodeEntry, SeasonEntry};

const TITLE_BUTTON_LEN: usize = 40;

fn button(text: impl Into<String>, callback: Callback) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, callback.encode())
}

fn menu_button() -> InlineKeyboardButton {
    button("⬅️ Назад в меню", Callback::Menu)
}

fn nav_row(page: &Page<'_, impl Sized>, to: impl Fn(usize) -> Callback, next_label: &str) -> Option<Vec<InlineKeyboardButton>> {
    let mut row = Vec::new();
    if page.has_prev {
        row.push(button("⬅️ Назад", to(page.number - 1)));
    }
    if page.has_next {
        row.push(button(next_label, to(page.number + 1)));
    }
    (!row.is_empty()).then_some(row)
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("▶️ Смотреть аниме", Callback::List { page: 0 })],
        vec![InlineKeyboardButton::switch_inline_query_current_chat("🔍 Поиск", "")],
        vec![button("💳 Купить подписку", Callback::Plans)],
        vec![button("ℹ️ Статус подписки", Callback::Status)],
    ])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![menu_button()]])
}

pub fn access_closed() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("💳 Купить подписку", Callback::Plans)],
        vec![menu_button()],
    ])
}

pub fn welcome(registered: bool) -> InlineKeyboardMarkup {
    let start = if registered {
        button("▶️ Смотреть аниме в 4K", Callback::Menu)
    } else {
        button("📝 Регистрация", Callback::Register)
    };
    InlineKeyboardMarkup::new(vec![vec![start]])
}

pub fn after_registration() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("▶️ Смотреть аниме в 4K", Callback::List { page: 0 })]])
}

pub fn anime_list(page: &Page<'_, AnimeEntry>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .items
        .iter()
        .map(|anime| vec![button(anime_button_title(&anime.name), Callback::Anime { key: anime.key.clone() })])
        .collect();

    if let Some(nav) = nav_row(page, |p| Callback::List { page: p }, "➡️ Вперёд") {
        rows.push(nav);
    }
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

pub fn anime_card(seasons: &[SeasonEntry]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = seasons
        .iter()
        .map(|s| vec![button(s.season.label(), Callback::Season { key: s.key.clone() })])
        .collect();
    rows.push(vec![button("⬅️ Назад к списку аниме", Callback::List { page: 0 })]);
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

pub fn dubs(anime_key: &str, dubs: &[DubEntry]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = dubs
        .iter()
        .map(|d| vec![button(format!("▶️ Озвучка: {}", d.dub), Callback::Dub { key: d.key.clone(), page: 0 })])
        .collect();
    rows.push(vec![button("⬅️ Назад к аниме", Callback::Anime { key: anime_key.to_string() })]);
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

pub fn episodes(dub_key: &str, season_key: &str, page: &Page<'_, EpisodeEntry>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .items
        .chunks(EPISODES_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|ep| button(ep.episode.to_string(), Callback::Episode { id: ep.id, page: page.number }))
                .collect()
        })
        .collect();

    if let Some(nav) = nav_row(page, |p| Callback::Dub { key: dub_key.to_string(), page: p }, "➡️ Далее") {
        rows.push(nav);
    }
    rows.push(vec![button("⬅️ Назад к озвучкам", Callback::Season { key: season_key.to_string() })]);
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

/// Playback controls. Neighbours carry the episode-grid page that holds them,
/// `page` is the one holding the current episode. `download` is set for
/// episodes stored as links.
pub fn playback(
    dub_key: &str,
    page: usize,
    prev: Option<(i64, usize)>,
    next: Option<(i64, usize)>,
    download: Option<Url>,
) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    let mut nav = Vec::new();
    if let Some((id, page)) = prev {
        nav.push(button("⬅️ Предыдущая серия", Callback::Episode { id, page }));
    }
    if let Some((id, page)) = next {
        nav.push(button("➡️ Следующая серия", Callback::Episode { id, page }));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    rows.push(vec![button("⬅️ Вернуться к сериям", Callback::Dub { key: dub_key.to_string(), page })]);
    rows.push(vec![menu_button()]);
    if let Some(url) = download {
        rows.push(vec![InlineKeyboardButton::url("🌐 Скачать серию из облака", url)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn plans(prices: &PriceList) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Plan::ALL
        .into_iter()
        .map(|plan| vec![button(prices.button_text(plan), Callback::Buy(plan))])
        .collect();
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

pub fn payment_methods(crypto_enabled: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if crypto_enabled {
        rows.push(vec![button("💎 Оплатить криптовалютой", Callback::PayCrypto)]);
    }
    rows.push(vec![button("💵 Оплатить рублями", Callback::PayTransfer)]);
    rows.push(vec![menu_button()]);
    InlineKeyboardMarkup::new(rows)
}

pub fn confirm_transfer() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("✅ Подтвердить оплату", Callback::ConfirmPayment)],
        vec![menu_button()],
    ])
}

pub fn crypto_invoice(pay_url: Url) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::url("💳 Перейти к оплате", pay_url)],
        vec![menu_button()],
    ])
}

pub fn review(payment_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Выдать", Callback::Approve { payment: payment_id }),
        button("❌ Отклонить", Callback::Reject { payment: payment_id }),
    ]])
}

pub fn search_hit(anime_key: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("▶️ Открыть", Callback::Anime { key: anime_key.to_string() })],
        vec![menu_button()],
    ])
}

/// Attached to inline results, which leave the bot's chat.
pub fn open_in_bot(link: Url) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("▶️ Смотреть в боте", link)]])
}

pub fn titles(animes: &[AnimeEntry]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        animes
            .iter()
            .map(|a| vec![button(cut_title(&a.name, TITLE_BUTTON_LEN), Callback::EditTitle { key: a.key.clone() })])
            .collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Season;
    use crate::catalog::pages::{EPISODES_PER_PAGE, paginate};
    use crate::catalog::token::MAX_CALLBACK_LEN;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callbacks(markup: &InlineKeyboardMarkup) -> Vec<Vec<String>> {
        markup
            .inline_keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| match &b.kind {
                        InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                        _ => format!("<{}>", b.text),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_episode_grid_shape() {
        let eps: Vec<EpisodeEntry> = (1..=57).map(|n| EpisodeEntry { id: i64::from(n), episode: n }).collect();

        let first = paginate(&eps, 0, EPISODES_PER_PAGE);
        let rows = callbacks(&episodes("aaaaaaaaaaaa", "bbbbbbbbbbbb", &first));
        // 10 rows of 5, nav (next only), back, menu
        assert_eq!(rows.len(), 13);
        assert!(rows[..10].iter().all(|r| r.len() == 5));
        assert_eq!(rows[10], vec!["dub|aaaaaaaaaaaa|1"]);
        assert_eq!(rows[11], vec!["season|bbbbbbbbbbbb"]);

        let second = paginate(&eps, 1, EPISODES_PER_PAGE);
        let rows = callbacks(&episodes("aaaaaaaaaaaa", "bbbbbbbbbbbb", &second));
        assert_eq!(rows[0], vec!["ep|51|1", "ep|52|1", "ep|53|1", "ep|54|1", "ep|55|1"]);
        assert_eq!(rows[1], vec!["ep|56|1", "ep|57|1"]);
        assert_eq!(rows[2], vec!["dub|aaaaaaaaaaaa|0"]);
    }

    #[test]
    fn test_anime_list_pagination_buttons() {
        let animes: Vec<AnimeEntry> = (0..12)
            .map(|i| AnimeEntry { key: format!("{i:012}"), name: format!("anime {i}") })
            .collect();
        let rows = callbacks(&anime_list(&paginate(&animes, 0, 10)));
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[10], vec!["list|1"]);
        assert_eq!(rows[11], vec!["menu"]);

        let rows = callbacks(&anime_list(&paginate(&animes, 1, 10)));
        assert_eq!(rows[2], vec!["list|0"]);
    }

    #[test]
    fn test_playback_controls() {
        let url = Url::parse("https://cloud.example/ep1.mp4").unwrap();
        let rows = callbacks(&playback("aaaaaaaaaaaa", 2, None, Some((9, 2)), Some(url)));
        assert_eq!(rows[0], vec!["ep|9|2"]);
        assert_eq!(rows[1], vec!["dub|aaaaaaaaaaaa|2"]);
        assert_eq!(rows[2], vec!["menu"]);
        assert_eq!(rows[3], vec!["<🌐 Скачать серию из облака>"]);

        let rows = callbacks(&playback("aaaaaaaaaaaa", 0, None, None, None));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_playback_steps_across_grid_pages() {
        // Current and next episode on the second grid page, previous on the first
        let rows = callbacks(&playback("aaaaaaaaaaaa", 1, Some((50, 0)), Some((52, 1)), None));
        assert_eq!(rows[0], vec!["ep|50|0", "ep|52|1"]);
        assert_eq!(rows[1], vec!["dub|aaaaaaaaaaaa|1"]);
    }

    #[test]
    fn test_all_callbacks_fit_limit() {
        let seasons = vec![SeasonEntry { key: "cccccccccccc".into(), season: Season::Film }];
        let markups = [
            main_menu(),
            plans(&PriceList::default()),
            payment_methods(true),
            review(i64::MAX),
            anime_card(&seasons),
        ];
        for markup in &markups {
            for data in callbacks(markup).into_iter().flatten() {
                assert!(data.len() <= MAX_CALLBACK_LEN, "{data}");
            }
        }
    }

    #[test]
    fn test_payment_methods_without_crypto() {
        assert_eq!(callbacks(&payment_methods(false)), vec![vec!["pay|transfer"], vec!["menu"]]);
    }
}
