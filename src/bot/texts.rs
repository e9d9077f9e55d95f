//! Message texts. Anything user-provided goes through `html::escape`.

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Moscow;
use teloxide::utils::html::escape;

use crate::catalog::description;
use crate::catalog::pages::title_case;
use crate::metadata::AnimeInfo;
use crate::payments::{Plan, Term};
use crate::store::{AssignedRange, BatchAssign, PaymentStatus, Subscription, Video};

pub const MAIN_MENU: &str = "📋 Главное меню:";
pub const ALREADY_REGISTERED: &str = "Ты уже зарегистрирован 😉";
pub const ACCESS_CLOSED: &str = "⛔ Доступ закрыт. Подписка закончилась.";
pub const ACCESS_CLOSED_ALERT: &str = "⛔ Подписка закончилась";
pub const EPISODE_NEEDS_SUBSCRIPTION: &str = "⛔ Для просмотра серии нужна подписка";
pub const CHOOSE_ANIME: &str = "🎌 Выбери аниме:";
pub const CHOOSE_DUB: &str = "📺 Выбор озвучки:";
pub const CHOOSE_EPISODE: &str = "🎬 Выбор серии:";
pub const EMPTY_CATALOG: &str = "📭 Каталог пока пуст";
pub const NOT_FOUND: &str = "❌ Ничего не найдено";
pub const GONE: &str = "Раздел больше недоступен";
pub const CHOOSE_PLAN: &str = "💳 Выберите срок подписки:";
pub const SEND_RECEIPT: &str = "📎 Отправьте скрин или файл чека перевода";
pub const WAIT_FOR_APPROVAL: &str = "⏳ Ожидайте выдачи подписки.\n\n🕓 По будням: 04:00–21:00 МСК\n🕙 По выходным: 10:00–01:00 МСК\n\nВыдача обычно от нескольких минут до 3 часов\n(иногда дольше)";
pub const PICK_PLAN_FIRST: &str = "Сначала выберите тариф";
pub const INVOICE_FAILED: &str = "Ошибка создания счета";
pub const PLAN_MISSING: &str = "Ошибка периода";
pub const NO_RIGHTS: &str = "❌ У тебя нет прав для этой команды";
pub const VIDEO_SAVED: &str = "✅ Видео сохранено и готово для добавления в базу";
pub const LINK_SAVED: &str = "✅ Ссылка сохранена и готова для добавления в базу";
pub const NO_PENDING: &str = "❌ Нет видео для добавления!";
pub const ADD_NEEDS_REPLY: &str = "❌ Команда должна быть в ответ на видео!";
pub const CHOOSE_TITLE: &str = "Выберите аниме для редактирования английского названия:";
pub const EMPTY_TITLE: &str = "⚠ Название не может быть пустым";
pub const REJECTED: &str = "❌ Оплата не подтверждена. Если это ошибка, напишите администратору.";
pub const TERM_TOO_LONG: &str = "❌ Срок слишком большой, используйте forever.";

/// "1 день", "3 дня", "7 дней".
pub fn days(n: u32) -> String {
    let word = match (n % 10, n % 100) {
        (_, 11..=14) => "дней",
        (1, _) => "день",
        (2..=4, _) => "дня",
        _ => "дней",
    };
    format!("{n} {word}")
}

pub fn welcome(trial_days: u32) -> String {
    format!(
        "🌠 Привет!\nЯ бот для просмотра аниме в 4К качестве👘.\nПервые {} можно будет опробовать меня абсолютно бесплатно!",
        days(trial_days)
    )
}

pub fn registered(trial_days: u32) -> String {
    format!(
        "✅ Регистрация завершена!\n\n🎁 Тебе доступно {} бесплатного просмотра.\nПриятного просмотра 🍿",
        days(trial_days)
    )
}

/// "16.10.2026 21:00" in Moscow time.
pub fn moscow_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Moscow).format("%d.%m.%Y %H:%M").to_string()
}

pub fn subscription_status(subscription: Option<&Subscription>, now: DateTime<Utc>) -> String {
    match subscription {
        Some(sub) if sub.is_active(now) => match sub.expires_at {
            None => "✅ Активная подписка:\n📅 До: НАВСЕГДА".to_string(),
            Some(expires_at) => format!("✅ Активная подписка:\n📅 До: {}", moscow_time(expires_at)),
        },
        _ => "❌ Подписка неактивна".to_string(),
    }
}

/// Anime card caption. Without Shikimori data only the title is shown.
pub fn anime_card(stored_name: &str, info: Option<&AnimeInfo>) -> String {
    let Some(info) = info else {
        return format!("<b>{}</b>", escape(&title_case(stored_name)));
    };

    format!(
        "<b>{}</b>\n⭐ Рейтинг: <b>{}</b>\n🎭 Жанры: {}\n📅 Год: {}\n📺 Статус: {}\n\n📝 {}",
        escape(&info.title),
        escape(&info.score),
        escape(&info.genres),
        escape(&info.year),
        info.status,
        escape(&description::summary(&info.description)),
    )
}

pub fn episode_caption(video: &Video) -> String {
    format!(
        "<b>{}</b>\n<b><i>{}</i></b>\n<i>{}</i>",
        escape(&title_case(&video.anime.name)),
        escape(&video.dub.dub),
        video.season.season.episode_caption(video.episode),
    )
}

pub fn plan_selected(plan: Plan, price: u32) -> String {
    format!(
        "💳 Вы выбрали подписку: <b>{}</b>\n\n💵 Цена: <b>{}₽</b>\n\nВыберите способ оплаты:",
        plan.title(),
        price
    )
}

pub fn transfer_instructions(price: u32, details: &str) -> String {
    format!(
        "📌 Переведите <b>{}₽</b> на номер:\n{}\n\nПосле оплаты нажмите кнопку ниже для подтверждения.",
        price,
        escape(details)
    )
}

/// Invoice message with approximate amounts per asset.
pub fn crypto_invoice(plan: Plan, price: u32, quotes: &[(String, String)]) -> String {
    let mut text = format!(
        "💎 Счёт на подписку <b>{}</b>\n💵 Сумма: <b>{}₽</b>",
        plan.title(),
        price
    );
    if !quotes.is_empty() {
        text.push_str("\n\n≈ В криптовалюте:");
        for (asset, amount) in quotes {
            text.push_str(&format!("\n• {amount} {asset}"));
        }
    }
    text.push_str("\n\nПосле оплаты подписка активируется автоматически.");
    text
}

pub fn receipt_for_admins(user_id: i64, username: Option<&str>, plan: Plan, price: u32, payment_id: i64) -> String {
    let who = match username {
        Some(name) => format!("{user_id} (@{})", escape(name)),
        None => user_id.to_string(),
    };
    format!(
        "💰 Новая заявка на подписку\n\n👤 ID: {}\n📅 Тариф: {}\n💵 Сумма: {}₽\n🧾 Заявка #{}",
        who,
        plan.title(),
        price,
        payment_id
    )
}

pub fn subscription_activated(term: Term) -> String {
    match term {
        Term::Days(days) => format!("🎉 Ваша подписка на {days} дней активирована!"),
        Term::Forever => "🎉 Ваша подписка НАВСЕГДА активирована!".to_string(),
    }
}

pub fn give_report(user_id: i64, term: Term) -> String {
    format!("✅ Пользователю {} выдана подписка {}.", user_id, term.describe())
}

pub fn give_notice(term: Term) -> String {
    format!("🎉 Вам выдана подписка {}!", term.describe())
}

pub fn payment_settled(payment_id: i64, user_id: i64, term: Term) -> String {
    format!("✅ Заявка #{} одобрена: пользователю {} выдана подписка {}.", payment_id, user_id, term.describe())
}

/// Alert for a review button pressed after the request was resolved.
pub fn already_processed(status: Option<PaymentStatus>) -> &'static str {
    match status {
        Some(PaymentStatus::Paid) => "Заявка уже одобрена",
        Some(PaymentStatus::Rejected) => "Заявка уже отклонена",
        Some(PaymentStatus::Pending) => "Заявка обрабатывается",
        None => GONE,
    }
}

pub fn payment_rejected(payment_id: i64, user_id: i64) -> String {
    format!("❌ Заявка #{payment_id} пользователя {user_id} отклонена.")
}

pub fn assign_report(batch: &BatchAssign, range: &AssignedRange) -> String {
    format!(
        "✅ Успешно добавлено {} серий\n\n🎬 {}\n🎙 Озвучка: {}\n{}\n▶️ Серии: {}-{}",
        range.count,
        escape(&title_case(&batch.anime)),
        escape(&batch.dub),
        batch.season.report_line(),
        range.first,
        range.last,
    )
}

pub fn episode_added(anime: &str, dub: &str, season_line: &str, episode: u32) -> String {
    format!(
        "✅ Серия добавлена:\n\n🎬 {}\n🎙 Озвучка: {}\n{}\n▶️ Серия: {}",
        escape(&title_case(anime)),
        escape(dub),
        season_line,
        episode,
    )
}

pub fn pending_report(count: usize) -> String {
    format!("📦 Видео в очереди на добавление: {count}")
}

pub fn edit_title_prompt(name: &str) -> String {
    format!("✏ Введите новое английское название для:\n\n<b>{}</b>", escape(&title_case(name)))
}

pub fn title_updated(name: &str, english: &str) -> String {
    format!(
        "✅ English название обновлено:\n\n<b>{}</b> → <b>{}</b>",
        escape(&title_case(name)),
        escape(english)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Season;
    use crate::store::{AnimeEntry, DubEntry, SeasonEntry};
    use chrono::TimeZone;

    fn sub(expires_at: Option<DateTime<Utc>>) -> Subscription {
        Subscription { user_id: 1, plan: "30_days".into(), expires_at }
    }

    #[test]
    fn test_already_processed_names_outcome() {
        assert_eq!(already_processed(Some(PaymentStatus::Paid)), "Заявка уже одобрена");
        assert_eq!(already_processed(Some(PaymentStatus::Rejected)), "Заявка уже отклонена");
        assert_eq!(already_processed(None), GONE);
    }

    #[test]
    fn test_trial_length_follows_config() {
        assert_eq!(days(1), "1 день");
        assert_eq!(days(3), "3 дня");
        assert_eq!(days(7), "7 дней");
        assert_eq!(days(11), "11 дней");
        assert_eq!(days(21), "21 день");
        assert!(welcome(3).contains("Первые 3 дня"));
        assert!(registered(14).contains("доступно 14 дней бесплатного"));
    }

    #[test]
    fn test_status_in_moscow_time() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2026, 1, 31, 18, 30, 0).unwrap();
        assert_eq!(
            subscription_status(Some(&sub(Some(expires))), now),
            "✅ Активная подписка:\n📅 До: 31.01.2026 21:30"
        );
    }

    #[test]
    fn test_status_forever_and_inactive() {
        let now = Utc::now();
        assert!(subscription_status(Some(&sub(None)), now).contains("НАВСЕГДА"));
        assert_eq!(
            subscription_status(Some(&sub(Some(now - chrono::Duration::days(1)))), now),
            "❌ Подписка неактивна"
        );
        assert_eq!(subscription_status(None, now), "❌ Подписка неактивна");
    }

    #[test]
    fn test_caption_escapes_names() {
        let video = Video {
            id: 1,
            anime: AnimeEntry { key: "k".into(), name: "tom & jerry".into() },
            season: SeasonEntry { key: "s".into(), season: Season::Number(2) },
            dub: DubEntry { key: "d".into(), dub: "<AniDub>".into() },
            episode: 5,
            file_ref: "file".into(),
        };
        assert_eq!(
            episode_caption(&video),
            "<b>Tom &amp; Jerry</b>\n<b><i>&lt;AniDub&gt;</i></b>\n<i>2 сезон 5 серия</i>"
        );
    }

    #[test]
    fn test_card_without_metadata() {
        assert_eq!(anime_card("one piece", None), "<b>One Piece</b>");
    }

    #[test]
    fn test_activation_texts() {
        assert_eq!(subscription_activated(Term::Days(30)), "🎉 Ваша подписка на 30 дней активирована!");
        assert!(subscription_activated(Term::Forever).contains("НАВСЕГДА"));
        assert_eq!(give_report(5, Term::Days(7)), "✅ Пользователю 5 выдана подписка на 7 дней.");
        assert_eq!(give_report(5, Term::Forever), "✅ Пользователю 5 выдана подписка НАВСЕГДА.");
    }

    #[test]
    fn test_crypto_invoice_lists_quotes() {
        let text = crypto_invoice(Plan::Month, 99, &[("TON".into(), "0.50000000".into())]);
        assert!(text.contains("<b>99₽</b>"));
        assert!(text.contains("• 0.50000000 TON"));
        assert!(!crypto_invoice(Plan::Month, 99, &[]).contains("≈"));
    }
}
