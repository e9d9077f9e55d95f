//! Slash commands. Everything except `/start` is admin-only.

use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use super::screens::{self, Viewer};
use super::{BotState, HandlerResult, finish, keyboards, texts};
use crate::catalog::{Season, deep_link};
use crate::payments::Term;
use crate::store::{BatchAssign, NewEpisode, StoreError};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "главное меню")]
    Start(String),
    #[command(description = "выдать подписку: /give user_id дни|forever")]
    Give(String),
    #[command(rename = "remove_sub", description = "удалить подписку")]
    RemoveSub(String),
    #[command(description = "добавить серию ответом на видео")]
    Add(String),
    #[command(description = "разобрать загруженные видео")]
    Assign(String),
    #[command(description = "английские названия")]
    Titles,
    #[command(description = "видео в очереди")]
    Pending,
}

pub const GIVE_USAGE: &str = "Использование:\n/give user_id дни\n/give user_id forever";
pub const REMOVE_USAGE: &str = "Использование:\n/remove_sub user_id\nили ответом на сообщение пользователя";
pub const ADD_USAGE: &str = "Использование (ответом на видео):\n/add аниме;озвучка;сезон;серия";
pub const ASSIGN_USAGE: &str = "Использование:\n/assign аниме;озвучка;сезон|фильм;первая_серия;количество";

/// Longest single grant; anything longer is what `forever` is for.
pub const MAX_GRANT_DAYS: u32 = 36_500;

/// `/give <user_id> <days|forever>`
pub fn parse_give(args: &str) -> Result<(i64, Term), &'static str> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [user, term] = parts.as_slice() else {
        return Err(GIVE_USAGE);
    };

    let user_id = user.parse::<i64>().map_err(|_| "❌ ID должен быть числом.")?;
    let term = match term.to_lowercase().as_str() {
        "forever" | "навсегда" => Term::Forever,
        days => match days.parse::<u32>() {
            Ok(n) if n > MAX_GRANT_DAYS => return Err("❌ Слишком большой срок, используйте 'forever'."),
            Ok(n) if n > 0 => Term::Days(n),
            _ => return Err("❌ Дни должны быть положительным числом или 'forever'."),
        },
    };
    Ok((user_id, term))
}

/// Target of `/remove_sub`: the argument, else the author of the replied message.
pub fn parse_target(args: &str, replied_author: Option<UserId>) -> Option<i64> {
    match args.trim() {
        "" => replied_author.map(|id| id.0 as i64),
        arg => arg.parse().ok(),
    }
}

fn split_fields(args: &str, expected: usize) -> Option<Vec<&str>> {
    let fields: Vec<&str> = args.split(';').map(str::trim).collect();
    (fields.len() == expected && fields.iter().all(|f| !f.is_empty())).then_some(fields)
}

fn positive(field: &str) -> Option<u32> {
    field.parse::<u32>().ok().filter(|n| *n > 0)
}

/// `/add <anime>;<dub>;<season>;<episode>`, file taken from the replied video.
pub fn parse_add(args: &str, file_ref: String) -> Result<NewEpisode, &'static str> {
    let fields = split_fields(args, 4).ok_or(ADD_USAGE)?;
    let season = fields[2].parse::<Season>().map_err(|_| "❌ Сезон должен быть числом или 'фильм'.")?;
    let episode = positive(fields[3]).ok_or("❌ Номер серии должен быть положительным числом.")?;

    Ok(NewEpisode {
        anime: fields[0].to_string(),
        dub: fields[1].to_string(),
        season,
        episode,
        file_ref,
    })
}

/// `/assign <anime>;<dub>;<season|фильм>;<start_episode>;<count>`
pub fn parse_assign(args: &str) -> Result<BatchAssign, &'static str> {
    let fields = split_fields(args, 5).ok_or(ASSIGN_USAGE)?;
    let season = fields[2].parse::<Season>().map_err(|_| "❌ Сезон должен быть числом или 'фильм'.")?;
    let start_episode = positive(fields[3]).ok_or("❌ Первая серия должна быть положительным числом.")?;
    let count = positive(fields[4]).ok_or("❌ Количество должно быть положительным числом.")?;
    if start_episode.checked_add(count - 1).is_none() {
        return Err("❌ Номера серий выходят за допустимый диапазон.");
    }

    Ok(BatchAssign {
        anime: fields[0].to_lowercase(),
        dub: fields[1].to_string(),
        season,
        start_episode,
        count,
    })
}

pub async fn handle(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    finish(dispatch(&bot, &msg, cmd, &state).await)
}

async fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> HandlerResult {
    bot.send_message(msg.chat.id, text)
        .parse_mode(teloxide::types::ParseMode::Html)
        .await?;
    Ok(())
}

async fn dispatch(bot: &Bot, msg: &Message, cmd: Command, state: &BotState) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let viewer = Viewer { user: user.id, chat: msg.chat.id };

    if !matches!(cmd, Command::Start(_)) && !state.is_admin(user.id) {
        info!("Non-admin {} tried {:?}", user.id, cmd);
        return reply(bot, msg, texts::NO_RIGHTS).await;
    }

    match cmd {
        Command::Start(param) => start(bot, msg, state, viewer, &param).await,
        Command::Give(args) => give(bot, msg, state, &args).await,
        Command::RemoveSub(args) => remove_sub(bot, msg, state, &args).await,
        Command::Add(args) => add(bot, msg, state, &args).await,
        Command::Assign(args) => assign(bot, msg, state, &args).await,
        Command::Titles => {
            let animes = state.db.anime_list()?;
            if animes.is_empty() {
                return reply(bot, msg, texts::EMPTY_CATALOG).await;
            }
            bot.send_message(msg.chat.id, texts::CHOOSE_TITLE)
                .reply_markup(keyboards::titles(&animes))
                .await?;
            Ok(())
        }
        Command::Pending => reply(bot, msg, texts::pending_report(state.db.pending_count()?)).await,
    }
}

async fn start(bot: &Bot, msg: &Message, state: &BotState, viewer: Viewer, param: &str) -> HandlerResult {
    if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
        warn!("Could not delete /start message: {}", e);
    }

    let names = deep_link::candidates(param);
    if names.is_empty() {
        return screens::welcome(bot, state, viewer).await;
    }

    if !state.is_entitled(viewer.user)? {
        return screens::access_closed(bot, state, viewer).await;
    }

    for name in &names {
        if let Some(anime) = state.db.anime_by_name(name)? {
            info!("🔗 Deep link to '{}' from {}", anime.name, viewer.user);
            return screens::anime_card(bot, state, viewer, &anime).await;
        }
    }
    screens::show_text(bot, state, viewer, texts::NOT_FOUND, keyboards::back_to_menu()).await
}

async fn give(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> HandlerResult {
    let (user_id, term) = match parse_give(args) {
        Ok(parsed) => parsed,
        Err(usage) => return reply(bot, msg, usage).await,
    };

    match state.db.grant(user_id, term, &term.plan_label(), Utc::now()) {
        Ok(_) => reply(bot, msg, texts::give_report(user_id, term)).await?,
        Err(StoreError::OutOfRange(detail)) => {
            warn!("Grant to {} refused: {}", user_id, detail);
            return reply(bot, msg, texts::TERM_TOO_LONG).await;
        }
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = bot.send_message(ChatId(user_id), texts::give_notice(term)).await {
        warn!("Could not notify user {} about the grant: {}", user_id, e);
    }
    Ok(())
}

async fn remove_sub(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> HandlerResult {
    let replied_author = msg.reply_to_message().and_then(|m| m.from.as_ref()).map(|u| u.id);
    let Some(user_id) = parse_target(args, replied_author) else {
        return reply(bot, msg, REMOVE_USAGE).await;
    };

    let text = if state.db.revoke(user_id)? {
        format!("✅ Подписка пользователя {user_id} удалена.")
    } else {
        format!("ℹ️ У пользователя {user_id} нет подписки.")
    };
    reply(bot, msg, text).await
}

async fn add(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> HandlerResult {
    let Some(file_ref) = msg
        .reply_to_message()
        .and_then(|m| m.video())
        .map(|v| v.file.id.0.clone())
    else {
        return reply(bot, msg, texts::ADD_NEEDS_REPLY).await;
    };

    let episode = match parse_add(args, file_ref) {
        Ok(episode) => episode,
        Err(usage) => return reply(bot, msg, usage).await,
    };

    state.db.add_episode(&episode, Utc::now())?;
    info!("➕ Added '{}' [{}] {} ep {}", episode.anime, episode.dub, episode.season.as_db(), episode.episode);
    reply(
        bot,
        msg,
        texts::episode_added(&episode.anime, &episode.dub, &episode.season.report_line(), episode.episode),
    )
    .await
}

async fn assign(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> HandlerResult {
    let batch = match parse_assign(args) {
        Ok(batch) => batch,
        Err(usage) => return reply(bot, msg, usage).await,
    };

    match state.db.assign_pending(&batch, Utc::now()) {
        Ok(range) => reply(bot, msg, texts::assign_report(&batch, &range)).await,
        Err(StoreError::NoPendingVideos) => reply(bot, msg, texts::NO_PENDING).await,
        Err(StoreError::OutOfRange(_)) => reply(bot, msg, ASSIGN_USAGE).await,
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("/start anime_abc", "animebot").unwrap(),
            Command::Start("anime_abc".into())
        );
        assert_eq!(Command::parse("/start", "animebot").unwrap(), Command::Start(String::new()));
        assert_eq!(
            Command::parse("/remove_sub 42", "animebot").unwrap(),
            Command::RemoveSub("42".into())
        );
        assert_eq!(Command::parse("/titles", "animebot").unwrap(), Command::Titles);
    }

    #[test]
    fn test_parse_give() {
        assert_eq!(parse_give("42 30"), Ok((42, Term::Days(30))));
        assert_eq!(parse_give("42 forever"), Ok((42, Term::Forever)));
        assert_eq!(parse_give("42 НАВСЕГДА"), Ok((42, Term::Forever)));
        assert_eq!(parse_give("42"), Err(GIVE_USAGE));
        assert_eq!(parse_give("abc 30"), Err("❌ ID должен быть числом."));
        assert!(parse_give("42 0").is_err());
        assert!(parse_give("42 -5").is_err());
        assert!(parse_give("42 4000000000").is_err());
        assert_eq!(parse_give("42 36500"), Ok((42, Term::Days(MAX_GRANT_DAYS))));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("  ", Some(UserId(7))), Some(7));
        assert_eq!(parse_target("12", Some(UserId(7))), Some(12));
        assert_eq!(parse_target("", None), None);
        assert_eq!(parse_target("x", None), None);
    }

    #[test]
    fn test_parse_add() {
        let ep = parse_add("Naruto ; AniDub ; 2 ; 5", "file-1".into()).unwrap();
        assert_eq!(ep.anime, "Naruto");
        assert_eq!(ep.dub, "AniDub");
        assert_eq!(ep.season, Season::Number(2));
        assert_eq!(ep.episode, 5);
        assert_eq!(ep.file_ref, "file-1");

        assert!(parse_add("naruto;anidub;2", "f".into()).is_err());
        assert!(parse_add("naruto;;2;5", "f".into()).is_err());
        assert!(parse_add("naruto;anidub;2;0", "f".into()).is_err());
    }

    #[test]
    fn test_parse_assign() {
        let batch = parse_assign("Frieren;AniLibria;фильм;1;3").unwrap();
        assert_eq!(batch.anime, "frieren");
        assert_eq!(batch.season, Season::Film);
        assert_eq!(batch.start_episode, 1);
        assert_eq!(batch.count, 3);

        assert_eq!(parse_assign("frieren;anilibria;1;1").unwrap_err(), ASSIGN_USAGE);
        assert!(parse_assign("frieren;anilibria;0;1;3").is_err());
        assert!(parse_assign("frieren;anilibria;1;1;0").is_err());
        assert!(parse_assign("x;y;1;4294967295;2").is_err());
        assert_eq!(parse_assign("x;y;1;4294967295;1").unwrap().start_episode, u32::MAX);
    }
}
