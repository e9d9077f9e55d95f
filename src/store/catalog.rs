use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Database, StoreError, to_ts};
use crate::catalog::{Season, node_key};

/// An episode to be inserted; `anime` is normalized to lower case on insert.
#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub anime: String,
    pub dub: String,
    pub season: Season,
    pub episode: u32,
    /// Telegram file id or an http(s) link.
    pub file_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeEntry {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonEntry {
    pub key: String,
    pub season: Season,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DubEntry {
    pub key: String,
    pub dub: String,
}

/// Everything the episode screen needs to know about a dub node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DubSelection {
    pub anime: AnimeEntry,
    pub season: SeasonEntry,
    pub dub: DubEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeEntry {
    pub id: i64,
    pub episode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: i64,
    pub anime: AnimeEntry,
    pub season: SeasonEntry,
    pub dub: DubEntry,
    pub episode: u32,
    pub file_ref: String,
}

impl Video {
    /// Link episodes are served as a download button instead of a video.
    pub fn is_link(&self) -> bool {
        self.file_ref.starts_with("http://") || self.file_ref.starts_with("https://")
    }
}

fn season_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Season> {
    let raw: String = row.get(idx)?;
    raw.parse::<Season>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const VIDEO_COLUMNS: &str = "id, anime_key, anime, season_key, season, dub_key, dub, episode, file_ref";

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        anime: AnimeEntry { key: row.get(1)?, name: row.get(2)? },
        season: SeasonEntry { key: row.get(3)?, season: season_at(row, 4)? },
        dub: DubEntry { key: row.get(5)?, dub: row.get(6)? },
        episode: row.get(7)?,
        file_ref: row.get(8)?,
    })
}

/// Inserts or replaces the file of an (anime, dub, season, episode) slot.
pub(crate) fn insert_episode(
    conn: &Connection,
    episode: &NewEpisode,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let anime = episode.anime.trim().to_lowercase();
    let dub = episode.dub.trim();
    let season = episode.season.as_db();

    let anime_key = node_key(&[&anime]);
    let season_key = node_key(&[&anime, &season]);
    let dub_key = node_key(&[&anime, dub, &season]);

    let id = conn.query_row(
        "INSERT INTO videos (anime, anime_key, dub, season, season_key, dub_key, episode, file_ref, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(anime, dub, season, episode) DO UPDATE SET
            file_ref = excluded.file_ref,
            added_at = excluded.added_at
         RETURNING id",
        params![anime, anime_key, dub, season, season_key, dub_key, episode.episode, episode.file_ref, to_ts(now)],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Escapes LIKE wildcards in user input.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Database {
    pub fn add_episode(&self, episode: &NewEpisode, now: DateTime<Utc>) -> Result<i64, StoreError> {
        insert_episode(&self.conn(), episode, now)
    }

    /// All anime, sorted by name.
    pub fn anime_list(&self) -> Result<Vec<AnimeEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT anime_key, anime FROM videos ORDER BY anime")?;
        let rows = stmt.query_map([], |row| Ok(AnimeEntry { key: row.get(0)?, name: row.get(1)? }))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn anime_by_key(&self, key: &str) -> Result<Option<AnimeEntry>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT anime_key, anime FROM videos WHERE anime_key = ?1 LIMIT 1",
                params![key],
                |row| Ok(AnimeEntry { key: row.get(0)?, name: row.get(1)? }),
            )
            .optional()?)
    }

    pub fn anime_by_name(&self, name: &str) -> Result<Option<AnimeEntry>, StoreError> {
        self.anime_by_key(&node_key(&[&name.trim().to_lowercase()]))
    }

    pub fn seasons(&self, anime_key: &str) -> Result<Vec<SeasonEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT season_key, season FROM videos WHERE anime_key = ?1")?;
        let rows = stmt.query_map(params![anime_key], |row| {
            Ok(SeasonEntry { key: row.get(0)?, season: season_at(row, 1)? })
        })?;
        let mut seasons = rows.collect::<Result<Vec<_>, _>>()?;
        seasons.sort_by_key(|s| s.season);
        Ok(seasons)
    }

    pub fn season_by_key(&self, key: &str) -> Result<Option<(AnimeEntry, SeasonEntry)>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT anime_key, anime, season_key, season FROM videos WHERE season_key = ?1 LIMIT 1",
                params![key],
                |row| {
                    Ok((
                        AnimeEntry { key: row.get(0)?, name: row.get(1)? },
                        SeasonEntry { key: row.get(2)?, season: season_at(row, 3)? },
                    ))
                },
            )
            .optional()?)
    }

    pub fn dubs(&self, season_key: &str) -> Result<Vec<DubEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT dub_key, dub FROM videos WHERE season_key = ?1 ORDER BY dub")?;
        let rows = stmt.query_map(params![season_key], |row| Ok(DubEntry { key: row.get(0)?, dub: row.get(1)? }))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn dub_by_key(&self, key: &str) -> Result<Option<DubSelection>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT anime_key, anime, season_key, season, dub_key, dub FROM videos WHERE dub_key = ?1 LIMIT 1",
                params![key],
                |row| {
                    Ok(DubSelection {
                        anime: AnimeEntry { key: row.get(0)?, name: row.get(1)? },
                        season: SeasonEntry { key: row.get(2)?, season: season_at(row, 3)? },
                        dub: DubEntry { key: row.get(4)?, dub: row.get(5)? },
                    })
                },
            )
            .optional()?)
    }

    pub fn episodes(&self, dub_key: &str) -> Result<Vec<EpisodeEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, episode FROM videos WHERE dub_key = ?1 ORDER BY episode")?;
        let rows = stmt.query_map(params![dub_key], |row| Ok(EpisodeEntry { id: row.get(0)?, episode: row.get(1)? }))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn episode(&self, id: i64) -> Result<Option<Video>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"),
                params![id],
                video_from_row,
            )
            .optional()?)
    }

    /// Ids of the nearest previous and next episodes of the same dub.
    pub fn neighbours(&self, video: &Video) -> Result<(Option<i64>, Option<i64>), StoreError> {
        let conn = self.conn();
        let prev = conn
            .query_row(
                "SELECT id FROM videos WHERE dub_key = ?1 AND episode < ?2 ORDER BY episode DESC LIMIT 1",
                params![video.dub.key, video.episode],
                |row| row.get(0),
            )
            .optional()?;
        let next = conn
            .query_row(
                "SELECT id FROM videos WHERE dub_key = ?1 AND episode > ?2 ORDER BY episode ASC LIMIT 1",
                params![video.dub.key, video.episode],
                |row| row.get(0),
            )
            .optional()?;
        Ok((prev, next))
    }

    /// Case-insensitive substring search over anime names.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<AnimeEntry>, StoreError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT anime_key, anime FROM videos WHERE anime LIKE ?1 ESCAPE '\\' ORDER BY anime LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![like_pattern(&query), limit as i64], |row| {
            Ok(AnimeEntry { key: row.get(0)?, name: row.get(1)? })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_english_title(&self, anime_key: &str, title: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO titles (anime_key, title_en) VALUES (?1, ?2)
             ON CONFLICT(anime_key) DO UPDATE SET title_en = excluded.title_en",
            params![anime_key, title.trim()],
        )?;
        Ok(())
    }

    pub fn english_title(&self, anime_key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row("SELECT title_en FROM titles WHERE anime_key = ?1", params![anime_key], |row| row.get(0))
            .optional()?)
    }
}
