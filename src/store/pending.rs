use chrono::{DateTime, Utc};
use rusqlite::{TransactionBehavior, params};
use tracing::info;

use super::catalog::{NewEpisode, insert_episode};
use super::{Database, StoreError, to_ts};
use crate::catalog::Season;

/// Assign the oldest `count` pending clips to consecutive episodes.
#[derive(Debug, Clone)]
pub struct BatchAssign {
    pub anime: String,
    pub dub: String,
    pub season: Season,
    pub start_episode: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedRange {
    pub count: u32,
    pub first: u32,
    pub last: u32,
}

impl Database {
    /// Stores an uploaded clip or link. Returns false if the message was already stored.
    pub fn add_pending(
        &self,
        message_id: i64,
        file_ref: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO pending_videos (message_id, file_ref, received_at) VALUES (?1, ?2, ?3)",
            params![message_id, file_ref, to_ts(received_at)],
        )?;
        Ok(inserted > 0)
    }

    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pending_videos", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Moves pending clips into the catalog in arrival order, numbering them
    /// from `start_episode`. Consumed rows are deleted in the same transaction.
    pub fn assign_pending(&self, batch: &BatchAssign, now: DateTime<Utc>) -> Result<AssignedRange, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let clips: Vec<(i64, String)> = {
            let mut stmt = tx.prepare(
                "SELECT message_id, file_ref FROM pending_videos
                 ORDER BY received_at ASC, message_id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![batch.count], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        if clips.is_empty() {
            return Err(StoreError::NoPendingVideos);
        }
        let count = clips.len() as u32;
        let last = batch.start_episode.checked_add(count - 1).ok_or_else(|| {
            StoreError::OutOfRange(format!("episodes {} + {}", batch.start_episode, count))
        })?;

        for ((message_id, file_ref), episode) in clips.iter().zip(batch.start_episode..=last) {
            let new_episode = NewEpisode {
                anime: batch.anime.clone(),
                dub: batch.dub.clone(),
                season: batch.season,
                episode,
                file_ref: file_ref.clone(),
            };
            insert_episode(&tx, &new_episode, now)?;
            tx.execute("DELETE FROM pending_videos WHERE message_id = ?1", params![message_id])?;
        }
        tx.commit()?;

        let range = AssignedRange {
            count,
            first: batch.start_episode,
            last,
        };
        info!(
            "🎞 Assigned {} pending clips to {} / {} / {} (episodes {}-{})",
            count, batch.anime, batch.dub, batch.season.as_db(), range.first, range.last
        );
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(count: u32) -> BatchAssign {
        BatchAssign {
            anime: "Darling in the Franxx".to_string(),
            dub: "AniDub".to_string(),
            season: Season::Number(1),
            start_episode: 3,
            count,
        }
    }

    #[test]
    fn test_add_pending_ignores_duplicates() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        assert!(db.add_pending(10, "file-a", now).unwrap());
        assert!(!db.add_pending(10, "file-b", now).unwrap());
        assert_eq!(db.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_assign_in_arrival_order() {
        let db = Database::in_memory().unwrap();
        let t0 = Utc::now();
        // message ids deliberately out of order relative to arrival
        db.add_pending(30, "third", t0 + Duration::seconds(2)).unwrap();
        db.add_pending(10, "first", t0).unwrap();
        db.add_pending(20, "second", t0 + Duration::seconds(1)).unwrap();

        let range = db.assign_pending(&batch(2), t0).unwrap();
        assert_eq!(range, AssignedRange { count: 2, first: 3, last: 4 });
        assert_eq!(db.pending_count().unwrap(), 1);

        let anime = db.anime_by_name("darling in the franxx").unwrap().unwrap();
        let season = &db.seasons(&anime.key).unwrap()[0];
        let dub = &db.dubs(&season.key).unwrap()[0];
        let files: Vec<String> = db
            .episodes(&dub.key)
            .unwrap()
            .into_iter()
            .map(|e| db.episode(e.id).unwrap().unwrap().file_ref)
            .collect();
        assert_eq!(files, vec!["first", "second"]);
    }

    #[test]
    fn test_assign_fewer_than_requested() {
        let db = Database::in_memory().unwrap();
        db.add_pending(1, "only", Utc::now()).unwrap();
        let range = db.assign_pending(&batch(12), Utc::now()).unwrap();
        assert_eq!(range, AssignedRange { count: 1, first: 3, last: 3 });
        assert_eq!(db.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_assign_past_last_episode_number_keeps_clips() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        db.add_pending(1, "first", now).unwrap();
        db.add_pending(2, "second", now + Duration::seconds(1)).unwrap();

        let batch = BatchAssign { start_episode: u32::MAX, ..batch(2) };
        assert!(matches!(db.assign_pending(&batch, now), Err(StoreError::OutOfRange(_))));
        assert_eq!(db.pending_count().unwrap(), 2);
        assert!(db.anime_by_name("darling in the franxx").unwrap().is_none());
    }

    #[test]
    fn test_assign_empty_fails() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(db.assign_pending(&batch(5), Utc::now()), Err(StoreError::NoPendingVideos)));
    }
}
