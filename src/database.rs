// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Database Management
//!
//! Authoritative storage for competitions, trophies, social actions and
//! idempotency keys. Competitions are stored as a JSON body next to a few
//! indexed columns; membership is mirrored into its own table so a user's
//! competitions can be listed without decoding every row.

use crate::engine::throttle::{SocialAction, SocialActionKind};
use crate::errors::{CompetitionError, CompetitionResult};
use crate::logging::AppLogger;
use crate::models::{Competition, CompetitionStatus, CompetitionType, InviteStatus, Trophy};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Database manager for competition storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

fn parse_timestamp(raw: &str) -> CompetitionResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CompetitionError::DecodeFailure(format!("bad timestamp {raw}: {e}")))
}

fn parse_uuid(raw: &str) -> CompetitionResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| CompetitionError::DecodeFailure(format!("bad id {raw}: {e}")))
}

fn invite_status_str(status: InviteStatus) -> &'static str {
    match status {
        InviteStatus::Pending => "pending",
        InviteStatus::Accepted => "accepted",
        InviteStatus::Declined => "declined",
    }
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(database_url: &str) -> CompetitionResult<Self> {
        let is_memory = database_url.contains(":memory:");

        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if !is_memory && database_url.starts_with("sqlite:") && !database_url.contains('?') {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        // Every in-memory connection is its own database, so pin to one
        let pool = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&connection_options)
                .await?
        } else {
            SqlitePoolOptions::new().connect(&connection_options).await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> CompetitionResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competitions (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competition_members (
                competition_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                invite_status TEXT NOT NULL,
                PRIMARY KEY (competition_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_user_id ON competition_members(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trophies (
                id TEXT PRIMARY KEY,
                competition_id TEXT NOT NULL,
                competition_name TEXT NOT NULL,
                competition_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                placement INTEGER NOT NULL,
                score REAL NOT NULL,
                awarded_at TEXT NOT NULL,
                UNIQUE (competition_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trophies_user_id ON trophies(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS social_actions (
                competition_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                target_id TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                day TEXT NOT NULL,
                performed_at TEXT NOT NULL,
                UNIQUE (competition_id, actor_id, target_id, kind, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS idempotency_keys (
                key TEXT PRIMARY KEY,
                operation TEXT NOT NULL,
                result TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn encode(competition: &Competition) -> CompetitionResult<String> {
        serde_json::to_string(competition)
            .map_err(|e| CompetitionError::DecodeFailure(format!("cannot encode competition: {e}")))
    }

    async fn replace_members(
        tx: &mut Transaction<'_, Sqlite>,
        competition: &Competition,
    ) -> CompetitionResult<()> {
        sqlx::query("DELETE FROM competition_members WHERE competition_id = ?1")
            .bind(competition.id.to_string())
            .execute(&mut **tx)
            .await?;

        for user in &competition.users {
            sqlx::query(
                "INSERT INTO competition_members (competition_id, user_id, invite_status) VALUES (?1, ?2, ?3)",
            )
            .bind(competition.id.to_string())
            .bind(&user.user_id)
            .bind(invite_status_str(user.invite_status))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Store a newly created competition
    pub async fn insert_competition(&self, competition: &Competition) -> CompetitionResult<Uuid> {
        let mut tx = self.pool.begin().await?;
        Self::insert_competition_row(&mut tx, competition).await?;
        tx.commit().await?;

        debug!(competition.id = %competition.id, "Competition stored");
        Ok(competition.id)
    }

    /// Store a new competition and claim `key` for it in one transaction.
    ///
    /// When the key was already claimed by an earlier create, nothing is
    /// written and the id stored under the key is returned instead.
    pub async fn insert_competition_once(
        &self,
        competition: &Competition,
        key: Uuid,
        operation: &str,
        now: DateTime<Utc>,
    ) -> CompetitionResult<Uuid> {
        let mut tx = self.pool.begin().await?;

        if let Err(e) = Self::insert_idempotency_row(&mut tx, key, operation, &competition.id.to_string(), now).await
        {
            tx.rollback().await?;
            return match e {
                CompetitionError::IdempotencyKeyReused { .. } => self.stored_competition_id(key, operation).await,
                other => Err(other),
            };
        }
        Self::insert_competition_row(&mut tx, competition).await?;
        tx.commit().await?;

        debug!(competition.id = %competition.id, "Competition stored");
        Ok(competition.id)
    }

    async fn stored_competition_id(&self, key: Uuid, operation: &str) -> CompetitionResult<Uuid> {
        match self.idempotency_result(key).await? {
            Some((stored, result)) if stored == operation => Uuid::parse_str(&result)
                .map_err(|e| CompetitionError::DecodeFailure(format!("stored competition id {result}: {e}"))),
            Some((stored, _)) => Err(CompetitionError::IdempotencyKeyReused {
                key: key.to_string(),
                operation: stored,
            }),
            None => Err(CompetitionError::DecodeFailure(format!("idempotency key {key} vanished"))),
        }
    }

    async fn insert_competition_row(
        tx: &mut Transaction<'_, Sqlite>,
        competition: &Competition,
    ) -> CompetitionResult<()> {
        let body = Self::encode(competition)?;
        sqlx::query(
            r#"
            INSERT INTO competitions (id, owner, status, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(competition.id.to_string())
        .bind(&competition.owner)
        .bind(competition.status.as_str())
        .bind(body)
        .bind(competition.created_at.to_rfc3339())
        .bind(competition.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Self::replace_members(tx, competition).await
    }

    async fn stored_status(
        tx: &mut Transaction<'_, Sqlite>,
        competition_id: Uuid,
    ) -> CompetitionResult<CompetitionStatus> {
        let row = sqlx::query("SELECT status FROM competitions WHERE id = ?1")
            .bind(competition_id.to_string())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CompetitionError::NotFound(competition_id.to_string()))?;
        let status: String = row.try_get("status")?;
        status.parse()
    }

    async fn update_row(
        tx: &mut Transaction<'_, Sqlite>,
        competition: &Competition,
    ) -> CompetitionResult<()> {
        if Self::stored_status(tx, competition.id).await? == CompetitionStatus::Finished {
            return Err(CompetitionError::InvalidTransition {
                from: CompetitionStatus::Finished,
                action: "modify",
            });
        }

        sqlx::query("UPDATE competitions SET status = ?1, body = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(competition.status.as_str())
            .bind(Self::encode(competition)?)
            .bind(competition.updated_at.to_rfc3339())
            .bind(competition.id.to_string())
            .execute(&mut **tx)
            .await?;

        Self::replace_members(tx, competition).await
    }

    /// Overwrite a stored competition. Finished competitions are read-only.
    pub async fn save_competition(&self, competition: &Competition) -> CompetitionResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::update_row(&mut tx, competition).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persist the final state of a competition together with its trophies
    pub async fn finish_competition(
        &self,
        competition: &Competition,
        trophies: &[Trophy],
    ) -> CompetitionResult<()> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        Self::update_row(&mut tx, competition).await?;

        for trophy in trophies {
            sqlx::query(
                r#"
                INSERT INTO trophies (id, competition_id, competition_name, competition_type,
                                      user_id, placement, score, awarded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(trophy.id.to_string())
            .bind(trophy.competition_id.to_string())
            .bind(&trophy.competition_name)
            .bind(trophy.competition_type.as_str())
            .bind(&trophy.user_id)
            .bind(i64::from(trophy.placement))
            .bind(trophy.score)
            .bind(trophy.awarded_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        AppLogger::log_database_operation(
            "finish_competition",
            "trophies",
            true,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        Ok(())
    }

    /// Get competition by ID
    pub async fn get_competition(&self, competition_id: Uuid) -> CompetitionResult<Option<Competition>> {
        let row = sqlx::query("SELECT id, body FROM competitions WHERE id = ?1")
            .bind(competition_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_competition(&row)?)),
            None => Ok(None),
        }
    }

    /// Remove a competition and everything hanging off it except trophies
    pub async fn delete_competition(&self, competition_id: Uuid) -> CompetitionResult<bool> {
        let id = competition_id.to_string();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM competitions WHERE id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM competition_members WHERE competition_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM social_actions WHERE competition_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Competitions the user belongs to (any invite state), newest first
    pub async fn competitions_for_user(&self, user_id: &str) -> CompetitionResult<Vec<Competition>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.body FROM competitions c
            JOIN competition_members m ON m.competition_id = c.id
            WHERE m.user_id = ?1
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_competition).collect()
    }

    /// Ids of competitions that may still change status on their own
    pub async fn unsettled_competition_ids(&self) -> CompetitionResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM competitions WHERE status IN ('scheduled', 'active')")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                parse_uuid(&id)
            })
            .collect()
    }

    fn row_to_competition(row: &SqliteRow) -> CompetitionResult<Competition> {
        let id: String = row.try_get("id")?;
        let body: String = row.try_get("body")?;

        let competition: Competition = serde_json::from_str(&body)
            .map_err(|e| CompetitionError::DecodeFailure(format!("competition {id}: {e}")))?;
        if competition.id.to_string() != id {
            return Err(CompetitionError::DecodeFailure(format!(
                "competition row {id} holds body for {}",
                competition.id
            )));
        }
        competition.validate()?;
        Ok(competition)
    }

    /// Trophies earned by a user, newest first
    pub async fn trophies_for_user(&self, user_id: &str) -> CompetitionResult<Vec<Trophy>> {
        let rows = sqlx::query("SELECT * FROM trophies WHERE user_id = ?1 ORDER BY awarded_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_trophy).collect()
    }

    /// Trophies minted for one competition, by placement
    pub async fn trophies_for_competition(&self, competition_id: Uuid) -> CompetitionResult<Vec<Trophy>> {
        let rows = sqlx::query("SELECT * FROM trophies WHERE competition_id = ?1 ORDER BY placement, user_id")
            .bind(competition_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_trophy).collect()
    }

    fn row_to_trophy(row: &SqliteRow) -> CompetitionResult<Trophy> {
        let id: String = row.try_get("id")?;
        let competition_id: String = row.try_get("competition_id")?;
        let competition_type: String = row.try_get("competition_type")?;
        let placement: i64 = row.try_get("placement")?;
        let awarded_at: String = row.try_get("awarded_at")?;

        Ok(Trophy {
            id: parse_uuid(&id)?,
            competition_id: parse_uuid(&competition_id)?,
            competition_name: row.try_get("competition_name")?,
            competition_type: competition_type.parse::<CompetitionType>()?,
            user_id: row.try_get("user_id")?,
            placement: u32::try_from(placement)
                .map_err(|_| CompetitionError::DecodeFailure(format!("bad placement {placement}")))?,
            score: row.try_get("score")?,
            awarded_at: parse_timestamp(&awarded_at)?,
        })
    }

    /// Record a flex or nudge. A second action in the same daily slot is refused.
    pub async fn record_social_action(&self, action: &SocialAction) -> CompetitionResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO social_actions (competition_id, actor_id, target_id, kind, day, performed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(action.competition_id.to_string())
        .bind(&action.actor_id)
        .bind(action.target_id.as_deref().unwrap_or(""))
        .bind(action.kind.as_str())
        .bind(action.day.to_string())
        .bind(action.performed_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CompetitionError::AlreadyPerformedToday { action: action.kind })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Social actions performed in a competition on one UTC day
    pub async fn social_actions_for_day(
        &self,
        competition_id: Uuid,
        day: NaiveDate,
    ) -> CompetitionResult<Vec<SocialAction>> {
        let rows = sqlx::query("SELECT * FROM social_actions WHERE competition_id = ?1 AND day = ?2")
            .bind(competition_id.to_string())
            .bind(day.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let target_id: String = row.try_get("target_id")?;
                let kind: String = row.try_get("kind")?;
                let day: String = row.try_get("day")?;
                let performed_at: String = row.try_get("performed_at")?;

                Ok(SocialAction {
                    competition_id,
                    actor_id: row.try_get("actor_id")?,
                    target_id: (!target_id.is_empty()).then_some(target_id),
                    kind: kind.parse::<SocialActionKind>()?,
                    day: day
                        .parse()
                        .map_err(|e| CompetitionError::DecodeFailure(format!("bad day {day}: {e}")))?,
                    performed_at: parse_timestamp(&performed_at)?,
                })
            })
            .collect()
    }

    /// Operation and result recorded for an idempotency key, if it was seen before
    pub async fn idempotency_result(&self, key: Uuid) -> CompetitionResult<Option<(String, String)>> {
        let row = sqlx::query("SELECT operation, result FROM idempotency_keys WHERE key = ?1")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("operation")?, row.try_get("result")?))),
            None => Ok(None),
        }
    }

    /// Remember that a mutation completed under `key`. A key can be claimed once.
    pub async fn record_idempotency_key(
        &self,
        key: Uuid,
        operation: &str,
        result: &str,
        now: DateTime<Utc>,
    ) -> CompetitionResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_idempotency_row(&mut tx, key, operation, result, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_idempotency_row(
        tx: &mut Transaction<'_, Sqlite>,
        key: Uuid,
        operation: &str,
        result: &str,
        now: DateTime<Utc>,
    ) -> CompetitionResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO idempotency_keys (key, operation, result, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(key.to_string())
        .bind(operation)
        .bind(result)
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(CompetitionError::IdempotencyKeyReused {
                key: key.to_string(),
                operation: operation.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetitionUser, DistanceUnit, NewCompetition};
    use chrono::TimeZone;

    async fn create_test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn race(owner: &str) -> Competition {
        Competition::new(
            owner,
            NewCompetition {
                name: "Spring race".into(),
                competition_type: CompetitionType::Race,
                workout_filters: Default::default(),
                goal: Some(42.0),
                unit: DistanceUnit::Kilometers,
                lives_budget: None,
                interval_bucket: None,
                duration_hours: None,
            },
            now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_competition() {
        let db = create_test_db().await;
        let mut competition = race("amy");
        competition.users.push(CompetitionUser::invited("ben"));

        let id = db.insert_competition(&competition).await.unwrap();
        let loaded = db.get_competition(id).await.unwrap().unwrap();
        assert_eq!(loaded, competition);

        let for_ben = db.competitions_for_user("ben").await.unwrap();
        assert_eq!(for_ben.len(), 1);
        assert!(db.competitions_for_user("cy").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_competition_is_read_only() {
        let db = create_test_db().await;
        let mut competition = race("amy");
        db.insert_competition(&competition).await.unwrap();

        competition.status = CompetitionStatus::Finished;
        let trophy = Trophy {
            id: Uuid::new_v4(),
            competition_id: competition.id,
            competition_name: competition.name.clone(),
            competition_type: competition.competition_type,
            user_id: "amy".into(),
            placement: 1,
            score: 42.5,
            awarded_at: now(),
        };
        db.finish_competition(&competition, &[trophy.clone()]).await.unwrap();

        assert!(matches!(
            db.save_competition(&competition).await,
            Err(CompetitionError::InvalidTransition { from: CompetitionStatus::Finished, .. })
        ));
        assert_eq!(db.trophies_for_user("amy").await.unwrap(), vec![trophy]);
    }

    #[tokio::test]
    async fn test_corrupt_body_is_decode_failure() {
        let db = create_test_db().await;
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO competitions (id, owner, status, body, created_at, updated_at) VALUES (?1, 'amy', 'lobby', '{\"nope\":1}', ?2, ?2)")
            .bind(id.to_string())
            .bind(now().to_rfc3339())
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(matches!(
            db.get_competition(id).await,
            Err(CompetitionError::DecodeFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_social_action_slot_is_unique() {
        let db = create_test_db().await;
        let action = SocialAction {
            competition_id: Uuid::new_v4(),
            actor_id: "amy".into(),
            target_id: Some("ben".into()),
            kind: SocialActionKind::Nudge,
            day: now().date_naive(),
            performed_at: now(),
        };

        db.record_social_action(&action).await.unwrap();
        assert!(matches!(
            db.record_social_action(&action).await,
            Err(CompetitionError::AlreadyPerformedToday { action: SocialActionKind::Nudge })
        ));

        let history = db
            .social_actions_for_day(action.competition_id, action.day)
            .await
            .unwrap();
        assert_eq!(history, vec![action]);
    }

    #[tokio::test]
    async fn test_idempotency_keys() {
        let db = create_test_db().await;
        let key = Uuid::new_v4();
        assert_eq!(db.idempotency_result(key).await.unwrap(), None);

        db.record_idempotency_key(key, "start", "ok", now()).await.unwrap();
        assert!(matches!(
            db.record_idempotency_key(key, "start", "again", now()).await,
            Err(CompetitionError::IdempotencyKeyReused { .. })
        ));
        assert_eq!(
            db.idempotency_result(key).await.unwrap(),
            Some(("start".to_string(), "ok".to_string()))
        );
    }
}
