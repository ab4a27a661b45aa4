//! Reservation persistence.
//!
//! The add/del contract mirrors the in-memory flow: a row exists exactly
//! for reservations that are permanent, local, and live in memory.

use super::DbError;
use crate::state::ResvKind;
use sqlx::SqlitePool;

/// A persisted reservation row.
#[derive(Debug, Clone)]
pub struct ResvRow {
    pub mask: String,
    pub kind: ResvKind,
    pub reason: String,
    pub set_by: String,
    pub set_at: i64,
}

fn kind_tag(kind: ResvKind) -> &'static str {
    match kind {
        ResvKind::Channel => "channel",
        ResvKind::Nick => "nick",
    }
}

/// Repository over the `resvs` table.
pub struct BanRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BanRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a permanent reservation.
    pub async fn add_resv(
        &self,
        kind: ResvKind,
        mask: &str,
        reason: &str,
        set_by: &str,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO resvs (mask, kind, reason, set_by, set_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(mask)
        .bind(kind_tag(kind))
        .bind(reason)
        .bind(set_by)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete a persisted reservation. Returns whether a row existed.
    pub async fn del_resv(&self, mask: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM resvs WHERE mask = ?")
            .bind(mask)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every persisted reservation, for startup.
    pub async fn load_resvs(&self) -> Result<Vec<ResvRow>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, String, i64)>(
            "SELECT mask, kind, reason, set_by, set_at FROM resvs",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(mask, kind, reason, set_by, set_at)| ResvRow {
                mask,
                kind: if kind == "channel" {
                    ResvKind::Channel
                } else {
                    ResvKind::Nick
                },
                reason: reason.unwrap_or_default(),
                set_by,
                set_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    #[tokio::test]
    async fn add_del_roundtrip() {
        let db = Database::new(":memory:").await.unwrap();
        db.bans()
            .add_resv(ResvKind::Channel, "#spam", "spam channel", "ops!o@h{ops}")
            .await
            .unwrap();
        db.bans()
            .add_resv(ResvKind::Nick, "dcc-*", "dcc bots", "ops!o@h{ops}")
            .await
            .unwrap();

        let rows = db.bans().load_resvs().await.unwrap();
        assert_eq!(rows.len(), 2);
        let chan = rows.iter().find(|r| r.mask == "#spam").unwrap();
        assert_eq!(chan.kind, ResvKind::Channel);
        assert_eq!(chan.reason, "spam channel");

        assert!(db.bans().del_resv("#spam").await.unwrap());
        assert!(!db.bans().del_resv("#spam").await.unwrap());
        assert_eq!(db.bans().load_resvs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_on_same_mask() {
        let db = Database::new(":memory:").await.unwrap();
        db.bans()
            .add_resv(ResvKind::Nick, "Evil*", "first", "a!a@h{a}")
            .await
            .unwrap();
        db.bans()
            .add_resv(ResvKind::Nick, "Evil*", "second", "b!b@h{b}")
            .await
            .unwrap();
        let rows = db.bans().load_resvs().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "second");
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new(path).await.unwrap();
            db.bans()
                .add_resv(ResvKind::Channel, "#spam", "x", "ops!o@h{ops}")
                .await
                .unwrap();
        }

        let db = Database::new(path).await.unwrap();
        let rows = db.bans().load_resvs().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mask, "#spam");
    }
}
