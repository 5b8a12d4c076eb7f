//! Background sweep of expired login sessions.
//!
//! Expired sessions are already ignored when a token is resolved; this only
//! keeps the table from growing without bound.

use anyhow::Result;
use tokio::time::{interval, Duration};

use crate::config::CleanupConfig;
use crate::DbPool;

pub struct SessionCleanup {
    db: DbPool,
    config: CleanupConfig,
}

impl SessionCleanup {
    pub fn new(db: DbPool, config: CleanupConfig) -> Self {
        Self { db, config }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();

        if !self.config.enabled {
            tracing::debug!("Cleanup is disabled, skipping");
            return Ok(stats);
        }

        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= datetime('now')")
            .execute(&self.db)
            .await?;
        stats.sessions_removed = result.rows_affected();

        if stats.sessions_removed > 0 {
            tracing::info!(
                sessions = stats.sessions_removed,
                "Removed expired sessions"
            );
        } else {
            tracing::debug!("No expired sessions to remove");
        }

        Ok(stats)
    }
}

#[derive(Debug, Default)]
pub struct CleanupStats {
    pub sessions_removed: u64,
}

/// Spawn the background cleanup task
pub fn spawn_cleanup_task(db: DbPool, config: CleanupConfig) {
    if !config.enabled {
        tracing::info!("Session cleanup is disabled");
        return;
    }

    let interval_secs = config.interval_seconds.max(1);
    tracing::info!(interval_secs, "Starting session cleanup task");

    let cleanup = SessionCleanup::new(db, config);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = cleanup.run_cleanup().await {
                tracing::error!(error = %e, "Cleanup cycle failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use crate::api::auth::create_session;
    use crate::db;

    #[tokio::test]
    async fn test_removes_only_expired_sessions() {
        let pool = db::init_in_memory().await.unwrap();
        let account = AccountStore::new(pool.clone())
            .register("kim", "password-1")
            .await
            .unwrap();

        create_session(&pool, &account.id, 24).await.unwrap();
        sqlx::query(
            "INSERT INTO sessions (id, account_id, token_hash, expires_at) VALUES ('old', ?, 'h', '2000-01-01 00:00:00')",
        )
        .bind(&account.id)
        .execute(&pool)
        .await
        .unwrap();

        let cleanup = SessionCleanup::new(pool.clone(), CleanupConfig::default());
        let stats = cleanup.run_cleanup().await.unwrap();
        assert_eq!(stats.sessions_removed, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_disabled_cleanup_is_a_no_op() {
        let pool = db::init_in_memory().await.unwrap();
        let config = CleanupConfig {
            enabled: false,
            interval_seconds: 60,
        };
        let stats = SessionCleanup::new(pool, config).run_cleanup().await.unwrap();
        assert_eq!(stats.sessions_removed, 0);
    }
}
