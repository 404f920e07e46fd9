use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "tender",
        "bid",
        "award_job",
        "award_job_transition",
        "idx_tender_status",
        "idx_tender_owner_company_id",
        "idx_bid_tender_id",
        "idx_bid_company_id",
        "idx_bid_parent_bid_id",
        "idx_bid_single_accepted_per_tender",
        "idx_award_job_tender_id",
        "idx_award_job_state_available_at",
        "idx_award_job_live_idempotency_key",
        "idx_award_job_transition_job_id",
    ];

    async fn schema_object_count(pool: &crate::DbPool, name: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_every_managed_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for name in MANAGED_SCHEMA_OBJECTS {
            assert_eq!(schema_object_count(&pool, name).await, 1, "missing schema object {name}");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");

        let applied = sqlx::query("SELECT COUNT(*) AS count FROM _sqlx_migrations")
            .fetch_one(&pool)
            .await
            .expect("count applied migrations")
            .get::<i64, _>("count");
        assert_eq!(applied as usize, MIGRATOR.iter().count());

        pool.close().await;
    }

    #[tokio::test]
    async fn schema_rejects_partial_award_facts() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let ts = "2026-05-01T09:00:00.000000Z";
        let result = sqlx::query(
            "INSERT INTO tender (
                id, title, description, closing_at, owner_company_id, status,
                status_changed_at, winning_bid_id, version, created_at, updated_at
             ) VALUES ('T-BAD', 'Roads', '', ?, 'c-1', 'evaluation', ?, 'B-1', 1, ?, ?)",
        )
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .execute(&pool)
        .await;

        assert!(result.is_err(), "winning bid without award timestamp must be rejected");
        pool.close().await;
    }
}
