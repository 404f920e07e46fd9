use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};
use tracing::debug;

use tenderbridge_core::domain::job::{
    AwardCommitRequest, AwardJob, AwardJobId, AwardJobState, AwardJobTransition,
    JobTransitionId, OperationKey,
};
use tenderbridge_core::domain::tender::TenderId;
use tenderbridge_core::store::{AwardJobQueue, StoreError};

use super::{
    encode_optional_timestamp, encode_timestamp, parse_optional_timestamp, parse_timestamp,
    parse_u32, store_error, RepositoryError,
};
use crate::DbPool;

const JOB_COLUMNS: &str = "
    id,
    tender_id,
    operation_kind,
    payload_json,
    idempotency_key,
    state,
    retry_count,
    max_retries,
    available_at,
    claimed_by,
    claimed_at,
    last_error,
    result_fingerprint,
    state_version,
    created_at,
    updated_at";

pub struct SqlAwardJobQueue {
    pool: DbPool,
}

impl SqlAwardJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AwardJobQueue for SqlAwardJobQueue {
    async fn insert_job(
        &self,
        job: &AwardJob,
        transition: &AwardJobTransition,
    ) -> Result<(), StoreError> {
        let payload_json = encode_payload(&job.payload)?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let inserted = sqlx::query(
            "INSERT INTO award_job (
                id,
                tender_id,
                operation_kind,
                payload_json,
                idempotency_key,
                state,
                retry_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                result_fingerprint,
                state_version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id.0)
        .bind(&job.tender_id.0)
        .bind(&job.operation_kind)
        .bind(&payload_json)
        .bind(&job.idempotency_key.0)
        .bind(job.state.as_str())
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(encode_timestamp(&job.available_at))
        .bind(job.claimed_by.as_deref())
        .bind(encode_optional_timestamp(job.claimed_at.as_ref()))
        .bind(job.last_error.as_deref())
        .bind(job.result_fingerprint.as_deref())
        .bind(i64::from(job.state_version))
        .bind(encode_timestamp(&job.created_at))
        .bind(encode_timestamp(&job.updated_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                return Err(StoreError::Duplicate(format!(
                    "live award job for key `{}`",
                    job.idempotency_key
                )));
            }
            Err(error) => return Err(store_error(error)),
        }

        append_transition(&mut tx, transition).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn find_job(&self, id: &AwardJobId) -> Result<Option<AwardJob>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM award_job WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(job_from_row).transpose()?)
    }

    async fn find_live_job(&self, key: &OperationKey) -> Result<Option<AwardJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM award_job
             WHERE idempotency_key = ? AND state NOT IN ('committed', 'failed')
             LIMIT 1"
        ))
        .bind(&key.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(job_from_row).transpose()?)
    }

    async fn list_jobs_for_tender(
        &self,
        tender_id: &TenderId,
    ) -> Result<Vec<AwardJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM award_job
             WHERE tender_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&tender_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_jobs(
        &self,
        state: Option<AwardJobState>,
        limit: u32,
    ) -> Result<Vec<AwardJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM award_job
             WHERE (?1 IS NULL OR state = ?1)
             ORDER BY updated_at DESC, id ASC
             LIMIT ?2"
        ))
        .bind(state.map(|state| state.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn next_due_job(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<AwardJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM award_job
             WHERE (state IN ('enqueued', 'retryable_failed') AND available_at <= ?)
                OR (state = 'running' AND claimed_at < ?)
             ORDER BY available_at ASC, created_at ASC
             LIMIT 1"
        ))
        .bind(encode_timestamp(&now))
        .bind(encode_timestamp(&stale_before))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(job_from_row).transpose()?)
    }

    async fn save_job(
        &self,
        job: &AwardJob,
        expected_state_version: u32,
        transition: &AwardJobTransition,
    ) -> Result<(), StoreError> {
        let payload_json = encode_payload(&job.payload)?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let result = sqlx::query(
            "UPDATE award_job SET
                payload_json = ?,
                state = ?,
                retry_count = ?,
                max_retries = ?,
                available_at = ?,
                claimed_by = ?,
                claimed_at = ?,
                last_error = ?,
                result_fingerprint = ?,
                state_version = ?,
                updated_at = ?
             WHERE id = ? AND state_version = ?",
        )
        .bind(&payload_json)
        .bind(job.state.as_str())
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(encode_timestamp(&job.available_at))
        .bind(job.claimed_by.as_deref())
        .bind(encode_optional_timestamp(job.claimed_at.as_ref()))
        .bind(job.last_error.as_deref())
        .bind(job.result_fingerprint.as_deref())
        .bind(i64::from(job.state_version))
        .bind(encode_timestamp(&job.updated_at))
        .bind(&job.id.0)
        .bind(i64::from(expected_state_version))
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobConflict(job.id.clone()));
        }

        append_transition(&mut tx, transition).await?;
        tx.commit().await.map_err(store_error)?;

        debug!(
            event_name = "db.award_job.saved",
            job_id = %job.id,
            state = %job.state,
            state_version = job.state_version,
            "award job state persisted"
        );
        Ok(())
    }

    async fn list_transitions(
        &self,
        job_id: &AwardJobId,
    ) -> Result<Vec<AwardJobTransition>, StoreError> {
        let rows = sqlx::query(
            "SELECT
                id,
                job_id,
                tender_id,
                from_state,
                to_state,
                transition_reason,
                error_class,
                decision_context_json,
                actor_id,
                state_version,
                occurred_at
             FROM award_job_transition
             WHERE job_id = ?
             ORDER BY state_version ASC, occurred_at ASC",
        )
        .bind(&job_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(transition_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

async fn append_transition(
    conn: &mut SqliteConnection,
    transition: &AwardJobTransition,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO award_job_transition (
            id,
            job_id,
            tender_id,
            from_state,
            to_state,
            transition_reason,
            error_class,
            decision_context_json,
            actor_id,
            state_version,
            occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transition.id.0)
    .bind(&transition.job_id.0)
    .bind(&transition.tender_id.0)
    .bind(transition.from_state.as_ref().map(AwardJobState::as_str))
    .bind(transition.to_state.as_str())
    .bind(&transition.transition_reason)
    .bind(transition.error_class.as_deref())
    .bind(&transition.decision_context_json)
    .bind(&transition.actor_id)
    .bind(i64::from(transition.state_version))
    .bind(encode_timestamp(&transition.occurred_at))
    .execute(&mut *conn)
    .await
    .map_err(store_error)?;

    Ok(())
}

fn encode_payload(payload: &AwardCommitRequest) -> Result<String, StoreError> {
    serde_json::to_string(payload)
        .map_err(|error| RepositoryError::Encode(format!("award job payload: {error}")).into())
}

fn job_from_row(row: SqliteRow) -> Result<AwardJob, RepositoryError> {
    let state_raw = row.try_get::<String, _>("state")?;
    let state = AwardJobState::parse(&state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown award job state `{state_raw}`")))?;

    let payload_json = row.try_get::<String, _>("payload_json")?;
    let payload = serde_json::from_str::<AwardCommitRequest>(&payload_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid award job payload: {error}")))?;

    Ok(AwardJob {
        id: AwardJobId(row.try_get("id")?),
        tender_id: TenderId(row.try_get("tender_id")?),
        operation_kind: row.try_get("operation_kind")?,
        payload,
        idempotency_key: OperationKey(row.try_get("idempotency_key")?),
        state,
        retry_count: parse_u32("retry_count", row.try_get("retry_count")?)?,
        max_retries: parse_u32("max_retries", row.try_get("max_retries")?)?,
        available_at: parse_timestamp("available_at", row.try_get("available_at")?)?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        last_error: row.try_get("last_error")?,
        result_fingerprint: row.try_get("result_fingerprint")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn transition_from_row(row: SqliteRow) -> Result<AwardJobTransition, RepositoryError> {
    let from_state = row
        .try_get::<Option<String>, _>("from_state")?
        .map(|value| {
            AwardJobState::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown from_state `{value}`")))
        })
        .transpose()?;

    let to_state_raw = row.try_get::<String, _>("to_state")?;
    let to_state = AwardJobState::parse(&to_state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown to_state `{to_state_raw}`")))?;

    Ok(AwardJobTransition {
        id: JobTransitionId(row.try_get("id")?),
        job_id: AwardJobId(row.try_get("job_id")?),
        tender_id: TenderId(row.try_get("tender_id")?),
        from_state,
        to_state,
        transition_reason: row.try_get("transition_reason")?,
        error_class: row.try_get("error_class")?,
        decision_context_json: row.try_get("decision_context_json")?,
        actor_id: row.try_get("actor_id")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use tenderbridge_core::domain::bid::BidId;
    use tenderbridge_core::domain::job::{AwardCommitRequest, AwardJobState};
    use tenderbridge_core::domain::tender::TenderId;
    use tenderbridge_core::jobs::{AwardJobEngine, RetryPolicy};
    use tenderbridge_core::store::{AwardJobQueue, StoreError};

    use super::SqlAwardJobQueue;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_queue_round_trips_job_and_audit_trail() {
        let pool = setup_pool().await;
        let tender_id = TenderId("T-Q-1".to_string());
        insert_tender(&pool, &tender_id).await;
        let queue = SqlAwardJobQueue::new(pool.clone());
        let engine = AwardJobEngine::default();
        let now = parse_ts("2026-05-01T12:00:00Z");

        let created = engine.create_job(request(&tender_id), "system", now);
        queue.insert_job(&created.job, &created.transition).await.expect("insert job");

        let found = queue.find_job(&created.job.id).await.expect("find job");
        assert_eq!(found, Some(created.job.clone()));
        let live = queue.find_live_job(&created.job.idempotency_key).await.expect("find live");
        assert_eq!(live, Some(created.job.clone()));

        let due = queue
            .next_due_job(now, engine.stale_before(now))
            .await
            .expect("next due")
            .expect("job is due");
        let read_version = due.state_version;
        let claimed = engine.claim(due, "worker-a", now).expect("claim");
        queue.save_job(&claimed.job, read_version, &claimed.transition).await.expect("save claim");

        let transitions = queue.list_transitions(&created.job.id).await.expect("transitions");
        assert_eq!(transitions, vec![created.transition, claimed.transition]);

        pool.close().await;
    }

    #[tokio::test]
    async fn live_key_rejects_second_job_until_terminal() {
        let pool = setup_pool().await;
        let tender_id = TenderId("T-Q-2".to_string());
        insert_tender(&pool, &tender_id).await;
        let queue = SqlAwardJobQueue::new(pool.clone());
        let engine = AwardJobEngine::default();
        let now = parse_ts("2026-05-01T12:00:00Z");

        let first = engine.create_job(request(&tender_id), "system", now);
        queue.insert_job(&first.job, &first.transition).await.expect("insert first");

        let second = engine.create_job(request(&tender_id), "system", now);
        let error = queue
            .insert_job(&second.job, &second.transition)
            .await
            .expect_err("duplicate live key must fail");
        assert!(matches!(error, StoreError::Duplicate(_)));
        assert_eq!(queue.find_job(&second.job.id).await.expect("find"), None);

        let claimed = engine.claim(first.job.clone(), "worker-a", now).expect("claim");
        queue.save_job(&claimed.job, 1, &claimed.transition).await.expect("save claim");
        let failed = engine
            .fail(claimed.job.clone(), "gateway refused", "ledger", RetryPolicy::FailTerminal, now)
            .expect("fail");
        queue
            .save_job(&failed.job, claimed.job.state_version, &failed.transition)
            .await
            .expect("save failure");

        queue.insert_job(&second.job, &second.transition).await.expect("insert after terminal");
        let jobs = queue.list_jobs_for_tender(&tender_id).await.expect("list jobs");
        assert_eq!(jobs.len(), 2);

        let dead = queue.list_jobs(Some(AwardJobState::Failed), 10).await.expect("list failed");
        assert_eq!(dead.iter().map(|job| job.id.clone()).collect::<Vec<_>>(), vec![first.job.id]);
        assert_eq!(queue.list_jobs(None, 1).await.expect("list limited").len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_state_version_is_a_job_conflict() {
        let pool = setup_pool().await;
        let tender_id = TenderId("T-Q-3".to_string());
        insert_tender(&pool, &tender_id).await;
        let queue = SqlAwardJobQueue::new(pool.clone());
        let engine = AwardJobEngine::default();
        let now = parse_ts("2026-05-01T12:00:00Z");

        let created = engine.create_job(request(&tender_id), "system", now);
        queue.insert_job(&created.job, &created.transition).await.expect("insert");

        let first = engine.claim(created.job.clone(), "worker-a", now).expect("claim a");
        let second = engine.claim(created.job.clone(), "worker-b", now).expect("claim b");
        queue.save_job(&first.job, 1, &first.transition).await.expect("first claim wins");

        let error = queue
            .save_job(&second.job, 1, &second.transition)
            .await
            .expect_err("second claim must lose");
        assert_eq!(error, StoreError::JobConflict(created.job.id.clone()));

        let stored = queue.find_job(&created.job.id).await.expect("find").expect("present");
        assert_eq!(stored.claimed_by.as_deref(), Some("worker-a"));
        assert_eq!(stored.state, AwardJobState::Running);

        pool.close().await;
    }

    #[tokio::test]
    async fn next_due_job_skips_backoff_and_fresh_claims_but_returns_stale_ones() {
        let pool = setup_pool().await;
        let tender_id = TenderId("T-Q-4".to_string());
        insert_tender(&pool, &tender_id).await;
        let queue = SqlAwardJobQueue::new(pool.clone());
        let engine = AwardJobEngine::default();
        let now = parse_ts("2026-05-01T12:00:00Z");

        let created = engine.create_job(request(&tender_id), "system", now);
        queue.insert_job(&created.job, &created.transition).await.expect("insert");
        let claimed = engine.claim(created.job, "worker-a", now).expect("claim");
        queue.save_job(&claimed.job, 1, &claimed.transition).await.expect("save claim");

        let soon = now + Duration::seconds(10);
        assert_eq!(queue.next_due_job(soon, engine.stale_before(soon)).await.expect("due"), None);

        let later = now + Duration::seconds(engine.config().claim_timeout_seconds + 1);
        let stale = queue
            .next_due_job(later, engine.stale_before(later))
            .await
            .expect("due")
            .expect("stale claim is due");
        assert_eq!(stale.id, claimed.job.id);

        let retrying = engine
            .fail(claimed.job.clone(), "timeout", "ledger", RetryPolicy::Retry, now)
            .expect("fail retryable");
        queue
            .save_job(&retrying.job, claimed.job.state_version, &retrying.transition)
            .await
            .expect("save retry");
        assert_eq!(queue.next_due_job(now, engine.stale_before(now)).await.expect("due"), None);

        let after_backoff = retrying.job.available_at;
        let due = queue
            .next_due_job(after_backoff, engine.stale_before(after_backoff))
            .await
            .expect("due")
            .expect("job due after backoff");
        assert_eq!(due.state, AwardJobState::RetryableFailed);

        pool.close().await;
    }

    fn request(tender_id: &TenderId) -> AwardCommitRequest {
        AwardCommitRequest {
            tender_id: tender_id.clone(),
            winning_bid_id: BidId("B-WIN".to_string()),
            award_amount: Decimal::new(98_500_00, 2),
        }
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_tender(pool: &DbPool, tender_id: &TenderId) {
        let ts = "2026-04-01T09:00:00.000000Z";
        sqlx::query(
            "INSERT INTO tender (
                id, title, description, closing_at, owner_company_id, status,
                status_changed_at, version, created_at, updated_at
             ) VALUES (?, 'Harbour dredging', '', ?, 'c-owner', 'evaluation', ?, 1, ?, ?)",
        )
        .bind(&tender_id.0)
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .execute(pool)
        .await
        .expect("insert tender");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
