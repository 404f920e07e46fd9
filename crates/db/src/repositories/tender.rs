use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::debug;

use tenderbridge_core::domain::actor::{CompanyId, UserId};
use tenderbridge_core::domain::bid::{Bid, BidId, BidStatus, Withdrawal};
use tenderbridge_core::domain::tender::{
    AwardOutcome, Cancellation, LedgerProof, Tender, TenderId, TenderStatus,
};
use tenderbridge_core::store::{BidChanges, StoreError, TenderGuard, TenderStore};

use super::{
    encode_optional_timestamp, encode_timestamp, parse_decimal, parse_optional_timestamp,
    parse_timestamp, parse_u32, store_error, RepositoryError,
};
use crate::DbPool;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const TENDER_COLUMNS: &str = "
    id,
    title,
    description,
    closing_at,
    publish_at,
    budget,
    owner_company_id,
    status,
    status_changed_at,
    cancellation_reason,
    cancelled_by,
    cancelled_at,
    winning_bid_id,
    awarded_at,
    award_justification,
    awarded_by,
    ledger_content_hash,
    ledger_commit_ref,
    ledger_recorded_at,
    version,
    created_at,
    updated_at";

const BID_COLUMNS: &str = "
    id,
    tender_id,
    company_id,
    amount,
    document_ref,
    status,
    revision,
    parent_bid_id,
    withdrawal_reason,
    withdrawn_at,
    submitted_at,
    updated_at";

/// Tender and bid persistence on SQLite. Versioned saves and guarded bid writes run as
/// conditional statements inside one transaction, so a lost race leaves no partial write.
pub struct SqlTenderStore {
    pool: DbPool,
}

impl SqlTenderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenderStore for SqlTenderStore {
    async fn find_tender(&self, id: &TenderId) -> Result<Option<Tender>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TENDER_COLUMNS} FROM tender WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(tender_from_row).transpose()?)
    }

    async fn list_tenders_by_status(
        &self,
        status: TenderStatus,
    ) -> Result<Vec<Tender>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TENDER_COLUMNS} FROM tender WHERE status = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(tender_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn insert_tender(&self, tender: &Tender) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO tender (
                id,
                created_at,
                title,
                description,
                closing_at,
                publish_at,
                budget,
                owner_company_id,
                status,
                status_changed_at,
                cancellation_reason,
                cancelled_by,
                cancelled_at,
                winning_bid_id,
                awarded_at,
                award_justification,
                awarded_by,
                ledger_content_hash,
                ledger_commit_ref,
                ledger_recorded_at,
                version,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tender.id.0)
        .bind(encode_timestamp(&tender.created_at));

        bind_tender_state(query, tender).execute(&self.pool).await.map_err(store_error)?;
        Ok(())
    }

    async fn save_tender(
        &self,
        tender: &Tender,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        update_tender(&mut tx, tender, expected_version).await?;
        tx.commit().await.map_err(store_error)?;

        debug!(
            event_name = "db.tender.saved",
            tender_id = %tender.id,
            version = tender.version,
            "tender row updated"
        );
        Ok(())
    }

    async fn find_bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        let row = sqlx::query(&format!("SELECT {BID_COLUMNS} FROM bid WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(bid_from_row).transpose()?)
    }

    async fn list_bids_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Bid>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BID_COLUMNS} FROM bid WHERE tender_id = ? ORDER BY submitted_at ASC, id ASC"
        ))
        .bind(&tender_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(bid_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_bids_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Bid>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BID_COLUMNS} FROM bid WHERE company_id = ? ORDER BY submitted_at ASC, id ASC"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(bid_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn write_bids(
        &self,
        guard: &TenderGuard,
        changes: BidChanges,
    ) -> Result<(), StoreError> {
        if let Some(stray) = changes
            .updated
            .iter()
            .chain(changes.inserted.iter())
            .find(|bid| bid.tender_id != guard.tender_id)
        {
            return Err(StoreError::Backend(format!(
                "bid `{}` belongs to tender `{}`, not `{}`",
                stray.id, stray.tender_id, guard.tender_id
            )));
        }

        let guard_clause = guard_clause(guard.statuses.len());
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for bid in &changes.updated {
            let sql = format!(
                "UPDATE bid SET
                    amount = ?,
                    document_ref = ?,
                    status = ?,
                    withdrawal_reason = ?,
                    withdrawn_at = ?,
                    updated_at = ?
                 WHERE id = ? AND tender_id = ? AND {guard_clause}"
            );
            let query = bind_bid_mutable_state(sqlx::query(&sql), bid)
                .bind(&bid.id.0)
                .bind(&bid.tender_id.0);
            let result =
                bind_guard(query, guard).execute(&mut *tx).await.map_err(store_error)?;
            if result.rows_affected() == 0 {
                return Err(explain_guard_miss(&mut tx, guard, Some(&bid.id)).await);
            }
        }

        for bid in &changes.inserted {
            let sql = format!(
                "INSERT INTO bid (
                    id,
                    tender_id,
                    company_id,
                    revision,
                    parent_bid_id,
                    submitted_at,
                    amount,
                    document_ref,
                    status,
                    withdrawal_reason,
                    withdrawn_at,
                    updated_at
                 ) SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
                 WHERE {guard_clause}"
            );
            let query = sqlx::query(&sql)
                .bind(&bid.id.0)
                .bind(&bid.tender_id.0)
                .bind(&bid.company_id.0)
                .bind(i64::from(bid.revision))
                .bind(bid.parent_bid_id.as_ref().map(|id| id.0.as_str()))
                .bind(encode_timestamp(&bid.submitted_at));
            let query = bind_bid_mutable_state(query, bid);
            let result =
                bind_guard(query, guard).execute(&mut *tx).await.map_err(store_error)?;
            if result.rows_affected() == 0 {
                return Err(explain_guard_miss(&mut tx, guard, None).await);
            }
        }

        tx.commit().await.map_err(store_error)?;

        debug!(
            event_name = "db.bid.written",
            tender_id = %guard.tender_id,
            updated = changes.updated.len(),
            inserted = changes.inserted.len(),
            "guarded bid write committed"
        );
        Ok(())
    }

    async fn commit_award(
        &self,
        tender: &Tender,
        expected_version: u32,
        bids: &[Bid],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        update_tender(&mut tx, tender, expected_version).await?;

        for bid in bids {
            let query = sqlx::query(
                "UPDATE bid SET
                    amount = ?,
                    document_ref = ?,
                    status = ?,
                    withdrawal_reason = ?,
                    withdrawn_at = ?,
                    updated_at = ?
                 WHERE id = ? AND tender_id = ?",
            );
            let result = bind_bid_mutable_state(query, bid)
                .bind(&bid.id.0)
                .bind(&tender.id.0)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Missing(format!(
                    "bid `{}` on tender `{}`",
                    bid.id, tender.id
                )));
            }
        }

        tx.commit().await.map_err(store_error)?;

        debug!(
            event_name = "db.tender.award_committed",
            tender_id = %tender.id,
            bids = bids.len(),
            "award transaction committed"
        );
        Ok(())
    }
}

async fn update_tender(
    conn: &mut SqliteConnection,
    tender: &Tender,
    expected_version: u32,
) -> Result<(), StoreError> {
    let query = sqlx::query(
        "UPDATE tender SET
            title = ?,
            description = ?,
            closing_at = ?,
            publish_at = ?,
            budget = ?,
            owner_company_id = ?,
            status = ?,
            status_changed_at = ?,
            cancellation_reason = ?,
            cancelled_by = ?,
            cancelled_at = ?,
            winning_bid_id = ?,
            awarded_at = ?,
            award_justification = ?,
            awarded_by = ?,
            ledger_content_hash = ?,
            ledger_commit_ref = ?,
            ledger_recorded_at = ?,
            version = ?,
            updated_at = ?
         WHERE id = ? AND version = ?",
    );
    let result = bind_tender_state(query, tender)
        .bind(&tender.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists = sqlx::query("SELECT 1 FROM tender WHERE id = ?")
        .bind(&tender.id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error)?
        .is_some();
    if exists {
        Err(StoreError::VersionConflict {
            tender_id: tender.id.clone(),
            expected: expected_version,
        })
    } else {
        Err(StoreError::Missing(format!("tender `{}`", tender.id)))
    }
}

/// Binds every tender column except `id` and `created_at`, in `UPDATE` order.
fn bind_tender_state<'q>(query: SqliteQuery<'q>, tender: &'q Tender) -> SqliteQuery<'q> {
    let cancellation = tender.cancellation.as_ref();
    let award = tender.award.as_ref();
    let proof = tender.ledger_proof.as_ref();

    query
        .bind(&tender.title)
        .bind(&tender.description)
        .bind(encode_timestamp(&tender.closing_at))
        .bind(encode_optional_timestamp(tender.publish_at.as_ref()))
        .bind(tender.budget.map(|budget| budget.to_string()))
        .bind(&tender.owner_company_id.0)
        .bind(tender.status.as_str())
        .bind(encode_timestamp(&tender.status_changed_at))
        .bind(cancellation.map(|c| c.reason.as_str()))
        .bind(cancellation.map(|c| c.cancelled_by.0.as_str()))
        .bind(encode_optional_timestamp(cancellation.map(|c| &c.cancelled_at)))
        .bind(award.map(|a| a.winning_bid_id.0.as_str()))
        .bind(encode_optional_timestamp(award.map(|a| &a.awarded_at)))
        .bind(award.map(|a| a.justification.as_str()))
        .bind(award.map(|a| a.awarded_by.0.as_str()))
        .bind(proof.map(|p| p.content_hash.as_str()))
        .bind(proof.map(|p| p.commit_ref.as_str()))
        .bind(encode_optional_timestamp(proof.map(|p| &p.recorded_at)))
        .bind(i64::from(tender.version))
        .bind(encode_timestamp(&tender.updated_at))
}

/// Binds the bid columns a write may change, in `UPDATE` order.
fn bind_bid_mutable_state<'q>(query: SqliteQuery<'q>, bid: &'q Bid) -> SqliteQuery<'q> {
    let withdrawal = bid.withdrawal.as_ref();
    query
        .bind(bid.amount.to_string())
        .bind(bid.document_ref.as_deref())
        .bind(bid.status.as_str())
        .bind(withdrawal.map(|w| w.reason.as_str()))
        .bind(encode_optional_timestamp(withdrawal.map(|w| &w.withdrawn_at)))
        .bind(encode_timestamp(&bid.updated_at))
}

fn guard_clause(statuses: usize) -> String {
    let placeholders = vec!["?"; statuses.max(1)].join(", ");
    format!("EXISTS (SELECT 1 FROM tender WHERE id = ? AND status IN ({placeholders}))")
}

fn bind_guard<'q>(query: SqliteQuery<'q>, guard: &'q TenderGuard) -> SqliteQuery<'q> {
    let mut query = query.bind(&guard.tender_id.0);
    if guard.statuses.is_empty() {
        // An empty guard admits nothing.
        return query.bind(Option::<String>::None);
    }
    for status in &guard.statuses {
        query = query.bind(status.as_str());
    }
    query
}

async fn explain_guard_miss(
    conn: &mut SqliteConnection,
    guard: &TenderGuard,
    bid_id: Option<&BidId>,
) -> StoreError {
    let status = match sqlx::query("SELECT status FROM tender WHERE id = ?")
        .bind(&guard.tender_id.0)
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(row) => row.and_then(|row| row.try_get::<String, _>("status").ok()),
        Err(error) => return store_error(error),
    };

    match (status.as_deref().and_then(TenderStatus::parse), bid_id) {
        (None, _) => StoreError::Missing(format!("tender `{}`", guard.tender_id)),
        (Some(status), _) if !guard.admits(status) => {
            StoreError::GuardRejected { tender_id: guard.tender_id.clone() }
        }
        (Some(_), Some(bid_id)) => StoreError::Missing(format!("bid `{bid_id}`")),
        (Some(_), None) => StoreError::GuardRejected { tender_id: guard.tender_id.clone() },
    }
}

fn tender_from_row(row: SqliteRow) -> Result<Tender, RepositoryError> {
    let id = TenderId(row.try_get("id")?);
    let status_raw = row.try_get::<String, _>("status")?;
    let status = TenderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tender status `{status_raw}`")))?;

    let cancellation = match (
        row.try_get::<Option<String>, _>("cancellation_reason")?,
        row.try_get::<Option<String>, _>("cancelled_by")?,
        parse_optional_timestamp("cancelled_at", row.try_get("cancelled_at")?)?,
    ) {
        (Some(reason), Some(cancelled_by), Some(cancelled_at)) => {
            Some(Cancellation { reason, cancelled_by: UserId(cancelled_by), cancelled_at })
        }
        (None, None, None) => None,
        _ => return Err(partial_columns(&id, "cancellation")),
    };

    let award = match (
        row.try_get::<Option<String>, _>("winning_bid_id")?,
        parse_optional_timestamp("awarded_at", row.try_get("awarded_at")?)?,
        row.try_get::<Option<String>, _>("award_justification")?,
        row.try_get::<Option<String>, _>("awarded_by")?,
    ) {
        (Some(winning_bid_id), Some(awarded_at), Some(justification), Some(awarded_by)) => {
            Some(AwardOutcome {
                winning_bid_id: BidId(winning_bid_id),
                awarded_at,
                justification,
                awarded_by: UserId(awarded_by),
            })
        }
        (None, None, None, None) => None,
        _ => return Err(partial_columns(&id, "award")),
    };

    let ledger_proof = match (
        row.try_get::<Option<String>, _>("ledger_content_hash")?,
        row.try_get::<Option<String>, _>("ledger_commit_ref")?,
        parse_optional_timestamp("ledger_recorded_at", row.try_get("ledger_recorded_at")?)?,
    ) {
        (Some(content_hash), Some(commit_ref), Some(recorded_at)) => {
            Some(LedgerProof { content_hash, commit_ref, recorded_at })
        }
        (None, None, None) => None,
        _ => return Err(partial_columns(&id, "ledger proof")),
    };

    let budget = row
        .try_get::<Option<String>, _>("budget")?
        .map(|value| parse_decimal("budget", &value))
        .transpose()?;

    Ok(Tender {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        closing_at: parse_timestamp("closing_at", row.try_get("closing_at")?)?,
        publish_at: parse_optional_timestamp("publish_at", row.try_get("publish_at")?)?,
        budget,
        owner_company_id: CompanyId(row.try_get("owner_company_id")?),
        status,
        status_changed_at: parse_timestamp("status_changed_at", row.try_get("status_changed_at")?)?,
        cancellation,
        award,
        ledger_proof,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        id,
    })
}

fn bid_from_row(row: SqliteRow) -> Result<Bid, RepositoryError> {
    let id = BidId(row.try_get("id")?);
    let status_raw = row.try_get::<String, _>("status")?;
    let status = BidStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown bid status `{status_raw}`")))?;

    let withdrawal = match (
        row.try_get::<Option<String>, _>("withdrawal_reason")?,
        parse_optional_timestamp("withdrawn_at", row.try_get("withdrawn_at")?)?,
    ) {
        (Some(reason), Some(withdrawn_at)) => Some(Withdrawal { reason, withdrawn_at }),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(format!(
                "bid `{id}` has a partial withdrawal record"
            )))
        }
    };

    let amount_raw = row.try_get::<String, _>("amount")?;

    Ok(Bid {
        tender_id: TenderId(row.try_get("tender_id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        amount: parse_decimal("amount", &amount_raw)?,
        document_ref: row.try_get("document_ref")?,
        status,
        revision: parse_u32("revision", row.try_get("revision")?)?,
        parent_bid_id: row.try_get::<Option<String>, _>("parent_bid_id")?.map(BidId),
        withdrawal,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        id,
    })
}

fn partial_columns(tender_id: &TenderId, group: &str) -> RepositoryError {
    RepositoryError::Decode(format!("tender `{tender_id}` has a partial {group} record"))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use tenderbridge_core::domain::actor::{CompanyId, UserId};
    use tenderbridge_core::domain::bid::{Bid, BidId, BidStatus, Withdrawal};
    use tenderbridge_core::domain::tender::{
        AwardOutcome, LedgerProof, Tender, TenderId, TenderStatus,
    };
    use tenderbridge_core::store::{BidChanges, StoreError, TenderGuard, TenderStore};

    use super::SqlTenderStore;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_tender_store_round_trips_tender_with_award_and_proof() {
        let pool = setup_pool().await;
        let store = SqlTenderStore::new(pool.clone());

        let mut tender = sample_tender("T-SQL-1", TenderStatus::Evaluation);
        store.insert_tender(&tender).await.expect("insert tender");
        let bid = sample_bid("B-SQL-1", &tender.id, "c-bidder");
        insert_bid_row(&pool, &bid).await;

        let found = store.find_tender(&tender.id).await.expect("find tender");
        assert_eq!(found, Some(tender.clone()));

        let expected_version = tender.version;
        tender.status = TenderStatus::Awarded;
        tender.award = Some(AwardOutcome {
            winning_bid_id: bid.id.clone(),
            awarded_at: parse_ts("2026-04-10T10:00:00Z"),
            justification: "lowest compliant bid".to_string(),
            awarded_by: UserId("u-owner".to_string()),
        });
        tender.ledger_proof = Some(LedgerProof {
            content_hash: "0xabc".to_string(),
            commit_ref: "0xdef".to_string(),
            recorded_at: parse_ts("2026-04-10T10:00:05Z"),
        });
        tender.version += 1;
        store.save_tender(&tender, expected_version).await.expect("save tender");

        let found = store.find_tender(&tender.id).await.expect("find tender");
        assert_eq!(found, Some(tender.clone()));

        let awarded = store
            .list_tenders_by_status(TenderStatus::Awarded)
            .await
            .expect("list awarded tenders");
        assert_eq!(awarded, vec![tender]);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_version_is_reported_as_conflict() {
        let pool = setup_pool().await;
        let store = SqlTenderStore::new(pool.clone());

        let mut tender = sample_tender("T-SQL-2", TenderStatus::Draft);
        store.insert_tender(&tender).await.expect("insert tender");

        tender.title = "Renamed".to_string();
        tender.version = 2;
        store.save_tender(&tender, 1).await.expect("first save");

        tender.title = "Renamed again".to_string();
        tender.version = 2;
        let error = store.save_tender(&tender, 1).await.expect_err("stale save must fail");
        assert_eq!(
            error,
            StoreError::VersionConflict { tender_id: tender.id.clone(), expected: 1 }
        );

        let stored = store.find_tender(&tender.id).await.expect("find").expect("present");
        assert_eq!(stored.title, "Renamed");

        pool.close().await;
    }

    #[tokio::test]
    async fn guarded_bid_write_is_rejected_when_tender_left_open() {
        let pool = setup_pool().await;
        let store = SqlTenderStore::new(pool.clone());

        let tender = sample_tender("T-SQL-3", TenderStatus::Closed);
        store.insert_tender(&tender).await.expect("insert tender");

        let bid = sample_bid("B-SQL-3", &tender.id, "c-bidder");
        let error = store
            .write_bids(
                &TenderGuard::new(tender.id.clone(), &[TenderStatus::Open]),
                BidChanges::insert(bid.clone()),
            )
            .await
            .expect_err("guard must reject");
        assert_eq!(error, StoreError::GuardRejected { tender_id: tender.id.clone() });
        assert_eq!(store.find_bid(&bid.id).await.expect("find bid"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn revision_write_is_all_or_nothing() {
        let pool = setup_pool().await;
        let store = SqlTenderStore::new(pool.clone());

        let tender = sample_tender("T-SQL-4", TenderStatus::Open);
        store.insert_tender(&tender).await.expect("insert tender");
        let guard = TenderGuard::new(tender.id.clone(), &[TenderStatus::Open]);

        let original = sample_bid("B-SQL-4", &tender.id, "c-bidder");
        store.write_bids(&guard, BidChanges::insert(original.clone())).await.expect("submit");

        let mut superseded = original.clone();
        superseded.status = BidStatus::Superseded;
        // Reusing the original id makes the insert collide after the update ran.
        let mut colliding = original.clone();
        colliding.revision = 2;
        colliding.parent_bid_id = Some(original.id.clone());

        let error = store
            .write_bids(
                &guard,
                BidChanges { updated: vec![superseded], inserted: vec![colliding] },
            )
            .await
            .expect_err("duplicate insert must fail");
        assert!(matches!(error, StoreError::Duplicate(_)), "unexpected error {error:?}");

        let stored = store.find_bid(&original.id).await.expect("find").expect("present");
        assert_eq!(stored.status, BidStatus::Pending);

        pool.close().await;
    }

    #[tokio::test]
    async fn bids_list_by_tender_and_company_with_withdrawal_details() {
        let pool = setup_pool().await;
        let store = SqlTenderStore::new(pool.clone());

        let tender = sample_tender("T-SQL-5", TenderStatus::Open);
        store.insert_tender(&tender).await.expect("insert tender");
        let guard = TenderGuard::new(tender.id.clone(), &[TenderStatus::Open]);

        let first = sample_bid("B-SQL-5A", &tender.id, "c-alpha");
        let mut second = sample_bid("B-SQL-5B", &tender.id, "c-beta");
        second.submitted_at = first.submitted_at + Duration::minutes(5);
        store.write_bids(&guard, BidChanges::insert(first.clone())).await.expect("first");
        store.write_bids(&guard, BidChanges::insert(second.clone())).await.expect("second");

        let mut withdrawn = second.clone();
        withdrawn.status = BidStatus::Withdrawn;
        withdrawn.withdrawal = Some(Withdrawal {
            reason: "pricing error".to_string(),
            withdrawn_at: parse_ts("2026-04-02T08:00:00Z"),
        });
        store.write_bids(&guard, BidChanges::update(withdrawn.clone())).await.expect("withdraw");

        let all = store.list_bids_for_tender(&tender.id).await.expect("list by tender");
        assert_eq!(all, vec![first, withdrawn.clone()]);

        let beta = store
            .list_bids_for_company(&CompanyId("c-beta".to_string()))
            .await
            .expect("list by company");
        assert_eq!(beta, vec![withdrawn]);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_bid_row(pool: &DbPool, bid: &Bid) {
        sqlx::query(
            "INSERT INTO bid (id, tender_id, company_id, amount, status, revision, submitted_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', 1, ?, ?)",
        )
        .bind(&bid.id.0)
        .bind(&bid.tender_id.0)
        .bind(&bid.company_id.0)
        .bind(bid.amount.to_string())
        .bind("2026-04-01T09:00:00.000000Z")
        .bind("2026-04-01T09:00:00.000000Z")
        .execute(pool)
        .await
        .expect("insert bid");
    }

    fn sample_tender(id: &str, status: TenderStatus) -> Tender {
        let created = parse_ts("2026-03-01T09:00:00Z");
        Tender {
            id: TenderId(id.to_string()),
            title: "Harbour dredging".to_string(),
            description: "Maintenance dredging of berths 3-5".to_string(),
            closing_at: created + Duration::days(30),
            publish_at: Some(created + Duration::days(1)),
            budget: Some(Decimal::new(2_500_000_00, 2)),
            owner_company_id: CompanyId("c-owner".to_string()),
            status,
            status_changed_at: created,
            cancellation: None,
            award: None,
            ledger_proof: None,
            version: 1,
            created_at: created,
            updated_at: created,
        }
    }

    fn sample_bid(id: &str, tender_id: &TenderId, company: &str) -> Bid {
        let submitted = parse_ts("2026-04-01T09:00:00Z");
        Bid {
            id: BidId(id.to_string()),
            tender_id: tender_id.clone(),
            company_id: CompanyId(company.to_string()),
            amount: Decimal::new(1_975_000_50, 2),
            document_ref: Some("doc://bids/proposal.pdf".to_string()),
            status: BidStatus::Pending,
            revision: 1,
            parent_bid_id: None,
            withdrawal: None,
            submitted_at: submitted,
            updated_at: submitted,
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
