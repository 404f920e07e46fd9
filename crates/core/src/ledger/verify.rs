use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::tender::{Tender, TenderId, TenderStatus};
use crate::ledger::{AwardLedgerClient, OnLedgerAward};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardVerification {
    pub tender_id: Option<TenderId>,
    pub verified: bool,
    pub reason: Option<String>,
    pub record: Option<OnLedgerAward>,
    /// Whether the on-ledger hash equals the proof stored on the tender; `None` when
    /// either side is missing.
    pub hash_matches: Option<bool>,
}

impl AwardVerification {
    fn unverified(tender_id: Option<TenderId>, reason: impl Into<String>) -> Self {
        Self {
            tender_id,
            verified: false,
            reason: Some(reason.into()),
            record: None,
            hash_matches: None,
        }
    }
}

/// Read-only check of a tender's award against the ledger's storage lookup.
pub async fn verify_award(ledger: &dyn AwardLedgerClient, tender: &Tender) -> AwardVerification {
    let tender_id = Some(tender.id.clone());
    if tender.status != TenderStatus::Awarded {
        return AwardVerification::unverified(
            tender_id,
            format!("tender is {}, not awarded", tender.status),
        );
    }

    let record = match ledger.get_award(&tender.id).await {
        Ok(Some(record)) if !record.content_hash.is_empty() => record,
        Ok(_) => return AwardVerification::unverified(tender_id, "award not found on ledger"),
        Err(error) => {
            warn!(
                event_name = "ledger.verify.query_failed",
                tender_id = %tender.id,
                error = %error,
                "award verification could not query ledger"
            );
            return AwardVerification::unverified(
                tender_id,
                format!("could not query ledger: {error}"),
            );
        }
    };

    let hash_matches = tender
        .ledger_proof
        .as_ref()
        .map(|proof| proof.content_hash == record.content_hash);
    AwardVerification {
        tender_id,
        verified: true,
        reason: None,
        record: Some(record),
        hash_matches,
    }
}

/// Verifies through transaction-log replay of a known commit reference.
pub async fn verify_award_by_commit_ref(
    ledger: &dyn AwardLedgerClient,
    commit_ref: &str,
) -> AwardVerification {
    match ledger.get_award_by_commit_ref(commit_ref).await {
        Ok(Some(record)) => AwardVerification {
            tender_id: Some(record.tender_id.clone()),
            verified: true,
            reason: None,
            record: Some(record),
            hash_matches: None,
        },
        Ok(None) => AwardVerification::unverified(
            None,
            format!("no award record found for commit `{commit_ref}`"),
        ),
        Err(error) => {
            AwardVerification::unverified(None, format!("could not fetch commit: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{verify_award, verify_award_by_commit_ref};
    use crate::domain::actor::{CompanyId, UserId};
    use crate::domain::bid::{Bid, BidId, BidStatus};
    use crate::domain::tender::{AwardOutcome, LedgerProof, Tender, TenderId, TenderStatus};
    use crate::ledger::{
        AwardFacts, AwardLedgerClient, AwardRecordRequest, InMemoryAwardLedger, LookupMethod,
    };

    fn awarded_tender() -> (Tender, Bid) {
        let at = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).single().expect("valid");
        let bid = Bid {
            id: BidId("B-1".into()),
            tender_id: TenderId("T-1".into()),
            company_id: CompanyId("c-bidder".into()),
            amount: Decimal::new(1500, 0),
            document_ref: None,
            status: BidStatus::Accepted,
            revision: 1,
            parent_bid_id: None,
            withdrawal: None,
            submitted_at: at - Duration::days(5),
            updated_at: at,
        };
        let tender = Tender {
            id: TenderId("T-1".into()),
            title: "Fleet servicing".into(),
            description: String::new(),
            closing_at: at - Duration::days(1),
            publish_at: None,
            budget: None,
            owner_company_id: CompanyId("c-owner".into()),
            status: TenderStatus::Awarded,
            status_changed_at: at,
            cancellation: None,
            award: Some(AwardOutcome {
                winning_bid_id: bid.id.clone(),
                awarded_at: at,
                justification: "lowest compliant".into(),
                awarded_by: UserId("u-owner".into()),
            }),
            ledger_proof: None,
            version: 4,
            created_at: at - Duration::days(20),
            updated_at: at,
        };
        (tender, bid)
    }

    #[tokio::test]
    async fn unawarded_or_unrecorded_tenders_are_unverified() {
        let ledger = InMemoryAwardLedger::new("k", "signer");
        let (mut tender, _) = awarded_tender();

        let result = verify_award(&ledger, &tender).await;
        assert!(!result.verified);
        assert_eq!(result.reason.as_deref(), Some("award not found on ledger"));

        tender.status = TenderStatus::Evaluation;
        let result = verify_award(&ledger, &tender).await;
        assert!(!result.verified);
        assert!(result.reason.unwrap_or_default().contains("evaluation"));
    }

    #[tokio::test]
    async fn recorded_award_verifies_with_hash_comparison() {
        let ledger = InMemoryAwardLedger::new("k", "signer");
        let (mut tender, bid) = awarded_tender();
        let facts = AwardFacts::from_award(&tender, &bid, bid.amount, 2).expect("facts");
        let receipt =
            ledger.record_award(&AwardRecordRequest::from_facts(facts)).await.expect("record");

        let unproven = verify_award(&ledger, &tender).await;
        assert!(unproven.verified);
        assert_eq!(unproven.hash_matches, None);

        tender.ledger_proof = Some(LedgerProof {
            content_hash: receipt.content_hash.clone(),
            commit_ref: receipt.commit_ref.clone(),
            recorded_at: receipt.recorded_at,
        });
        let proven = verify_award(&ledger, &tender).await;
        assert_eq!(proven.hash_matches, Some(true));
        let record = proven.record.expect("record");
        assert_eq!(record.method, LookupMethod::ContractStorage);
        assert_eq!(record.award_amount_minor, 150_000);

        let by_ref = verify_award_by_commit_ref(&ledger, &receipt.commit_ref).await;
        assert!(by_ref.verified);
        assert_eq!(by_ref.tender_id, Some(TenderId("T-1".into())));

        let missing = verify_award_by_commit_ref(&ledger, "0xnope").await;
        assert!(!missing.verified);
    }
}
