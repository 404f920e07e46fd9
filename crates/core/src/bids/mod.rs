//! Bid rules: submission gating, withdrawal, revision chains, and award-time resolution.
//!
//! Everything here is pure. Callers load the tender and its bids, pass the current instant,
//! and persist the returned rows through the store's guarded write.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::bid::{Bid, BidId, BidStatus, Withdrawal};
use crate::domain::tender::{Tender, TenderId};
use crate::errors::TenderError;
use crate::permissions::require_company;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidSubmission {
    pub amount: Decimal,
    pub document_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidRevision {
    pub superseded: Bid,
    pub revised: Bid,
}

/// Outcome of resolving every bid of a tender against a named winner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwardResolution {
    pub winner: Bid,
    /// Winner plus every rejected bid; the rows the award transaction must write.
    pub changed: Vec<Bid>,
    pub rejected: usize,
    pub untouched: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BidLedger;

impl BidLedger {
    pub fn submit(
        tender: &Tender,
        actor: &Actor,
        submission: BidSubmission,
        now: DateTime<Utc>,
    ) -> Result<Bid, TenderError> {
        ensure_bidding_window(tender, now)?;
        let company_id = require_company(actor)?;
        if *company_id == tender.owner_company_id {
            return Err(TenderError::SelfBidding);
        }
        ensure_positive(submission.amount)?;

        Ok(Bid {
            id: BidId(Uuid::new_v4().to_string()),
            tender_id: tender.id.clone(),
            company_id: company_id.clone(),
            amount: submission.amount,
            document_ref: submission.document_ref,
            status: BidStatus::Pending,
            revision: 1,
            parent_bid_id: None,
            withdrawal: None,
            submitted_at: now,
            updated_at: now,
        })
    }

    pub fn withdraw(
        tender: &Tender,
        bid: &Bid,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Bid, TenderError> {
        ensure_bid_owner(bid, actor)?;
        if bid.status == BidStatus::Withdrawn {
            return Err(TenderError::AlreadyWithdrawn(bid.id.clone()));
        }
        if !bid.status.is_live() {
            return Err(TenderError::InvalidState(format!(
                "bid `{}` is {} and cannot be withdrawn",
                bid.id, bid.status
            )));
        }
        ensure_bidding_window(tender, now)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TenderError::Validation("withdrawal reason must not be blank".into()));
        }

        let mut withdrawn = bid.clone();
        withdrawn.status = BidStatus::Withdrawn;
        withdrawn.withdrawal = Some(Withdrawal { reason: reason.to_string(), withdrawn_at: now });
        withdrawn.updated_at = now;
        Ok(withdrawn)
    }

    pub fn revise(
        tender: &Tender,
        original: &Bid,
        actor: &Actor,
        amount: Decimal,
        document_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BidRevision, TenderError> {
        ensure_bid_owner(original, actor)?;
        if !original.status.is_live() {
            return Err(TenderError::InvalidState(format!(
                "bid `{}` is {}; only the live revision can be revised",
                original.id, original.status
            )));
        }
        ensure_bidding_window(tender, now)?;
        ensure_positive(amount)?;

        let mut superseded = original.clone();
        superseded.status = BidStatus::Superseded;
        superseded.updated_at = now;

        let revised = Bid {
            id: BidId(Uuid::new_v4().to_string()),
            tender_id: original.tender_id.clone(),
            company_id: original.company_id.clone(),
            amount,
            document_ref: document_ref.or_else(|| original.document_ref.clone()),
            status: BidStatus::Pending,
            revision: original.revision + 1,
            parent_bid_id: Some(original.id.clone()),
            withdrawal: None,
            submitted_at: now,
            updated_at: now,
        };

        Ok(BidRevision { superseded, revised })
    }

    /// Accepts the winner and rejects every other bid that is not withdrawn, in one pass.
    /// Validation completes before any row is touched.
    pub fn resolve_award(
        tender_id: &TenderId,
        bids: &[Bid],
        winning_bid_id: &BidId,
        now: DateTime<Utc>,
    ) -> Result<AwardResolution, TenderError> {
        let target = bids
            .iter()
            .find(|bid| bid.id == *winning_bid_id && bid.tender_id == *tender_id)
            .ok_or_else(|| TenderError::bid_not_found(winning_bid_id.0.clone()))?;

        match target.status {
            BidStatus::Withdrawn => {
                return Err(TenderError::InvalidBid(format!(
                    "bid `{winning_bid_id}` was withdrawn"
                )));
            }
            BidStatus::Superseded => {
                return Err(TenderError::InvalidBid(format!(
                    "bid `{winning_bid_id}` was superseded by a later revision"
                )));
            }
            _ => {}
        }

        let mut changed = Vec::with_capacity(bids.len());
        let mut winner = None;
        let mut rejected = 0;
        let mut untouched = 0;

        for bid in bids.iter().filter(|bid| bid.tender_id == *tender_id) {
            if bid.status == BidStatus::Withdrawn {
                untouched += 1;
                continue;
            }

            let mut resolved = bid.clone();
            resolved.updated_at = now;
            if bid.id == *winning_bid_id {
                resolved.status = BidStatus::Accepted;
                winner = Some(resolved.clone());
            } else {
                resolved.status = BidStatus::Rejected;
                rejected += 1;
            }
            changed.push(resolved);
        }

        let winner = winner.ok_or_else(|| TenderError::bid_not_found(winning_bid_id.0.clone()))?;
        Ok(AwardResolution { winner, changed, rejected, untouched })
    }

    /// Toggles `pending <-> shortlisted` while the tender is under evaluation.
    pub fn shortlist(
        tender: &Tender,
        bid: &Bid,
        shortlisted: bool,
        now: DateTime<Utc>,
    ) -> Result<Bid, TenderError> {
        if !tender.status.can_evaluate_bids() {
            return Err(TenderError::InvalidState(format!(
                "bids of a {} tender cannot be shortlisted",
                tender.status
            )));
        }

        let target = match (bid.status, shortlisted) {
            (BidStatus::Pending, true) | (BidStatus::Shortlisted, true) => BidStatus::Shortlisted,
            (BidStatus::Pending, false) | (BidStatus::Shortlisted, false) => BidStatus::Pending,
            (status, _) => {
                return Err(TenderError::InvalidState(format!(
                    "bid `{}` is {status} and cannot be shortlisted",
                    bid.id
                )));
            }
        };

        let mut updated = bid.clone();
        if updated.status != target {
            updated.status = target;
            updated.updated_at = now;
        }
        Ok(updated)
    }

    /// Walks parent links from `bid_id` to the root and returns the chain newest-first.
    pub fn revision_chain(bid_id: &BidId, bids: &[Bid]) -> Result<Vec<Bid>, TenderError> {
        let by_id: HashMap<&BidId, &Bid> = bids.iter().map(|bid| (&bid.id, bid)).collect();
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut cursor = Some(bid_id);

        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(TenderError::InvalidState(format!(
                    "revision chain of bid `{bid_id}` loops at `{id}`"
                )));
            }
            let bid = by_id.get(id).ok_or_else(|| {
                if chain.is_empty() {
                    TenderError::bid_not_found(id.0.clone())
                } else {
                    TenderError::InvalidState(format!(
                        "revision chain of bid `{bid_id}` references missing bid `{id}`"
                    ))
                }
            })?;
            chain.push((*bid).clone());
            cursor = bid.parent_bid_id.as_ref();
        }

        Ok(chain)
    }
}

fn ensure_bidding_window(tender: &Tender, now: DateTime<Utc>) -> Result<(), TenderError> {
    if !tender.status.can_receive_bids() {
        return Err(TenderError::InvalidState(format!(
            "tender `{}` is {} and not accepting bids",
            tender.id, tender.status
        )));
    }
    if tender.deadline_passed(now) {
        return Err(TenderError::InvalidState(format!(
            "tender `{}` closed for bids at {}",
            tender.id,
            tender.closing_at.to_rfc3339()
        )));
    }
    Ok(())
}

fn ensure_bid_owner(bid: &Bid, actor: &Actor) -> Result<(), TenderError> {
    if actor.belongs_to(&bid.company_id) {
        Ok(())
    } else {
        Err(TenderError::Forbidden(format!(
            "bid `{}` belongs to company `{}`",
            bid.id, bid.company_id
        )))
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), TenderError> {
    if amount <= Decimal::ZERO {
        return Err(TenderError::Validation(format!("bid amount must be positive, got {amount}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{BidLedger, BidSubmission};
    use crate::domain::actor::{Actor, CompanyId, Role};
    use crate::domain::bid::{Bid, BidId, BidStatus};
    use crate::domain::tender::{Tender, TenderId, TenderStatus};
    use crate::errors::TenderError;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 9, 0, 0).single().expect("valid timestamp")
    }

    fn tender(status: TenderStatus) -> Tender {
        Tender {
            id: TenderId("T-1".into()),
            title: "Bridge inspection".into(),
            description: "Annual structural inspection".into(),
            closing_at: now() + Duration::days(3),
            publish_at: None,
            budget: Some(Decimal::new(50_000, 0)),
            owner_company_id: CompanyId("c-owner".into()),
            status,
            status_changed_at: now(),
            cancellation: None,
            award: None,
            ledger_proof: None,
            version: 3,
            created_at: now() - Duration::days(10),
            updated_at: now(),
        }
    }

    fn bidder(company: &str) -> Actor {
        Actor::new(format!("u-{company}"), Some(company), Role::User)
    }

    fn submission(amount: i64) -> BidSubmission {
        BidSubmission {
            amount: Decimal::new(amount, 0),
            document_ref: Some("docs/offer.pdf".into()),
        }
    }

    fn bid(id: &str, company: &str, status: BidStatus) -> Bid {
        Bid {
            id: BidId(id.into()),
            tender_id: TenderId("T-1".into()),
            company_id: CompanyId(company.into()),
            amount: Decimal::new(100, 0),
            document_ref: None,
            status,
            revision: 1,
            parent_bid_id: None,
            withdrawal: None,
            submitted_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn submit_creates_pending_first_revision() {
        let open = tender(TenderStatus::Open);
        let created =
            BidLedger::submit(&open, &bidder("c-a"), submission(100), now()).expect("submit");

        assert_eq!(created.status, BidStatus::Pending);
        assert_eq!(created.revision, 1);
        assert_eq!(created.parent_bid_id, None);
        assert_eq!(created.company_id, CompanyId("c-a".into()));
    }

    #[test]
    fn submit_outside_bidding_window_is_invalid_state() {
        for status in TenderStatus::ALL.into_iter().filter(|status| *status != TenderStatus::Open) {
            let result = BidLedger::submit(&tender(status), &bidder("c-a"), submission(100), now());
            assert!(matches!(result, Err(TenderError::InvalidState(_))), "{status}");
        }

        let open = tender(TenderStatus::Open);
        let at_deadline =
            BidLedger::submit(&open, &bidder("c-a"), submission(100), open.closing_at);
        assert!(matches!(at_deadline, Err(TenderError::InvalidState(_))));
    }

    #[test]
    fn submit_rejects_own_company_and_unaffiliated_actor() {
        let open = tender(TenderStatus::Open);

        assert_eq!(
            BidLedger::submit(&open, &bidder("c-owner"), submission(100), now()),
            Err(TenderError::SelfBidding)
        );
        assert_eq!(
            BidLedger::submit(&open, &Actor::new("u-x", None, Role::User), submission(100), now()),
            Err(TenderError::Unassigned)
        );
        assert!(matches!(
            BidLedger::submit(&open, &bidder("c-a"), submission(0), now()),
            Err(TenderError::Validation(_))
        ));
    }

    #[test]
    fn withdraw_checks_owner_then_status_then_window() {
        let open = tender(TenderStatus::Open);
        let pending = bid("B-1", "c-a", BidStatus::Pending);

        assert!(matches!(
            BidLedger::withdraw(&open, &pending, &bidder("c-b"), "changed mind", now()),
            Err(TenderError::Forbidden(_))
        ));

        let withdrawn = BidLedger::withdraw(&open, &pending, &bidder("c-a"), " capacity ", now())
            .expect("withdraw");
        assert_eq!(withdrawn.status, BidStatus::Withdrawn);
        assert_eq!(withdrawn.withdrawal.as_ref().map(|w| w.reason.as_str()), Some("capacity"));

        assert_eq!(
            BidLedger::withdraw(&open, &withdrawn, &bidder("c-a"), "again", now()),
            Err(TenderError::AlreadyWithdrawn(BidId("B-1".into())))
        );

        let evaluation = tender(TenderStatus::Evaluation);
        assert!(matches!(
            BidLedger::withdraw(&evaluation, &pending, &bidder("c-a"), "late", now()),
            Err(TenderError::InvalidState(_))
        ));
    }

    #[test]
    fn revise_supersedes_original_and_links_parent() {
        let open = tender(TenderStatus::Open);
        let mut original = bid("B-1", "c-a", BidStatus::Pending);
        original.document_ref = Some("docs/v1.pdf".into());

        let amount = Decimal::new(90, 0);
        let revision = BidLedger::revise(&open, &original, &bidder("c-a"), amount, None, now())
            .expect("revise");

        assert_eq!(revision.superseded.status, BidStatus::Superseded);
        assert_eq!(revision.revised.revision, 2);
        assert_eq!(revision.revised.parent_bid_id, Some(BidId("B-1".into())));
        assert_eq!(revision.revised.document_ref.as_deref(), Some("docs/v1.pdf"));
        assert_eq!(revision.revised.status, BidStatus::Pending);
    }

    #[test]
    fn revise_rejects_withdrawn_superseded_and_closed() {
        let open = tender(TenderStatus::Open);
        for status in [BidStatus::Withdrawn, BidStatus::Superseded] {
            let original = bid("B-1", "c-a", status);
            assert!(matches!(
                BidLedger::revise(&open, &original, &bidder("c-a"), Decimal::ONE, None, now()),
                Err(TenderError::InvalidState(_))
            ));
        }

        let original = bid("B-1", "c-a", BidStatus::Pending);
        assert!(matches!(
            BidLedger::revise(
                &open,
                &original,
                &bidder("c-a"),
                Decimal::ONE,
                None,
                open.closing_at,
            ),
            Err(TenderError::InvalidState(_))
        ));
        assert!(matches!(
            BidLedger::revise(&open, &original, &bidder("c-z"), Decimal::ONE, None, now()),
            Err(TenderError::Forbidden(_))
        ));
    }

    #[test]
    fn resolve_award_accepts_one_rejects_rest_and_skips_withdrawn() {
        let bids = vec![
            bid("B-1", "c-a", BidStatus::Pending),
            bid("B-2", "c-b", BidStatus::Shortlisted),
            bid("B-3", "c-c", BidStatus::Withdrawn),
            bid("B-4", "c-d", BidStatus::Pending),
        ];

        let resolution =
            BidLedger::resolve_award(&TenderId("T-1".into()), &bids, &BidId("B-2".into()), now())
                .expect("resolve");

        assert_eq!(resolution.winner.id, BidId("B-2".into()));
        assert_eq!(resolution.rejected, 2);
        assert_eq!(resolution.untouched, 1);
        let accepted =
            resolution.changed.iter().filter(|b| b.status == BidStatus::Accepted).count();
        assert_eq!(accepted, 1);
        assert!(resolution.changed.iter().all(|b| b.id != BidId("B-3".into())));
    }

    #[test]
    fn resolve_award_rejects_withdrawn_superseded_or_missing_target() {
        let bids = vec![
            bid("B-1", "c-a", BidStatus::Withdrawn),
            bid("B-2", "c-b", BidStatus::Pending),
            bid("B-3", "c-c", BidStatus::Superseded),
        ];
        let tender_id = TenderId("T-1".into());

        assert!(matches!(
            BidLedger::resolve_award(&tender_id, &bids, &BidId("B-1".into()), now()),
            Err(TenderError::InvalidBid(_))
        ));
        assert!(matches!(
            BidLedger::resolve_award(&tender_id, &bids, &BidId("B-3".into()), now()),
            Err(TenderError::InvalidBid(_))
        ));
        assert!(matches!(
            BidLedger::resolve_award(&tender_id, &bids, &BidId("B-9".into()), now()),
            Err(TenderError::NotFound { entity: "bid", .. })
        ));
    }

    #[test]
    fn shortlist_only_toggles_live_bids_during_evaluation() {
        let evaluation = tender(TenderStatus::Evaluation);
        let pending = bid("B-1", "c-a", BidStatus::Pending);
        let withdrawn = bid("B-2", "c-b", BidStatus::Withdrawn);

        let listed = BidLedger::shortlist(&evaluation, &pending, true, now()).expect("shortlist");
        assert_eq!(listed.status, BidStatus::Shortlisted);
        let unlisted = BidLedger::shortlist(&evaluation, &listed, false, now()).expect("unlist");
        assert_eq!(unlisted.status, BidStatus::Pending);

        assert!(matches!(
            BidLedger::shortlist(&tender(TenderStatus::Open), &pending, true, now()),
            Err(TenderError::InvalidState(_))
        ));
        assert!(matches!(
            BidLedger::shortlist(&evaluation, &withdrawn, true, now()),
            Err(TenderError::InvalidState(_))
        ));
    }

    #[test]
    fn revision_chain_walks_to_root_newest_first() {
        let root = bid("B-1", "c-a", BidStatus::Superseded);
        let mut middle = bid("B-2", "c-a", BidStatus::Superseded);
        middle.revision = 2;
        middle.parent_bid_id = Some(root.id.clone());
        let mut head = bid("B-3", "c-a", BidStatus::Pending);
        head.revision = 3;
        head.parent_bid_id = Some(middle.id.clone());

        let chain =
            BidLedger::revision_chain(&head.id, &[root.clone(), head.clone(), middle.clone()])
                .expect("chain");
        let revisions: Vec<u32> = chain.iter().map(|bid| bid.revision).collect();
        assert_eq!(revisions, vec![3, 2, 1]);
    }

    #[test]
    fn revision_chain_detects_cycles_and_gaps() {
        let mut first = bid("B-1", "c-a", BidStatus::Superseded);
        let mut second = bid("B-2", "c-a", BidStatus::Pending);
        first.parent_bid_id = Some(second.id.clone());
        second.parent_bid_id = Some(first.id.clone());

        assert!(matches!(
            BidLedger::revision_chain(&second.id, &[first, second.clone()]),
            Err(TenderError::InvalidState(_))
        ));

        let mut orphan = bid("B-5", "c-a", BidStatus::Pending);
        orphan.parent_bid_id = Some(BidId("B-missing".into()));
        assert!(matches!(
            BidLedger::revision_chain(&orphan.id, &[orphan.clone()]),
            Err(TenderError::InvalidState(_))
        ));
    }
}
