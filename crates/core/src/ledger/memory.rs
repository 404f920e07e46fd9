use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::clock::{Clock, SystemClock};
use crate::domain::tender::TenderId;
use crate::ledger::{
    encode_hex, sha256_hex, AwardLedgerClient, AwardRecordRequest, LedgerError, LedgerReceipt,
    LookupMethod, OnLedgerAward,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub request: AwardRecordRequest,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub recorded_at: DateTime<Utc>,
    pub signer_id: String,
    pub signature: String,
}

impl LedgerEntry {
    fn commit_ref(&self) -> String {
        format!("0x{}", self.entry_hash)
    }

    fn to_award(&self, method: LookupMethod) -> OnLedgerAward {
        let sequence = match method {
            LookupMethod::ContractStorage => None,
            LookupMethod::TransactionLog => Some(self.sequence),
        };
        OnLedgerAward {
            tender_id: self.request.tender_id.clone(),
            winning_bid_id: self.request.winning_bid_id.clone(),
            winning_company_id: self.request.winning_company_id.clone(),
            award_amount_minor: self.request.award_amount_minor,
            recorded_at: self.recorded_at,
            awarded_by: self.signer_id.clone(),
            content_hash: self.request.content_hash.clone(),
            method,
            commit_ref: Some(self.commit_ref()),
            sequence,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub verified_entries: usize,
    pub latest_hash: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    pending_failures: u32,
    record_calls: u32,
}

/// Append-only, HMAC-signed hash chain standing in for the external award ledger.
/// One record per tender; a second record for the same tender is rejected.
#[derive(Clone)]
pub struct InMemoryAwardLedger {
    signing_key: Vec<u8>,
    signer_id: String,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryAwardLedger {
    pub fn new(signing_key: impl AsRef<[u8]>, signer_id: impl Into<String>) -> Self {
        Self::with_clock(signing_key, signer_id, Arc::new(SystemClock))
    }

    pub fn with_clock(
        signing_key: impl AsRef<[u8]>,
        signer_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signing_key: signing_key.as_ref().to_vec(),
            signer_id: signer_id.into(),
            clock,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Makes the next `count` submissions fail as if the ledger were unreachable.
    pub fn fail_next(&self, count: u32) {
        self.lock().pending_failures = count;
    }

    pub fn record_calls(&self) -> u32 {
        self.lock().record_calls
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().entries.clone()
    }

    pub fn verify_chain(&self) -> ChainVerification {
        let state = self.lock();
        let mut previous_hash: Option<String> = None;

        for (index, entry) in state.entries.iter().enumerate() {
            let failure = if entry.sequence != index as u64 + 1 {
                Some(format!("sequence mismatch at entry {}", entry.sequence))
            } else if entry.prev_hash != previous_hash {
                Some(format!("previous hash mismatch at entry {}", entry.sequence))
            } else if entry_hash(entry) != entry.entry_hash {
                Some(format!("entry hash mismatch at entry {}", entry.sequence))
            } else if hmac_hex(&self.signing_key, entry.entry_hash.as_bytes()) != entry.signature {
                Some(format!("signature mismatch at entry {}", entry.sequence))
            } else {
                None
            };

            if let Some(reason) = failure {
                return ChainVerification {
                    valid: false,
                    verified_entries: index,
                    latest_hash: previous_hash,
                    failure_reason: Some(reason),
                };
            }
            previous_hash = Some(entry.entry_hash.clone());
        }

        ChainVerification {
            valid: true,
            verified_entries: state.entries.len(),
            latest_hash: previous_hash,
            failure_reason: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl AwardLedgerClient for InMemoryAwardLedger {
    async fn record_award(
        &self,
        request: &AwardRecordRequest,
    ) -> Result<LedgerReceipt, LedgerError> {
        let recorded_at = self.clock.now();
        let mut state = self.lock();
        state.record_calls += 1;

        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(LedgerError::Unavailable("injected ledger outage".to_string()));
        }
        if request.facts.content_hash() != request.content_hash {
            return Err(LedgerError::Rejected("content hash does not match award facts".into()));
        }
        if state.entries.iter().any(|entry| entry.request.tender_id == request.tender_id) {
            return Err(LedgerError::Rejected(format!(
                "award already recorded for tender `{}`",
                request.tender_id
            )));
        }

        let mut entry = LedgerEntry {
            sequence: state.entries.len() as u64 + 1,
            request: request.clone(),
            prev_hash: state.entries.last().map(|entry| entry.entry_hash.clone()),
            entry_hash: String::new(),
            recorded_at,
            signer_id: self.signer_id.clone(),
            signature: String::new(),
        };
        entry.entry_hash = entry_hash(&entry);
        entry.signature = hmac_hex(&self.signing_key, entry.entry_hash.as_bytes());

        let receipt = LedgerReceipt {
            content_hash: request.content_hash.clone(),
            commit_ref: entry.commit_ref(),
            recorded_at,
        };
        state.entries.push(entry);
        Ok(receipt)
    }

    async fn get_award(&self, tender_id: &TenderId) -> Result<Option<OnLedgerAward>, LedgerError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .find(|entry| entry.request.tender_id == *tender_id)
            .map(|entry| entry.to_award(LookupMethod::ContractStorage)))
    }

    async fn get_award_by_commit_ref(
        &self,
        commit_ref: &str,
    ) -> Result<Option<OnLedgerAward>, LedgerError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .find(|entry| entry.commit_ref() == commit_ref)
            .map(|entry| entry.to_award(LookupMethod::TransactionLog)))
    }
}

fn entry_hash(entry: &LedgerEntry) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}",
        entry.sequence,
        entry.request.tender_id,
        entry.request.winning_bid_id,
        entry.request.winning_company_id,
        entry.request.award_amount_minor,
        entry.request.content_hash,
        entry.prev_hash.as_deref().unwrap_or(""),
        entry.recorded_at.to_rfc3339(),
        entry.signer_id,
    );
    sha256_hex(material.as_bytes())
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(payload),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::InMemoryAwardLedger;
    use crate::domain::actor::CompanyId;
    use crate::domain::bid::BidId;
    use crate::domain::tender::TenderId;
    use crate::ledger::{
        AwardFacts, AwardLedgerClient, AwardRecordRequest, LedgerError, LookupMethod,
    };

    fn request(tender: &str) -> AwardRecordRequest {
        AwardRecordRequest::from_facts(AwardFacts {
            tender_id: TenderId(tender.into()),
            tender_title: "Depot roof".into(),
            winning_bid_id: BidId("B-1".into()),
            winning_company_id: CompanyId("c-bidder".into()),
            award_amount_minor: 990_000,
            awarded_at: Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).single().expect("valid"),
            awarding_company_id: CompanyId("c-owner".into()),
        })
    }

    #[tokio::test]
    async fn records_are_queryable_by_tender_and_commit_ref() {
        let ledger = InMemoryAwardLedger::new("secret", "ledger-signer");
        let receipt = ledger.record_award(&request("T-1")).await.expect("record");

        let by_tender = ledger.get_award(&TenderId("T-1".into())).await.expect("query");
        let by_tender = by_tender.expect("stored");
        assert_eq!(by_tender.method, LookupMethod::ContractStorage);
        assert_eq!(by_tender.content_hash, receipt.content_hash);
        assert_eq!(by_tender.awarded_by, "ledger-signer");

        let by_ref = ledger
            .get_award_by_commit_ref(&receipt.commit_ref)
            .await
            .expect("query")
            .expect("stored");
        assert_eq!(by_ref.method, LookupMethod::TransactionLog);
        assert_eq!(by_ref.sequence, Some(1));
        assert_eq!(by_ref.commit_ref.as_deref(), Some(receipt.commit_ref.as_str()));

        assert_eq!(ledger.get_award(&TenderId("T-404".into())).await, Ok(None));
    }

    #[tokio::test]
    async fn duplicate_tender_and_tampered_hash_are_rejected() {
        let ledger = InMemoryAwardLedger::new("secret", "signer");
        ledger.record_award(&request("T-1")).await.expect("first record");

        assert!(matches!(
            ledger.record_award(&request("T-1")).await,
            Err(LedgerError::Rejected(_))
        ));

        let mut tampered = request("T-2");
        tampered.content_hash = "0xdeadbeef".into();
        assert!(matches!(ledger.record_award(&tampered).await, Err(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn injected_outage_fails_then_recovers() {
        let ledger = InMemoryAwardLedger::new("secret", "signer");
        ledger.fail_next(1);

        let first = ledger.record_award(&request("T-1")).await;
        assert!(matches!(first, Err(ref error) if error.is_retryable()));
        assert!(ledger.record_award(&request("T-1")).await.is_ok());
        assert_eq!(ledger.record_calls(), 2);
    }

    #[tokio::test]
    async fn hash_chain_verifies_and_detects_tampering() {
        let ledger = InMemoryAwardLedger::new("secret", "signer");
        for tender in ["T-1", "T-2", "T-3"] {
            ledger.record_award(&request(tender)).await.expect("record");
        }

        let verification = ledger.verify_chain();
        assert!(verification.valid);
        assert_eq!(verification.verified_entries, 3);

        {
            let mut state = ledger.lock();
            state.entries[1].request.award_amount_minor = 1;
        }
        let verification = ledger.verify_chain();
        assert!(!verification.valid);
        assert_eq!(verification.verified_entries, 1);
    }
}
