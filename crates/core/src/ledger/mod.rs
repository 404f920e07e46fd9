//! Award ledger contract and the canonical award-fact encoding shared by every client.

pub mod memory;
pub mod verify;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::actor::CompanyId;
use crate::domain::bid::{Bid, BidId};
use crate::domain::tender::{Tender, TenderId};

pub use memory::{ChainVerification, InMemoryAwardLedger};
pub use verify::{verify_award, verify_award_by_commit_ref, AwardVerification};

pub const DEFAULT_MINOR_UNIT_SCALE: u32 = 2;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger rejected the record: {0}")]
    Rejected(String),
    #[error("ledger response could not be decoded: {0}")]
    Decode(String),
    #[error("award facts are not encodable: {0}")]
    Encoding(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The hashed snapshot of an award. Derived from persisted rows, never stored on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardFacts {
    pub tender_id: TenderId,
    pub tender_title: String,
    pub winning_bid_id: BidId,
    pub winning_company_id: CompanyId,
    pub award_amount_minor: i64,
    pub awarded_at: DateTime<Utc>,
    pub awarding_company_id: CompanyId,
}

impl AwardFacts {
    /// Fails when the tender carries no award or the amount overflows the minor-unit integer.
    pub fn from_award(
        tender: &Tender,
        winning_bid: &Bid,
        amount: Decimal,
        minor_unit_scale: u32,
    ) -> Result<Self, LedgerError> {
        let award = tender.award.as_ref().ok_or_else(|| {
            LedgerError::Encoding(format!("tender `{}` has no award outcome", tender.id))
        })?;

        Ok(Self {
            tender_id: tender.id.clone(),
            tender_title: tender.title.clone(),
            winning_bid_id: winning_bid.id.clone(),
            winning_company_id: winning_bid.company_id.clone(),
            award_amount_minor: to_minor_units(amount, minor_unit_scale)?,
            awarded_at: award.awarded_at,
            awarding_company_id: tender.owner_company_id.clone(),
        })
    }

    /// Compact JSON, keys in ascending byte order, timestamp at microsecond precision.
    pub fn canonical_json(&self) -> String {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("award_amount_minor", Value::from(self.award_amount_minor));
        fields.insert(
            "awarded_at",
            Value::from(self.awarded_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        fields.insert("awarding_company_id", Value::from(self.awarding_company_id.0.clone()));
        fields.insert("tender_id", Value::from(self.tender_id.0.clone()));
        fields.insert("tender_title", Value::from(self.tender_title.clone()));
        fields.insert("winning_bid_id", Value::from(self.winning_bid_id.0.clone()));
        fields.insert("winning_company_id", Value::from(self.winning_company_id.0.clone()));

        let mut output = String::from("{");
        for (index, (key, value)) in fields.iter().enumerate() {
            if index > 0 {
                output.push(',');
            }
            output.push_str(&Value::from(*key).to_string());
            output.push(':');
            output.push_str(&value.to_string());
        }
        output.push('}');
        output
    }

    pub fn content_hash(&self) -> String {
        format!("0x{}", sha256_hex(self.canonical_json().as_bytes()))
    }
}

/// `trunc(amount * 10^scale)` as a signed integer.
pub fn to_minor_units(amount: Decimal, scale: u32) -> Result<i64, LedgerError> {
    let factor = 10_i64
        .checked_pow(scale)
        .ok_or_else(|| LedgerError::Encoding(format!("minor unit scale {scale} is too large")))?;
    amount
        .checked_mul(Decimal::from(factor))
        .and_then(|scaled| scaled.trunc().to_i64())
        .ok_or_else(|| LedgerError::Encoding(format!("amount {amount} overflows minor units")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardRecordRequest {
    pub tender_id: TenderId,
    pub winning_bid_id: BidId,
    pub winning_company_id: CompanyId,
    pub award_amount_minor: i64,
    pub content_hash: String,
    pub facts: AwardFacts,
}

impl AwardRecordRequest {
    pub fn from_facts(facts: AwardFacts) -> Self {
        Self {
            tender_id: facts.tender_id.clone(),
            winning_bid_id: facts.winning_bid_id.clone(),
            winning_company_id: facts.winning_company_id.clone(),
            award_amount_minor: facts.award_amount_minor,
            content_hash: facts.content_hash(),
            facts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub content_hash: String,
    pub commit_ref: String,
    pub recorded_at: DateTime<Utc>,
}

/// Retrieval strategy that produced an on-ledger record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMethod {
    ContractStorage,
    TransactionLog,
}

impl LookupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractStorage => "contract_storage",
            Self::TransactionLog => "transaction_log",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnLedgerAward {
    pub tender_id: TenderId,
    pub winning_bid_id: BidId,
    pub winning_company_id: CompanyId,
    pub award_amount_minor: i64,
    pub recorded_at: DateTime<Utc>,
    pub awarded_by: String,
    pub content_hash: String,
    pub method: LookupMethod,
    pub commit_ref: Option<String>,
    /// Log position; only transaction-log lookups report it.
    pub sequence: Option<u64>,
}

#[async_trait]
pub trait AwardLedgerClient: Send + Sync {
    async fn record_award(&self, request: &AwardRecordRequest)
        -> Result<LedgerReceipt, LedgerError>;

    async fn get_award(&self, tender_id: &TenderId) -> Result<Option<OnLedgerAward>, LedgerError>;

    async fn get_award_by_commit_ref(
        &self,
        commit_ref: &str,
    ) -> Result<Option<OnLedgerAward>, LedgerError>;
}

pub(crate) fn sha256_hex(payload: &[u8]) -> String {
    encode_hex(Sha256::digest(payload).as_slice())
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
