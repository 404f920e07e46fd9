use std::sync::Arc;

use tenderbridge_core::ledger::{verify_award, verify_award_by_commit_ref, AwardVerification};
use tenderbridge_core::{SystemClock, TenderId, TenderStore};
use tenderbridge_db::SqlTenderStore;
use tenderbridge_server::build_ledger;

use crate::commands::{with_database, CommandResult, EXIT_CONFIG, EXIT_NOT_FOUND, EXIT_OPERATION};

const COMMAND: &str = "verify-award";
const EXIT_UNVERIFIED: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyTarget {
    Tender(String),
    CommitRef(String),
}

pub fn run(target: VerifyTarget) -> CommandResult {
    with_database(COMMAND, |config, pool| async move {
        let ledger = build_ledger(&config, Arc::new(SystemClock))
            .map_err(|error| ("ledger_config", error.to_string(), EXIT_CONFIG))?;

        let verification = match target {
            VerifyTarget::Tender(tender_id) => {
                let store = SqlTenderStore::new(pool);
                let tender = store
                    .find_tender(&TenderId(tender_id.clone()))
                    .await
                    .map_err(|error| ("persistence", error.to_string(), EXIT_OPERATION))?
                    .ok_or_else(|| {
                        ("not_found", format!("tender `{tender_id}` not found"), EXIT_NOT_FOUND)
                    })?;
                verify_award(ledger.as_ref(), &tender).await
            }
            VerifyTarget::CommitRef(commit_ref) => {
                verify_award_by_commit_ref(ledger.as_ref(), &commit_ref).await
            }
        };

        Ok(render(verification))
    })
}

fn render(verification: AwardVerification) -> CommandResult {
    if verification.verified {
        let message = match &verification.tender_id {
            Some(tender_id) => format!("award for tender `{tender_id}` matches the ledger"),
            None => "award matches the ledger".to_string(),
        };
        return CommandResult::success_with(COMMAND, message, verification);
    }

    let reason = verification.reason.clone().unwrap_or_else(|| "not verified".to_string());
    CommandResult::failure_with(COMMAND, "unverified", reason, EXIT_UNVERIFIED, verification)
}
