use serde::Serialize;
use tenderbridge_core::{
    AwardJob, AwardJobId, AwardJobQueue, AwardJobState, AwardJobTransition, StoreError, TenderId,
};
use tenderbridge_db::SqlAwardJobQueue;

use crate::commands::{with_database, CommandResult, EXIT_CONFIG, EXIT_NOT_FOUND, EXIT_OPERATION};

const COMMAND: &str = "jobs";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobQuery {
    List { state: Option<String>, limit: u32 },
    Tender(String),
    Job(String),
}

#[derive(Debug, Serialize)]
struct JobDetail {
    job: AwardJob,
    transitions: Vec<AwardJobTransition>,
}

pub fn run(query: JobQuery) -> CommandResult {
    let state_filter = match &query {
        JobQuery::List { state: Some(raw), .. } => match AwardJobState::parse(raw.trim()) {
            Some(state) => Some(state),
            None => {
                return CommandResult::failure(
                    COMMAND,
                    "invalid_argument",
                    format!(
                        "unknown job state `{raw}` \
                         (expected enqueued|running|retryable_failed|committed|failed)"
                    ),
                    EXIT_CONFIG,
                );
            }
        },
        _ => None,
    };

    with_database(COMMAND, |_config, pool| async move {
        let queue = SqlAwardJobQueue::new(pool);
        let persistence = |error: StoreError| {
            ("persistence", error.to_string(), EXIT_OPERATION)
        };

        match query {
            JobQuery::Job(job_id) => {
                let job_id = AwardJobId(job_id);
                let job = queue.find_job(&job_id).await.map_err(persistence)?.ok_or_else(|| {
                    ("not_found", format!("award job `{job_id}` not found"), EXIT_NOT_FOUND)
                })?;
                let transitions = queue.list_transitions(&job_id).await.map_err(persistence)?;
                let message = format!(
                    "job `{job_id}` is {} after {} transition(s)",
                    job.state.as_str(),
                    transitions.len()
                );
                Ok(CommandResult::success_with(COMMAND, message, JobDetail { job, transitions }))
            }
            JobQuery::Tender(tender_id) => {
                let jobs = queue
                    .list_jobs_for_tender(&TenderId(tender_id.clone()))
                    .await
                    .map_err(persistence)?;
                let message = format!("{} job(s) for tender `{tender_id}`", jobs.len());
                Ok(CommandResult::success_with(COMMAND, message, jobs))
            }
            JobQuery::List { limit, .. } => {
                let jobs = queue.list_jobs(state_filter, limit).await.map_err(persistence)?;
                let message = match state_filter {
                    Some(state) => format!("{} job(s) in state {}", jobs.len(), state.as_str()),
                    None => format!("{} job(s)", jobs.len()),
                };
                Ok(CommandResult::success_with(COMMAND, message, jobs))
            }
        }
    })
}
