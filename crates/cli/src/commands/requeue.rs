use std::sync::Arc;

use tenderbridge_core::{AwardJobEngine, SystemClock, TenderLifecycleService, TracingEventSink};
use tenderbridge_db::{SqlAwardJobQueue, SqlTenderStore};

use crate::commands::{with_database, CommandResult, EXIT_OPERATION};

pub fn run() -> CommandResult {
    with_database("requeue-awards", |config, pool| async move {
        let lifecycle = TenderLifecycleService::new(
            Arc::new(SqlTenderStore::new(pool.clone())),
            Arc::new(SqlAwardJobQueue::new(pool)),
            Arc::new(TracingEventSink),
            Arc::new(SystemClock),
            AwardJobEngine::new(config.job_engine_config()),
            config.lifecycle_settings(),
        );

        let report = lifecycle
            .requeue_unmirrored_awards()
            .await
            .map_err(|error| ("requeue", error.to_string(), EXIT_OPERATION))?;

        let message = format!(
            "enqueued {}, already queued {}, skipped {}",
            report.enqueued.len(),
            report.already_queued.len(),
            report.skipped.len()
        );
        Ok(CommandResult::success_with("requeue-awards", message, report))
    })
}
