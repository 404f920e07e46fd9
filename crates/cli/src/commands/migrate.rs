use crate::commands::{with_database, CommandResult};
use tenderbridge_db::migrations;

const EXIT_MIGRATION: u8 = 5;

pub fn run() -> CommandResult {
    with_database("migrate", |_config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let applied = migrations::MIGRATOR.iter().count();
        Ok(CommandResult::success(
            "migrate",
            format!("applied pending migrations ({applied} known)"),
        ))
    })
}
