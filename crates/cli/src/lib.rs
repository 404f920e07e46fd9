pub mod commands;

use clap::{ArgGroup, Parser, Subcommand};
use std::process::ExitCode;

use commands::jobs::JobQuery;
use commands::verify_award::VerifyTarget;

#[derive(Debug, Parser)]
#[command(
    name = "tenderbridge",
    about = "TenderBridge operator CLI",
    long_about = "Operate TenderBridge migrations, config inspection, award verification, and the award ledger queue.",
    after_help = "Examples:\n  tenderbridge migrate\n  tenderbridge verify-award --tender T-100\n  tenderbridge jobs --state failed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(
        about = "Compare a tender's award against the ledger record",
        group(ArgGroup::new("target").required(true).args(["tender", "commit_ref"]))
    )]
    VerifyAward {
        #[arg(long, help = "Tender id; looks the award up by tender")]
        tender: Option<String>,
        #[arg(long, help = "Ledger commit reference; replays the transaction log")]
        commit_ref: Option<String>,
    },
    #[command(about = "Enqueue ledger commits for awarded tenders that carry no ledger proof")]
    RequeueAwards,
    #[command(about = "List award ledger jobs, or show one job with its transition history")]
    Jobs {
        #[arg(long, help = "Filter by state (enqueued|running|retryable_failed|committed|failed)")]
        state: Option<String>,
        #[arg(long, help = "Only jobs for this tender", conflicts_with = "state")]
        tender: Option<String>,
        #[arg(
            long,
            help = "Show a single job and its audit trail",
            conflicts_with_all = ["state", "tender"]
        )]
        job: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::VerifyAward { tender, commit_ref } => match (tender, commit_ref) {
            (Some(tender), _) => commands::verify_award::run(VerifyTarget::Tender(tender)),
            (None, Some(commit_ref)) => {
                commands::verify_award::run(VerifyTarget::CommitRef(commit_ref))
            }
            (None, None) => commands::CommandResult::failure(
                "verify-award",
                "invalid_argument",
                "either --tender or --commit-ref is required",
                2,
            ),
        },
        Command::RequeueAwards => commands::requeue::run(),
        Command::Jobs { state, tender, job, limit } => {
            let query = match (job, tender) {
                (Some(job), _) => JobQuery::Job(job),
                (None, Some(tender)) => JobQuery::Tender(tender),
                (None, None) => JobQuery::List { state, limit },
            };
            commands::jobs::run(query)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
