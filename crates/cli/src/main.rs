use std::process::ExitCode;

fn main() -> ExitCode {
    tenderbridge_cli::run()
}
