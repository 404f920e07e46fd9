pub mod bootstrap;
pub mod health;
pub mod ledger_http;
pub mod services;

pub use bootstrap::{bootstrap, bootstrap_with_config, build_ledger, Application, BootstrapError};
pub use ledger_http::HttpAwardLedgerClient;
