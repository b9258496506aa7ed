pub mod common;
pub mod config;
pub mod ledger;
pub mod status;
pub mod sync;
pub mod token;
pub mod watch;
