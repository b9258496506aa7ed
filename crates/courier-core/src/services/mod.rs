//! Services shared across engine components and hosts

mod database;

pub use database::DatabaseService;
