pub mod archive;
pub mod backend;
pub mod schema;
pub mod site;
pub mod snapshot;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `multisites_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
