pub mod backend;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `sitelens_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
