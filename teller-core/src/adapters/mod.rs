//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for a local, single-file backend (data and identity)
//! - A blocking HTTP client for a hosted PostgREST/GoTrue backend
//! - Session persistence shared by both identity providers

pub mod duckdb;
pub mod hosted;
pub mod session_file;

#[cfg(test)]
pub mod hosted_mock;
