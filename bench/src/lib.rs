//! Audience Count Latency Benchmark
//!
//! Compares "how many users match predicate P" on two schema designs:
//! - **EAV schema**: `users` plus one `user_attributes` row per attribute,
//!   queried through correlated `EXISTS` subqueries
//! - **Denormalized schema**: `user_profiles`, one row per user with typed,
//!   indexed columns (hash-partitioned on PostgreSQL)
//!
//! Each scenario is timed on both schemas, the pair is turned into a speedup,
//! and the optimized latency is projected linearly to a target user count and
//! checked against a latency budget.
//!
//! Run against PostgreSQL: `cargo run --release`
//! Run against an in-memory SQLite fixture: `cargo run --release -- demo`

pub mod compare;
pub mod error;
pub mod executor;
pub mod extrapolate;
pub mod fixture;
pub mod harness;
pub mod plan;
pub mod report;
pub mod scenario;
pub mod store;
