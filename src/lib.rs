//! Personal music-streaming server: library & telemetry persistence engine
//! over an embedded SQLite store and an optional remote REST store, plus the
//! HTTP surface and offline sync tooling built on top of it.

pub mod config;
pub mod library;
pub mod server;
pub mod sqlite_persistence;
pub mod supabase;
pub mod sync;
pub mod telemetry;

pub use server::{make_app, run_server, AppState, RequestsLoggingLevel};
