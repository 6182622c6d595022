//! Verification companion to cli-sync: compares per-table row counts between
//! the embedded database and the remote store and reports OK/MISMATCH.

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;

use lizhi_player_server::config::resolve_sync_db_path;
use lizhi_player_server::supabase::{SupabaseClient, SupabaseConfig};

const TABLES: &[&str] = &[
    "users",
    "auth_sessions",
    "favorite_songs",
    "playlist_items",
    "playback_logs",
];

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database. Defaults to the standard location.
    #[clap(long)]
    pub db: Option<PathBuf>,
}

fn count_local_rows(conn: &Connection, table: &str) -> Result<Option<u64>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(None);
    }
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(Some(count.max(0) as u64))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let mut supabase_config = SupabaseConfig::from_env();
    supabase_config.require_credentials()?;
    supabase_config.enabled = true;
    let client = SupabaseClient::new(supabase_config.clone());

    let db_path = resolve_sync_db_path(cli_args.db.as_deref());
    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    println!("SQLite DB: {}", db_path.display());
    println!("Remote: {}", supabase_config.base_url);
    println!();

    for table in TABLES {
        let Some(local_count) = count_local_rows(&conn, table)? else {
            println!("- {}: sqlite table not found (skip)", table);
            continue;
        };
        if !client.table_exists(table).await? {
            println!("- {}: remote table missing", table);
            continue;
        }
        let remote_count = client.count_rows(table, &[]).await?;
        let status = if remote_count >= local_count {
            "OK"
        } else {
            "MISMATCH"
        };
        println!(
            "- {}: local={}, remote={} -> {}",
            table, local_count, remote_count, status
        );
    }

    Ok(())
}
