//! Offline migration tool: copies rows from the embedded SQLite database to
//! the remote store in id-ordered batches using idempotent upserts. Safe to
//! re-run; an already-synced pair of stores gains zero rows.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OpenFlags};
use serde_json::{json, Value};
use std::path::PathBuf;

use lizhi_player_server::config::resolve_sync_db_path;
use lizhi_player_server::supabase::{SupabaseClient, SupabaseConfig};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database. Defaults to the standard location.
    #[clap(long)]
    pub db: Option<PathBuf>,

    /// Rows per upsert batch (falls back to SUPABASE_SYNC_BATCH_SIZE).
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Read and report without writing to the remote store.
    #[clap(long)]
    pub dry_run: bool,

    /// Only sync playback logs created at or after this timestamp.
    #[clap(long)]
    pub from_created_at: Option<String>,
}

struct TableSpec {
    name: &'static str,
    conflict_columns: &'static [&'static str],
}

const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "users",
        conflict_columns: &["id"],
    },
    TableSpec {
        name: "auth_sessions",
        conflict_columns: &["token_hash"],
    },
    TableSpec {
        name: "favorite_songs",
        conflict_columns: &["user_id", "song_id"],
    },
    TableSpec {
        name: "playlist_items",
        conflict_columns: &["user_id", "playlist_id", "song_id"],
    },
    TableSpec {
        name: "playback_logs",
        conflict_columns: &["id"],
    },
];

struct TableOutcome {
    name: &'static str,
    skipped: bool,
    synced_rows: usize,
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_json(table: &str, row: &rusqlite::Row) -> rusqlite::Result<Value> {
    let value = match table {
        "users" => json!({
            "id": row.get::<_, i64>(0)?,
            "email": row.get::<_, String>(1)?,
            "password_hash": row.get::<_, String>(2)?,
            "role": row.get::<_, String>(3)?,
            "is_active": row.get::<_, i64>(4)? == 1,
            "created_at": row.get::<_, String>(5)?,
            "updated_at": row.get::<_, String>(6)?,
        }),
        "auth_sessions" => json!({
            "id": row.get::<_, i64>(0)?,
            "user_id": row.get::<_, i64>(1)?,
            "token_hash": row.get::<_, String>(2)?,
            "created_at": row.get::<_, String>(3)?,
            "expires_at": row.get::<_, String>(4)?,
        }),
        "favorite_songs" => json!({
            "id": row.get::<_, i64>(0)?,
            "user_id": row.get::<_, i64>(1)?,
            "song_id": row.get::<_, String>(2)?,
            "song_title": row.get::<_, String>(3)?,
            "album_name": row.get::<_, String>(4)?,
            "created_at": row.get::<_, String>(5)?,
        }),
        "playlist_items" => json!({
            "id": row.get::<_, i64>(0)?,
            "user_id": row.get::<_, i64>(1)?,
            "playlist_id": row.get::<_, String>(2)?,
            "song_id": row.get::<_, String>(3)?,
            "song_title": row.get::<_, String>(4)?,
            "album_name": row.get::<_, String>(5)?,
            "position": row.get::<_, i64>(6)?,
            "created_at": row.get::<_, String>(7)?,
        }),
        "playback_logs" => json!({
            "id": row.get::<_, i64>(0)?,
            "session_id": row.get::<_, String>(1)?,
            "song_id": row.get::<_, String>(2)?,
            "song_title": row.get::<_, String>(3)?,
            "album_name": row.get::<_, String>(4)?,
            "event": row.get::<_, String>(5)?,
            "position_seconds": row.get::<_, f64>(6)?,
            "played_seconds": row.get::<_, f64>(7)?,
            "duration_seconds": row.get::<_, Option<f64>>(8)?,
            "pathname": row.get::<_, String>(9)?,
            "user_agent": row.get::<_, String>(10)?,
            "created_at": row.get::<_, String>(11)?,
            "user_id": row.get::<_, Option<i64>>(12)?,
        }),
        other => {
            return Err(rusqlite::Error::InvalidParameterName(format!(
                "unknown table {}",
                other
            )))
        }
    };
    Ok(value)
}

fn select_columns(table: &str) -> &'static str {
    match table {
        "users" => "id, email, password_hash, role, is_active, created_at, updated_at",
        "auth_sessions" => "id, user_id, token_hash, created_at, expires_at",
        "favorite_songs" => "id, user_id, song_id, song_title, album_name, created_at",
        "playlist_items" => {
            "id, user_id, playlist_id, song_id, song_title, album_name, position, created_at"
        }
        "playback_logs" => {
            "id, session_id, song_id, song_title, album_name, event, position_seconds, \
             played_seconds, duration_seconds, pathname, user_agent, created_at, user_id"
        }
        _ => "*",
    }
}

fn read_batch(
    conn: &Connection,
    table: &str,
    last_id: i64,
    batch_size: usize,
    from_created_at: Option<&str>,
) -> Result<Vec<(i64, Value)>> {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE id > ?1",
        select_columns(table),
        table
    );
    let mut query_params: Vec<SqlValue> = vec![SqlValue::from(last_id)];

    if table == "playback_logs" {
        if let Some(bound) = from_created_at {
            sql.push_str(" AND created_at >= ?2");
            query_params.push(SqlValue::from(bound.to_string()));
        }
    }
    sql.push_str(&format!(" ORDER BY id ASC LIMIT {}", batch_size));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(query_params.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row_to_json(table, row)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn sync_table(
    conn: &Connection,
    client: &SupabaseClient,
    spec: &TableSpec,
    batch_size: usize,
    dry_run: bool,
    from_created_at: Option<&str>,
) -> Result<TableOutcome> {
    if !table_exists(conn, spec.name)? {
        return Ok(TableOutcome {
            name: spec.name,
            skipped: true,
            synced_rows: 0,
        });
    }

    let mut last_id = 0i64;
    let mut synced_rows = 0usize;

    loop {
        let batch = read_batch(conn, spec.name, last_id, batch_size, from_created_at)?;
        if batch.is_empty() {
            break;
        }
        last_id = batch.last().map(|(id, _)| *id).unwrap_or(last_id);
        let rows: Vec<Value> = batch.into_iter().map(|(_, value)| value).collect();

        if !dry_run {
            client
                .upsert_rows(spec.name, &rows, spec.conflict_columns)
                .await
                .with_context(|| format!("Upsert failed for {}", spec.name))?;
        }
        synced_rows += rows.len();
        println!("[{}] synced {} rows...", spec.name, synced_rows);
    }

    Ok(TableOutcome {
        name: spec.name,
        skipped: false,
        synced_rows,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let mut supabase_config = SupabaseConfig::from_env();
    supabase_config.require_credentials()?;
    // this tool exists to reach the remote store, even when live mirroring
    // is switched off
    supabase_config.enabled = true;
    let client = SupabaseClient::new(supabase_config.clone());

    let batch_size = cli_args
        .batch_size
        .or_else(|| {
            std::env::var("SUPABASE_SYNC_BATCH_SIZE")
                .ok()
                .and_then(|value| value.trim().parse().ok())
        })
        .unwrap_or(500)
        .max(1);

    let db_path = resolve_sync_db_path(cli_args.db.as_deref());
    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    println!("SQLite DB: {}", db_path.display());
    println!("Remote: {}", supabase_config.base_url);
    println!("Schema: {}", supabase_config.schema);
    println!("Batch size: {}", batch_size);
    println!("Dry run: {}", if cli_args.dry_run { "yes" } else { "no" });
    if let Some(bound) = &cli_args.from_created_at {
        println!("Playback logs from: {}", bound);
    }

    let mut missing_remote_tables = Vec::new();
    for spec in TABLES {
        if !client.table_exists(spec.name).await? {
            missing_remote_tables.push(spec.name);
        }
    }
    if !missing_remote_tables.is_empty() {
        bail!(
            "Missing remote tables: {}. Create them on the remote store first.",
            missing_remote_tables.join(", ")
        );
    }

    let mut results = Vec::new();
    for spec in TABLES {
        let outcome = sync_table(
            &conn,
            &client,
            spec,
            batch_size,
            cli_args.dry_run,
            cli_args.from_created_at.as_deref(),
        )
        .await?;
        results.push(outcome);
    }

    println!();
    println!("Migration summary:");
    for outcome in &results {
        if outcome.skipped {
            println!("- {}: skipped (table not found in sqlite)", outcome.name);
        } else {
            println!("- {}: {} rows", outcome.name, outcome.synced_rows);
        }
    }

    Ok(())
}
