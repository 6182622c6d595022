mod embedded;
pub mod schema;
mod versioned_schema;

pub use embedded::EmbeddedDb;
pub use schema::{
    AUTH_SESSIONS_TABLE, FAVORITE_SONGS_TABLE, PLAYBACK_LOGS_TABLE, PLAYLIST_ITEMS_TABLE,
    USERS_TABLE, VERSIONED_SCHEMAS,
};
pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
