pub mod auth;
pub mod models;
mod remote_store;
mod service;
mod sqlite_store;
mod store;

pub use models::{
    FavoriteSong, NewFavorite, NewPlaylistItem, PlaylistItem, SessionUser, User, UserRole,
    DEFAULT_PLAYLIST_ID,
};
pub use remote_store::RemoteLibraryStore;
pub use service::{DomainError, LibraryService, PersistedSession};
pub use sqlite_store::SqliteLibraryStore;
pub use store::LibraryStore;
