//! Backend selection and best-effort mirroring.

mod mirror;

pub use mirror::{spawn_mirror_worker, MirrorHandle, MirrorJob};

use crate::supabase::SupabaseConfig;

/// Process-wide backend selection, resolved once at startup and injected into
/// the services.
///
/// `enabled=false`: the remote store is never contacted. `enabled=true,
/// remote_primary=false`: the embedded store is authoritative and every
/// committed mutation is mirrored to the remote store. `enabled=true,
/// remote_primary=true`: the remote store is authoritative and mutations are
/// mirrored to the embedded store as a local backup.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    pub enabled: bool,
    pub remote_primary: bool,
}

impl SyncPolicy {
    pub fn from_config(config: &SupabaseConfig) -> SyncPolicy {
        SyncPolicy {
            enabled: config.enabled,
            remote_primary: config.primary,
        }
    }

    pub fn local_only() -> SyncPolicy {
        SyncPolicy {
            enabled: false,
            remote_primary: false,
        }
    }

    pub fn mirroring_enabled(&self) -> bool {
        self.enabled
    }
}
