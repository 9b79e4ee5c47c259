//! Backend synchronization layer.
//!
//! Mirrors the local goals and logs to a hosted backend. The local store is
//! the source of truth; see [`Reconciler`] for the pull/push contract.

pub mod backend;
pub mod device_id;
pub mod memory;
pub mod merge;
pub mod reconciler;
pub mod supabase;
pub mod sync_queue;
pub mod types;

pub use backend::{AuthSession, GoalRow, LogRow, RemoteBackend};
pub use device_id::{get_or_create_device_id, DeviceIdError};
pub use memory::MemoryBackend;
pub use merge::{merge_goals, merge_logs};
pub use reconciler::Reconciler;
pub use supabase::SupabaseBackend;
pub use sync_queue::SyncQueue;
pub use types::{
    Collection, PullOutcome, PushOutcome, SkipReason, SyncError, SyncEvent, SyncStatus,
};
