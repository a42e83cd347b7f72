//! Per-connection sync state and run reports.

use crate::ids::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a connection's sync currently stands.
///
/// `Completed` and `Failed` keep the outcome of the last run visible. Both
/// behave like `Idle` for scheduling: a new run may start from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    /// No run has been recorded for the connection since the engine
    /// started, or the connection was deleted.
    #[default]
    Idle,
    /// Validating the URL and opening the address book.
    Connecting,
    /// Applying remote changes locally.
    Pulling,
    /// Sending local changes to the server.
    Pushing,
    /// The last run finished. A new run may start.
    Completed,
    /// The last run failed or was cancelled. A new run may start.
    Failed,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Pulling | Self::Pushing)
    }

    /// Returns true if a new run may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// What one sync run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Connection synchronized.
    pub connection_id: ConnectionId,
    /// Local contacts created from remote objects.
    pub created_local: usize,
    /// Local contacts overwritten with remote versions.
    pub updated_local: usize,
    /// Local contacts deleted because their remote object disappeared.
    pub deleted_local: usize,
    /// Remote objects staged for review.
    pub staged: usize,
    /// Open conflicts after the run.
    pub conflicts: usize,
    /// Concurrent edits settled by the connection's conflict policy.
    pub auto_resolved: usize,
    /// Remote objects created.
    pub pushed_creates: usize,
    /// Remote objects updated.
    pub pushed_updates: usize,
    /// Remote objects deleted.
    pub deleted_remote: usize,
    /// Remote objects that needed no work.
    pub unchanged: usize,
    /// Objects skipped because of a per-object error.
    pub errors: usize,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl SyncReport {
    /// Creates an empty report for a run starting now.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            created_local: 0,
            updated_local: 0,
            deleted_local: 0,
            staged: 0,
            conflicts: 0,
            auto_resolved: 0,
            pushed_creates: 0,
            pushed_updates: 0,
            deleted_remote: 0,
            unchanged: 0,
            errors: 0,
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Number of local writes.
    pub fn pulled(&self) -> usize {
        self.created_local + self.updated_local + self.deleted_local
    }

    /// Number of remote writes.
    pub fn pushed(&self) -> usize {
        self.pushed_creates + self.pushed_updates + self.deleted_remote
    }

    /// Whether the run changed nothing on either side.
    pub fn is_noop(&self) -> bool {
        self.pulled() == 0 && self.pushed() == 0 && self.staged == 0 && self.auto_resolved == 0
    }
}
