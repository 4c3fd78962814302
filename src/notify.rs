//! Progress event notifications
//!
//! Fire-and-forget events emitted as the cascade unlocks and completes
//! units. A mailer or websocket layer may subscribe by implementing
//! `Notifier`; the default sink drops everything, and notifier failures
//! are logged without ever affecting engine state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{StudentId, UnitId, UnitKind};

/// Something worth telling the outside world about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// A unit became accessible to the student
    UnitUnlocked {
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
    },
    /// A unit crossed its completion threshold
    UnitCompleted {
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
    },
    /// A whole module was completed (also emitted as `UnitCompleted`)
    ModuleCompleted { student: StudentId, module: UnitId },
}

/// Subscriber for progress events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ProgressEvent) -> anyhow::Result<()>;
}

/// Default sink: discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: ProgressEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
