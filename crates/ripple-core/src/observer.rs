//! Observers of cell settlement.
//!
//! Every change of a cell's result is delivered to the cell's observers in
//! registration order. Presentation layers consume results exclusively
//! through this capability.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::graph::CellKey;
use crate::runtime::Cell;

/// Receives a cell's settled-state transitions.
///
/// Observers run synchronously inside the runtime. A panicking observer is
/// logged and skipped; it never stops delivery to later observers.
pub trait Observer: Send + Sync {
    /// The cell settled to `Done(value)`.
    fn fulfilled(&self, cell: &Cell, value: &Value);

    /// The cell is waiting.
    fn pending(&self, cell: &Cell);

    /// The cell failed (`Some(reason)`) or went dormant (`None`).
    fn rejected(&self, cell: &Cell, reason: Option<&str>);
}

/// One delivery, detached from the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CellEvent {
    Fulfilled {
        key: CellKey,
        name: Option<String>,
        value: Value,
    },
    Pending {
        key: CellKey,
        name: Option<String>,
    },
    Rejected {
        key: CellKey,
        name: Option<String>,
        reason: Option<String>,
    },
}

impl CellEvent {
    pub fn key(&self) -> CellKey {
        match self {
            CellEvent::Fulfilled { key, .. }
            | CellEvent::Pending { key, .. }
            | CellEvent::Rejected { key, .. } => *key,
        }
    }
}

/// Forwards every delivery as a [`CellEvent`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<CellEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<CellEvent>) -> Self {
        Self { tx }
    }

    /// Create an observer together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: CellEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("observer channel closed, dropping event");
        }
    }
}

impl Observer for ChannelObserver {
    fn fulfilled(&self, cell: &Cell, value: &Value) {
        self.send(CellEvent::Fulfilled {
            key: cell.key(),
            name: cell.name().map(str::to_string),
            value: value.clone(),
        });
    }

    fn pending(&self, cell: &Cell) {
        self.send(CellEvent::Pending {
            key: cell.key(),
            name: cell.name().map(str::to_string),
        });
    }

    fn rejected(&self, cell: &Cell, reason: Option<&str>) {
        self.send(CellEvent::Rejected {
            key: cell.key(),
            name: cell.name().map(str::to_string),
            reason: reason.map(str::to_string),
        });
    }
}
