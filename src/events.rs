//! Lifecycle notifications emitted by the registry and the ledger
//!
//! Observers are injected at construction time as an [`EventSink`]. A
//! `crossbeam_channel::Sender` works directly as a sink; closures can be
//! wrapped in [`CallbackSink`].

use std::sync::Arc;

use bitcoin::OutPoint;

/// Something observable happened to an asset or a balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    AssetInserted(u32),
    AssetUpdated(u32),
    AssetDeleted(u32),
    AssetVisibilityChanged(u32),
    AssetValidationStarted(u32),
    AssetValidationCompleted(u32),
    /// A balance row received a positive confirmed or calculated quantity
    BalanceValid {
        txout: OutPoint,
        asset_id: u32,
        quantity: u64,
    },
}

/// Receiver of [`AssetEvent`]s
pub trait EventSink: Send + Sync {
    fn notify(&self, event: AssetEvent);
}

impl EventSink for crossbeam_channel::Sender<AssetEvent> {
    fn notify(&self, event: AssetEvent) {
        // A dropped receiver just means nobody is listening anymore
        if self.send(event).is_err() {
            log::debug!("Event receiver disconnected");
        }
    }
}

/// Adapter turning a closure into an [`EventSink`]
pub struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(AssetEvent) + Send + Sync,
{
    fn notify(&self, event: AssetEvent) {
        (self.0)(event)
    }
}

/// Optional sink shared by a store
#[derive(Clone, Default)]
pub(crate) struct Events {
    sink: Option<Arc<dyn EventSink>>,
}

impl Events {
    pub(crate) fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: AssetEvent) {
        if let Some(sink) = &self.sink {
            sink.notify(event);
        }
    }
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Events")
            .field("attached", &self.sink.is_some())
            .finish()
    }
}
