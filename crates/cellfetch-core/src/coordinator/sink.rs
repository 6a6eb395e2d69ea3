//! Outbound boundary to the presentation layer.

use crate::fetcher::FetchOutcome;
use crate::key::{PositionId, ResourceKey};
use tokio::sync::mpsc;
use tracing::debug;

/// Result for a position, handed over exactly once per satisfied request.
#[derive(Debug)]
pub struct Delivery {
    pub position: PositionId,
    /// The resource the position asked for.
    pub key: ResourceKey,
    pub outcome: FetchOutcome,
}

/// Consumer of deliveries, typically the code that updates row views.
///
/// Called on the coordinator's owning context.
pub trait ResultSink {
    fn deliver(&mut self, delivery: Delivery);
}

impl<F> ResultSink for F
where
    F: FnMut(Delivery),
{
    fn deliver(&mut self, delivery: Delivery) {
        self(delivery)
    }
}

impl ResultSink for mpsc::UnboundedSender<Delivery> {
    fn deliver(&mut self, delivery: Delivery) {
        if let Err(e) = self.send(delivery) {
            debug!("Result sink closed, dropping delivery for {}", e.0.position);
        }
    }
}

impl ResultSink for Vec<Delivery> {
    fn deliver(&mut self, delivery: Delivery) {
        self.push(delivery);
    }
}
