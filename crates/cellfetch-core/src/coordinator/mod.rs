//! Per-position task coordination.
//!
//! `PositionTaskCoordinator` keeps at most one live fetch per list position.
//! It is owned by a single control context (the one driving the list) and
//! mutated only through `&mut self`. Workers never touch the task map: they
//! post a `Completion` on an unbounded channel, and the owner drains it with
//! [`process_completions`](PositionTaskCoordinator::process_completions) or
//! [`process_next`](PositionTaskCoordinator::process_next).
//!
//! Each request is stamped with a generation. A completion is delivered only
//! if the position's current task is still live and carries the same
//! generation and key; anything else was cancelled or superseded and is
//! dropped.

mod sink;
mod task;

pub use sink::{Delivery, ResultSink};
pub use task::{FetchTask, TaskState};

use crate::fetcher::{Fetch, FetchOutcome, ResourceFetcher};
use crate::key::{PositionId, ResourceKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// What `request` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A live task for the same key already exists.
    Joined,
    /// A download was started.
    Network,
    /// The outcome came from cache and is queued for delivery.
    Cached,
}

#[derive(Debug)]
struct Completion {
    position: PositionId,
    key: ResourceKey,
    generation: u64,
    outcome: FetchOutcome,
}

/// Maps list positions to their in-flight fetches.
pub struct PositionTaskCoordinator<S: ResultSink> {
    fetcher: Arc<ResourceFetcher>,
    sink: S,
    tasks: HashMap<PositionId, FetchTask>,
    next_generation: u64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: ResultSink> PositionTaskCoordinator<S> {
    pub fn new(fetcher: Arc<ResourceFetcher>, sink: S) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            sink,
            tasks: HashMap::new(),
            next_generation: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn fetcher(&self) -> &Arc<ResourceFetcher> {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Ask for `key` at `position`.
    ///
    /// A live task for the same key is reused. A live task for a different
    /// key is cancelled before the new fetch starts.
    pub fn request(&mut self, position: PositionId, key: impl Into<ResourceKey>) -> Dispatch {
        let key = key.into();

        if let Some(task) = self.tasks.get_mut(&position) {
            if task.state.is_live() {
                if task.key == key {
                    return Dispatch::Joined;
                }
                debug!(
                    "Position {} now wants {}, cancelling fetch of {}",
                    position, key, task.key
                );
                task.cancel();
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        let tx = self.completions_tx.clone();
        let completion_key = key.clone();
        let fetch = self.fetcher.fetch(key.clone(), move |outcome| {
            let _ = tx.send(Completion {
                position,
                key: completion_key,
                generation,
                outcome,
            });
        });

        match fetch {
            Fetch::Deferred(handle) => {
                self.tasks
                    .insert(position, FetchTask::running(position, key, generation, handle));
                Dispatch::Network
            }
            Fetch::Immediate(outcome) => {
                self.tasks
                    .insert(position, FetchTask::pending(position, key.clone(), generation));
                let _ = self.completions_tx.send(Completion {
                    position,
                    key,
                    generation,
                    outcome,
                });
                Dispatch::Cached
            }
        }
    }

    /// Cancel the live task at `position`. Returns false if there was none.
    pub fn cancel(&mut self, position: PositionId) -> bool {
        match self.tasks.get_mut(&position) {
            Some(task) if task.state.is_live() => {
                debug!("Cancelling fetch of {} for position {}", task.key, position);
                task.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every live task.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for task in self.tasks.values_mut() {
            if task.state.is_live() {
                task.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// True while a download is running for `position`.
    pub fn is_in_flight(&self, position: PositionId) -> bool {
        self.task_state(position) == Some(TaskState::Running)
    }

    /// State of the most recent task recorded for `position`.
    pub fn task_state(&self, position: PositionId) -> Option<TaskState> {
        self.tasks.get(&position).map(|task| task.state)
    }

    pub fn task(&self, position: PositionId) -> Option<&FetchTask> {
        self.tasks.get(&position)
    }

    /// Number of running downloads.
    pub fn in_flight_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.state == TaskState::Running)
            .count()
    }

    fn live_count(&self) -> usize {
        self.tasks.values().filter(|task| task.state.is_live()).count()
    }

    /// Deliver every completion already queued. Returns how many reached the
    /// sink.
    pub fn process_completions(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            if self.complete(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait for the next completion that reaches the sink.
    ///
    /// Returns false once no live task remains to wait for.
    pub async fn process_next(&mut self) -> bool {
        while self.live_count() > 0 {
            match self.completions_rx.recv().await {
                Some(completion) => {
                    if self.complete(completion) {
                        return true;
                    }
                }
                None => return false,
            }
        }
        self.process_completions() > 0
    }

    fn complete(&mut self, completion: Completion) -> bool {
        let Completion {
            position,
            key,
            generation,
            outcome,
        } = completion;

        match self.tasks.get_mut(&position) {
            Some(task) if task.accepts(generation, &key) => {
                task.state = TaskState::Completed;
                task.cancel = None;
            }
            _ => {
                debug!(
                    "Dropping stale result of {} for position {} (generation {})",
                    key, position, generation
                );
                return false;
            }
        }

        self.sink.deliver(Delivery {
            position,
            key,
            outcome,
        });
        true
    }

    /// The rendering surface needs the image at `url` for `position`.
    pub fn needs_resource(&mut self, position: PositionId, url: &Url) -> Dispatch {
        self.request(position, url)
    }

    /// `position` scrolled out of the prefetch window.
    pub fn position_left_prefetch_window(&mut self, position: PositionId) -> bool {
        self.cancel(position)
    }

    /// The view at `position` is being recycled for other content.
    pub fn position_reused(&mut self, position: PositionId) -> bool {
        let cancelled = self.cancel(position);
        if cancelled {
            debug!("Position {} reused with a fetch still live", position);
        }
        cancelled
    }
}

impl<S: ResultSink> Drop for PositionTaskCoordinator<S> {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!("Coordinator dropped, cancelled {} live fetches", cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageErrorKind;
    use crate::testing::{fetcher_with, png_bytes, ScriptedTransport};
    use std::time::Duration;

    const URL_A: &str = "https://img.example.com/a.png";
    const URL_B: &str = "https://img.example.com/b.png";
    const URL_C: &str = "https://img.example.com/c.png";
    const URL_D: &str = "https://img.example.com/d.png";

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];

    fn key(url: &str) -> ResourceKey {
        ResourceKey::parse(url).unwrap()
    }

    fn coordinator(transport: Arc<ScriptedTransport>) -> PositionTaskCoordinator<Vec<Delivery>> {
        PositionTaskCoordinator::new(fetcher_with(transport), Vec::new())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_duplicate_request_joins_running_task() {
        let transport = ScriptedTransport::new();
        let gate = transport.respond_gated(URL_A, png_bytes(4, RED));
        let mut coord = coordinator(transport.clone());
        let p = PositionId::row(0);

        assert_eq!(coord.request(p, key(URL_A)), Dispatch::Network);
        assert_eq!(coord.request(p, key(URL_A)), Dispatch::Joined);
        assert!(coord.is_in_flight(p));
        assert_eq!(coord.in_flight_count(), 1);

        gate.notify_one();
        assert!(coord.process_next().await);

        assert_eq!(transport.call_count(URL_A), 1);
        assert_eq!(coord.sink().len(), 1);
        assert_eq!(coord.task_state(p), Some(TaskState::Completed));
        assert!(!coord.is_in_flight(p));
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let transport = ScriptedTransport::new();
        let gate = transport.respond_gated(URL_B, png_bytes(4, RED));
        let mut coord = coordinator(transport.clone());
        let p = PositionId::row(1);

        coord.request(p, key(URL_B));
        tokio::task::yield_now().await;

        assert!(coord.cancel(p));
        assert!(!coord.cancel(p));
        assert_eq!(coord.task_state(p), Some(TaskState::Cancelled));
        assert!(!coord.is_in_flight(p));

        gate.notify_one();
        settle().await;

        assert_eq!(coord.process_completions(), 0);
        assert!(!coord.process_next().await);
        assert!(coord.sink().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_result_is_dropped() {
        let transport = ScriptedTransport::new();
        transport.respond(URL_C, png_bytes(4, RED));
        transport.respond(URL_D, png_bytes(4, GREEN));
        let mut coord = coordinator(transport.clone());
        let p = PositionId::row(3);

        assert_eq!(coord.request(p, key(URL_C)), Dispatch::Network);
        // Let the C download finish and queue its completion unprocessed.
        settle().await;
        assert_eq!(transport.call_count(URL_C), 1);

        assert_eq!(coord.request(p, key(URL_D)), Dispatch::Network);
        assert_eq!(coord.process_completions(), 0);
        assert!(coord.process_next().await);

        let deliveries = coord.sink();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].key, key(URL_D));
        assert_eq!(deliveries[0].position, p);
        assert!(deliveries[0].outcome.is_ok());
    }

    #[tokio::test]
    async fn test_cached_resource_is_queued_not_reentrant() {
        let transport = ScriptedTransport::new();
        transport.respond(URL_A, png_bytes(4, RED));
        let mut coord = coordinator(transport.clone());
        let first = PositionId::row(0);
        let second = PositionId::row(5);

        coord.request(first, key(URL_A));
        assert!(coord.process_next().await);

        assert_eq!(coord.request(second, key(URL_A)), Dispatch::Cached);
        assert_eq!(coord.sink().len(), 1);
        assert_eq!(coord.task_state(second), Some(TaskState::Pending));
        assert!(!coord.is_in_flight(second));

        assert_eq!(coord.process_completions(), 1);
        assert_eq!(coord.sink().len(), 2);
        assert_eq!(coord.sink()[1].position, second);
        assert_eq!(transport.call_count(URL_A), 1);
    }

    #[tokio::test]
    async fn test_cancelled_cache_hit_not_delivered() {
        let transport = ScriptedTransport::new();
        transport.respond(URL_A, png_bytes(4, RED));
        let mut coord = coordinator(transport);
        let p = PositionId::row(2);

        coord.request(p, key(URL_A));
        assert!(coord.process_next().await);

        assert_eq!(coord.request(p, key(URL_A)), Dispatch::Cached);
        assert!(coord.position_reused(p));
        assert_eq!(coord.process_completions(), 0);
        assert_eq!(coord.sink().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_delivered_as_outcome() {
        let transport = ScriptedTransport::new();
        transport.fail(URL_B, "connection reset");
        let mut coord = coordinator(transport);
        let p = PositionId::row(4);

        let url = Url::parse(URL_B).unwrap();
        assert_eq!(coord.needs_resource(p, &url), Dispatch::Network);
        assert!(coord.process_next().await);

        let err = coord.sink()[0].outcome.as_ref().unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_drop_cancels_live_tasks() {
        let transport = ScriptedTransport::new();
        let _gate = transport.respond_gated(URL_A, png_bytes(4, RED));
        let mut coord = coordinator(transport);
        let p = PositionId::row(0);

        coord.request(p, key(URL_A));
        let token = coord
            .task(p)
            .and_then(|task| task.cancel.as_ref())
            .map(|handle| handle.token().clone())
            .unwrap();

        drop(coord);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_left_prefetch_window_then_request_again() {
        let transport = ScriptedTransport::new();
        let gate = transport.respond_gated(URL_A, png_bytes(4, RED));
        let mut coord = coordinator(transport.clone());
        let p = PositionId::row(9);

        coord.request(p, key(URL_A));
        tokio::task::yield_now().await;
        assert!(coord.position_left_prefetch_window(p));
        assert_eq!(coord.in_flight_count(), 0);

        assert_eq!(coord.request(p, key(URL_A)), Dispatch::Network);
        gate.notify_one();
        assert!(coord.process_next().await);

        assert_eq!(coord.sink().len(), 1);
        assert_eq!(transport.call_count(URL_A), 2);
    }
}
