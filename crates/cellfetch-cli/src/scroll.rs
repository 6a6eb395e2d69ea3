//! Simulated list scrolling.
//!
//! A single-section list of `rows` is scrolled one row per step. Rows that
//! enter the visible window plus the prefetch margin are requested; rows that
//! leave it are cancelled.

use cellfetch::{Delivery, Dispatch, PositionId, PositionTaskCoordinator, ResultSink};
use futures::future::{select, Either};
use std::ops::Range;
use std::pin::pin;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Sink that logs each delivery and counts outcomes.
#[derive(Debug, Default)]
pub struct LoggingSink {
    pub delivered: usize,
    pub failed: usize,
}

impl ResultSink for LoggingSink {
    fn deliver(&mut self, delivery: Delivery) {
        self.delivered += 1;
        match &delivery.outcome {
            Ok(image) => info!(
                "Row {} <- {} ({}x{})",
                delivery.position,
                delivery.key,
                image.width(),
                image.height()
            ),
            Err(e) => {
                self.failed += 1;
                warn!(
                    "Row {} <- {} failed [{}]: {}",
                    delivery.position,
                    delivery.key,
                    e.kind(),
                    e
                );
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScrollReport {
    pub steps: usize,
    pub network: usize,
    pub cached: usize,
    pub joined: usize,
    pub cancelled: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Rows that should be loaded with `top` as the first visible row.
fn active_rows(top: u32, visible: u32, prefetch: u32, len: u32) -> Range<u32> {
    let end = top.saturating_add(visible).saturating_add(prefetch).min(len);
    top.min(end)..end
}

pub struct ScrollSimulation {
    coordinator: PositionTaskCoordinator<LoggingSink>,
    rows: Vec<Url>,
    visible: u32,
    prefetch: u32,
    report: ScrollReport,
}

impl ScrollSimulation {
    pub fn new(
        coordinator: PositionTaskCoordinator<LoggingSink>,
        rows: Vec<Url>,
        visible: u32,
        prefetch: u32,
    ) -> Self {
        Self {
            coordinator,
            rows,
            visible: visible.max(1),
            prefetch,
            report: ScrollReport::default(),
        }
    }

    fn len(&self) -> u32 {
        u32::try_from(self.rows.len()).unwrap_or(u32::MAX)
    }

    /// Scroll from the top to the bottom, then wait for outstanding fetches.
    pub async fn run(&mut self, step_delay: Duration) -> ScrollReport {
        let len = self.len();
        let last_top = len.saturating_sub(self.visible);
        let mut previous = 0..0;

        for top in 0..=last_top {
            let current = active_rows(top, self.visible, self.prefetch, len);
            debug!("Scroll step {}: rows {:?}", top, current);

            for row in previous.clone().filter(|r| !current.contains(r)) {
                if self
                    .coordinator
                    .position_left_prefetch_window(PositionId::row(row))
                {
                    self.report.cancelled += 1;
                }
            }
            for row in current.clone().filter(|r| !previous.contains(r)) {
                self.request(row);
            }

            previous = current;
            self.report.steps += 1;
            self.pump_for(step_delay).await;
        }

        while self.coordinator.process_next().await {}

        let sink = self.coordinator.sink();
        self.report.delivered = sink.delivered;
        self.report.failed = sink.failed;
        self.report
    }

    fn request(&mut self, row: u32) {
        let Some(url) = self.rows.get(row as usize) else {
            return;
        };
        match self.coordinator.needs_resource(PositionId::row(row), url) {
            Dispatch::Network => self.report.network += 1,
            Dispatch::Cached => self.report.cached += 1,
            Dispatch::Joined => self.report.joined += 1,
        }
    }

    /// Deliver completions as they arrive until `duration` has passed.
    async fn pump_for(&mut self, duration: Duration) {
        self.coordinator.process_completions();
        let deadline = Instant::now() + duration;
        loop {
            let sleep = pin!(tokio::time::sleep_until(deadline));
            let next = pin!(self.coordinator.process_next());
            match select(next, sleep).await {
                Either::Left((true, _)) => continue,
                Either::Left((false, sleep)) => {
                    sleep.await;
                    return;
                }
                Either::Right(_) => return,
            }
        }
    }
}
