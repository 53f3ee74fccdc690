use std::time::Duration;

use anyhow::Result;
use chrono::TimeZone;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::clock::Clock;

use super::{buffer::ActivityBuffer, retention::RetentionWindow};

pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drops buffered instants that fall before the current local day.
pub struct PruningModule<Tz> {
    buffer: ActivityBuffer,
    clock: Box<dyn Clock>,
    tz: Tz,
    interval: Duration,
    shutdown: CancellationToken,
}

impl<Tz: TimeZone + Send + Sync> PruningModule<Tz>
where
    Tz::Offset: Send + Sync,
{
    pub fn new(
        buffer: ActivityBuffer,
        clock: Box<dyn Clock>,
        tz: Tz,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            clock,
            tz,
            interval,
            shutdown,
        }
    }

    pub fn prune_once(&self) -> usize {
        let window = RetentionWindow::today(self.clock.time(), &self.tz);
        let removed = self.buffer.prune_before(window.start);
        if removed > 0 {
            debug!("Pruned {removed} events before {}", window.start);
        }
        removed
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting pruning every {:?}", self.interval);
        loop {
            let next = self.clock.instant() + self.interval;
            self.prune_once();
            select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep_until(next) => {},
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{FixedOffset, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        collector::{
            buffer::ActivityBuffer,
            event::{ActivityEvent, ActivityKind},
        },
        utils::clock::FixedClock,
    };

    use super::{PruningModule, PRUNE_INTERVAL};

    #[test]
    fn test_prunes_before_local_midnight() {
        let buffer = ActivityBuffer::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        // Local midnight in UTC+3 is 21:00 UTC of the previous day.
        buffer.push(ActivityEvent::new(
            Utc.with_ymd_and_hms(2025, 3, 3, 20, 59, 0).unwrap(),
            ActivityKind::Keyboard,
        ));
        buffer.push(ActivityEvent::new(
            Utc.with_ymd_and_hms(2025, 3, 3, 21, 0, 0).unwrap(),
            ActivityKind::Keyboard,
        ));
        let module = PruningModule::new(
            buffer.clone(),
            Box::new(FixedClock(now)),
            FixedOffset::east_opt(3 * 3600).unwrap(),
            PRUNE_INTERVAL,
            CancellationToken::new(),
        );
        assert_eq!(module.prune_once(), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(module.prune_once(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let module = PruningModule::new(
            ActivityBuffer::new(),
            Box::new(FixedClock(Utc::now())),
            Utc,
            Duration::from_secs(60),
            shutdown.clone(),
        );
        let running = tokio::spawn(module.run());
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        running.await??;
        Ok(())
    }
}
