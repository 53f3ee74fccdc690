use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::{collector::listeners::ListenerHandle, input_api::InputProbe, utils::clock::Clock};

/// Asks the platform how long the user has been idle and reports input whenever something was
/// touched since the previous poll.
pub struct InputPollingModule {
    next: ListenerHandle,
    probe: Box<dyn InputProbe + Send>,
    shutdown: CancellationToken,
    polling_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl InputPollingModule {
    pub fn new(
        next: ListenerHandle,
        probe: Box<dyn InputProbe + Send>,
        shutdown: CancellationToken,
        polling_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            probe,
            shutdown,
            polling_frequency,
            time_provider,
        }
    }

    fn poll(&mut self) -> Result<bool> {
        let idle_ms = self.probe.get_idle_time()?;
        Ok(u128::from(idle_ms) < self.polling_frequency.as_millis())
    }

    /// Executes the polling loop.
    pub async fn run(mut self) -> Result<()> {
        info!("Polling input every {:?}", self.polling_frequency);
        let mut polling_point = self.time_provider.instant();
        loop {
            polling_point += self.polling_frequency;

            match self.poll() {
                Ok(true) => {
                    trace!("Input since last poll");
                    self.next.on_input();
                }
                Ok(false) => {}
                Err(e) => error!("Encountered an error during polling {e:?}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = self.time_provider.sleep_until(polling_point) => (),
            }
        }
    }
}
