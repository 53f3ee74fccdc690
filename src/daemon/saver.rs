use anyhow::Result;
use chrono::NaiveDate;
use tokio::select;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    collector::{buffer::ActivityBuffer, event::ActivityEvent},
    storage::pulse_storage::{PulseFileHandle, PulseStorage},
};

/// Bridges the live [ActivityBuffer] and [PulseStorage]. Wakes up on every buffer change and
/// appends whatever was added since the last generation it saved.
pub struct PulseSaver<S: PulseStorage> {
    storage: S,
    current_handle: Option<S::RecordFile>,
    buffer: ActivityBuffer,
    saved_generation: u64,
    shutdown: CancellationToken,
}

impl<S: PulseStorage> PulseSaver<S> {
    pub fn new(storage: S, buffer: ActivityBuffer, shutdown: CancellationToken) -> Self {
        let saved_generation = buffer.generation();
        Self {
            storage,
            current_handle: None,
            buffer,
            saved_generation,
            shutdown,
        }
    }

    async fn move_file_handle(&mut self, date: NaiveDate) -> Result<&mut S::RecordFile> {
        let reusable = self
            .current_handle
            .as_ref()
            .is_some_and(|file| file.get_date() == date);
        if !reusable {
            let file = self.storage.create_or_append_record(date).await?;
            self.current_handle = Some(file);
        }
        self.current_handle
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Record file for {date} wasn't opened"))
    }

    /// Appends pending events, one batch per day.
    pub async fn save_pending(&mut self) -> Result<usize> {
        let fresh = self.buffer.since(self.saved_generation);
        let count = fresh.events.len();
        for (date, events) in group_by_day(fresh.events) {
            self.move_file_handle(date).await?.append(events).await?;
        }
        self.saved_generation = fresh.generation;
        if count > 0 {
            debug!("Saved {count} pulses up to generation {}", fresh.generation);
        }
        Ok(count)
    }

    /// Saves until shutdown, then saves whatever is left once more.
    pub async fn run(mut self) -> Result<()> {
        info!("Starting pulse saver");
        let mut changes = WatchStream::new(self.buffer.subscribe());
        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                next = changes.next() => {
                    if next.is_none() {
                        break;
                    }
                    if let Err(e) = self.save_pending().await {
                        error!("Failed to save pulses {e:?}");
                    }
                }
            }
        }
        self.save_pending().await?;
        Ok(())
    }
}

/// Splits events into runs sharing a UTC date, the unit pulse files are kept in.
fn group_by_day(events: Vec<ActivityEvent>) -> Vec<(NaiveDate, Vec<ActivityEvent>)> {
    let mut groups: Vec<(NaiveDate, Vec<ActivityEvent>)> = vec![];
    for event in events {
        let date = event.moment.date_naive();
        match groups.last_mut() {
            Some((last, batch)) if *last == date => batch.push(event),
            _ => groups.push((date, vec![event])),
        }
    }
    groups
}
