use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::utils::clock::Clock;

use super::{
    buffer::ActivityBuffer,
    event::{ActivityEvent, ActivityKind},
};

/// Pointer movement closer than this to the previously accepted one is dropped.
pub const POINTER_THROTTLE: Duration = Duration::from_millis(500);

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Admits at most one pointer move per interval.
#[derive(Debug)]
struct PointerThrottle {
    interval: chrono::Duration,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl PointerThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero()),
            last: Mutex::new(None),
        }
    }

    fn admit(&self, now: DateTime<Utc>) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now - previous <= self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Callback side of the live listeners. Cheap to clone and safe to call from platform hook
/// threads: every callback only stamps the moment and enqueues it without blocking.
#[derive(Clone)]
pub struct ListenerHandle {
    keyboard: mpsc::Sender<DateTime<Utc>>,
    pointer: mpsc::Sender<DateTime<Utc>>,
    file_system: mpsc::Sender<DateTime<Utc>>,
    input: mpsc::Sender<DateTime<Utc>>,
    throttle: Arc<PointerThrottle>,
    clock: Arc<dyn Clock>,
}

impl ListenerHandle {
    pub fn on_key_press(&self) {
        self.send(&self.keyboard, ActivityKind::Keyboard);
    }

    pub fn on_click(&self) {
        self.send(&self.pointer, ActivityKind::Pointer);
    }

    pub fn on_pointer_move(&self) {
        if self.throttle.admit(self.clock.time()) {
            self.send(&self.pointer, ActivityKind::Pointer);
        }
    }

    pub fn on_file_event(&self) {
        self.send(&self.file_system, ActivityKind::FileSystem);
    }

    pub fn on_input(&self) {
        self.send(&self.input, ActivityKind::Input);
    }

    fn send(&self, channel: &mpsc::Sender<DateTime<Utc>>, kind: ActivityKind) {
        match channel.try_send(self.clock.time()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Dropping {kind} event, channel is full"),
            Err(TrySendError::Closed(_)) => trace!("Dropping {kind} event, listeners stopped"),
        }
    }
}

/// Receiving side of the listeners. Drains every class into the shared buffer.
pub struct ListenerHub {
    keyboard: mpsc::Receiver<DateTime<Utc>>,
    pointer: mpsc::Receiver<DateTime<Utc>>,
    file_system: mpsc::Receiver<DateTime<Utc>>,
    input: mpsc::Receiver<DateTime<Utc>>,
}

pub fn listener_channels(clock: Arc<dyn Clock>) -> (ListenerHandle, ListenerHub) {
    let (keyboard, keyboard_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (pointer, pointer_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (file_system, file_system_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (input, input_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    (
        ListenerHandle {
            keyboard,
            pointer,
            file_system,
            input,
            throttle: Arc::new(PointerThrottle::new(POINTER_THROTTLE)),
            clock,
        },
        ListenerHub {
            keyboard: keyboard_rx,
            pointer: pointer_rx,
            file_system: file_system_rx,
            input: input_rx,
        },
    )
}

impl ListenerHub {
    /// Runs until shutdown or until every handle is dropped. Events already queued at shutdown
    /// are still moved into the buffer.
    pub async fn run(self, buffer: ActivityBuffer, shutdown: CancellationToken) -> Result<()> {
        info!("Starting listeners");
        let tagged = |receiver, kind| ReceiverStream::new(receiver).map(move |v| (v, kind));
        let mut events = tagged(self.keyboard, ActivityKind::Keyboard)
            .merge(tagged(self.pointer, ActivityKind::Pointer))
            .merge(tagged(self.file_system, ActivityKind::FileSystem))
            .merge(tagged(self.input, ActivityKind::Input));

        loop {
            select! {
                _ = shutdown.cancelled() => break,
                next = events.next() => match next {
                    Some((moment, kind)) => {
                        buffer.push(ActivityEvent::new(moment, kind));
                    }
                    None => break,
                },
            }
        }

        while let Some(Some((moment, kind))) = events.next().now_or_never() {
            buffer.push(ActivityEvent::new(moment, kind));
        }
        debug!("Listeners stopped");
        Ok(())
    }
}
