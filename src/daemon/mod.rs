use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Local;
use polling::InputPollingModule;
use saver::PulseSaver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    collector::{
        buffer::ActivityBuffer,
        file_watch::FileActivityWatcher,
        listeners::{listener_channels, ListenerHandle},
        pruning::{PruningModule, PRUNE_INTERVAL},
    },
    input_api::{GenericInputProbe, InputProbe},
    storage::pulse_storage::PulseStorageImpl,
    utils::{
        clock::{Clock, DefaultClock},
        dir::AppPaths,
    },
};

pub mod args;
pub mod polling;
pub mod saver;
pub mod shutdown;

const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Represents the starting point for the daemon. `watch` lists directories whose file changes
/// count as activity.
pub async fn start_daemon(dir: PathBuf, watch: Vec<PathBuf>) -> Result<()> {
    let paths = AppPaths::new(dir);
    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();
    let buffer = ActivityBuffer::new();
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let (handle, hub) = listener_channels(clock);

    let _watchers = watch
        .iter()
        .filter_map(|path| {
            FileActivityWatcher::new(path, handle.clone())
                .inspect_err(|e| error!("Not watching {path:?} {e:?}"))
                .ok()
        })
        .collect::<Vec<_>>();

    let poller = match GenericInputProbe::new() {
        Ok(probe) => Some(create_poller(
            handle,
            probe,
            &shutdown_token,
            DEFAULT_POLLING_INTERVAL,
            DefaultClock,
        )),
        Err(e) => {
            warn!("Running without input polling {e:?}");
            None
        }
    };

    let pruning = PruningModule::new(
        buffer.clone(),
        Box::new(DefaultClock),
        Local,
        PRUNE_INTERVAL,
        shutdown_token.clone(),
    );
    let saver_token = CancellationToken::new();
    let saver = create_saver(paths.records(), buffer.clone(), &saver_token)?;

    info!("Daemon started in {:?}", paths.root());
    let (_, (listening, polling, pruning), saving) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let results = tokio::join!(
                hub.run(buffer.clone(), shutdown_token.clone()),
                async {
                    match poller {
                        Some(poller) => poller.run().await,
                        None => Ok(()),
                    }
                },
                pruning.run(),
            );
            // Everything the producers drained is in the buffer by now.
            saver_token.cancel();
            results
        },
        saver.run(),
    );

    for (name, result) in [
        ("Listener", listening),
        ("Polling", polling),
        ("Pruning", pruning),
        ("Saving", saving),
    ] {
        if let Err(e) = result {
            error!("{name} module got an error {e:?}");
        }
    }

    Ok(())
}

fn create_poller(
    handle: ListenerHandle,
    probe: impl InputProbe + Send + 'static,
    shutdown_token: &CancellationToken,
    interval: Duration,
    clock: impl Clock,
) -> InputPollingModule {
    InputPollingModule::new(
        handle,
        Box::new(probe),
        shutdown_token.clone(),
        interval,
        Box::new(clock),
    )
}

fn create_saver(
    record_dir: PathBuf,
    buffer: ActivityBuffer,
    shutdown_token: &CancellationToken,
) -> Result<PulseSaver<PulseStorageImpl>> {
    let storage = PulseStorageImpl::new(record_dir)?;
    Ok(PulseSaver::new(storage, buffer, shutdown_token.clone()))
}
