//! Waiting for a container to exit

use std::time::{Duration, SystemTime};

use sysdock_core::{ContainerId, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{EventFilter, RuntimeClient};
use crate::events::EventStream;

/// Events that mean the container is gone
pub const EXIT_EVENTS: [&str; 2] = ["die", "stop"];

/// Block until the container stops running
///
/// The subscription is made before the first inspect, so an exit between
/// the two is still seen. Besides events, the container is re-inspected
/// every `poll`; a dropped subscription leaves polling alone in charge.
///
/// # Errors
/// Returns error if inspecting the container fails.
pub async fn wait_for_exit(
    client: &dyn RuntimeClient,
    id: &ContainerId,
    poll: Duration,
) -> Result<()> {
    let filter = EventFilter::new(id.clone(), EXIT_EVENTS).since(SystemTime::now());

    let mut stream = match client.events(&filter).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, id = %id.short(), "Cannot subscribe to exit events, polling only");
            None
        }
    };

    let outcome = watch(client, id, stream.as_deref_mut(), poll).await;

    if let Some(mut stream) = stream {
        if let Err(e) = stream.close().await {
            warn!(error = %e, "Failed to close event subscription");
        }
    }

    if outcome.is_ok() {
        info!(id = %id.short(), "Container exited");
    }
    outcome
}

async fn watch(
    client: &dyn RuntimeClient,
    id: &ContainerId,
    mut stream: Option<&mut (dyn EventStream + 'static)>,
    poll: Duration,
) -> Result<()> {
    if !is_running(client, id).await? {
        return Ok(());
    }

    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            event = next_event(&mut stream), if stream.is_some() => match event {
                Some(event) if event.is_stop() => {
                    debug!(%event, "Exit event received");
                    return Ok(());
                }
                Some(event) => debug!(%event, "Ignoring event"),
                None => {
                    warn!(id = %id.short(), "Event stream closed, polling only");
                    stream = None;
                }
            },
            _ = ticker.tick() => {
                if !is_running(client, id).await? {
                    return Ok(());
                }
            }
        }
    }
}

async fn next_event(
    stream: &mut Option<&mut (dyn EventStream + 'static)>,
) -> Option<sysdock_core::RuntimeEvent> {
    match stream {
        Some(stream) => stream.recv().await,
        None => None,
    }
}

async fn is_running(client: &dyn RuntimeClient, id: &ContainerId) -> Result<bool> {
    Ok(client
        .inspect(id.as_str())
        .await?
        .is_some_and(|info| info.running))
}
