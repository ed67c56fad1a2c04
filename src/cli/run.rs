// src/cli/run.rs — Foreground service: feed call events to the dispatcher
//
// Events come in as JSON lines on stdin (or from a replay file). The service
// stops at end of input or on Ctrl+C, after draining everything queued.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufRead, BufReader};

use crate::dispatch::{CallStateTracker, DispatchConfig, DispatchCoordinator, DispatchService};
use crate::infra::config::Config;
use crate::telephony::{transport, EventReader, MessageTransport};

pub async fn run_service(config: &Config, events: Option<&Path>) -> anyhow::Result<()> {
    let prefs = super::open_store(config)?;
    let transport: Arc<dyn MessageTransport> = Arc::from(transport::from_config(&config.transport)?);

    let settings = DispatchConfig::load(&prefs)?;
    if !settings.enabled {
        tracing::warn!("Auto send is disabled; events will be tracked but nothing will be sent");
    }
    tracing::info!(
        "Transport: {}, trigger: {}, interval: {} day(s)",
        transport.name(),
        settings.trigger_policy,
        settings.interval_days
    );

    let tracker = CallStateTracker::new(super::call_log(config));
    let coordinator = DispatchCoordinator::new(prefs.clone(), transport);
    let service = DispatchService::spawn(
        prefs,
        tracker,
        coordinator,
        config.runtime.queue_capacity,
    );
    let inlet = service.inlet();

    let source: Box<dyn AsyncBufRead + Unpin + Send> = match events {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let events = EventReader::new(source).into_stream();
    tokio::pin!(events);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => {
                    if !inlet.deliver(event) {
                        tracing::error!("Dispatch service stopped unexpectedly");
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("Cannot read events: {}", e);
                    break;
                }
                None => {
                    tracing::info!("End of event input");
                    break;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Interrupted; draining queued events");
                break;
            }
        }
    }

    let stats = service.shutdown().await?;
    println!(
        "Processed {} event(s): {} candidate(s), {} message(s) sent.",
        stats.events, stats.candidates, stats.sent
    );
    Ok(())
}
