//! Serve - run the listener until a shutdown signal or until it gives up

use std::time::Duration;

use anyhow::{Result, bail};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sysrelay_config::{Config, ListenerConfig};
use sysrelay_sources::{
    ForwardTarget, ShutdownReason, SyslogUdpListener, SyslogUdpListenerConfig,
    SyslogUdpMetricsHandle, SyslogUdpMetricsSnapshot,
};

use crate::output::StdoutHandler;

/// Run the relay
pub async fn run(config: Config) -> Result<()> {
    let listener_config = build_listener_config(&config.listener);

    if let Some(target) = listener_config.forward_target.as_deref()
        && let Err(e) = ForwardTarget::parse(target)
    {
        warn!(error = %e, "forwarding will stay disabled");
    }

    let max_retries = listener_config.max_retries;
    let listener = SyslogUdpListener::new(listener_config).with_handler(StdoutHandler::new());
    let metrics = listener.metrics_handle();
    let cancel = CancellationToken::new();

    let reporter = config
        .metrics
        .enabled
        .then(|| spawn_metrics_reporter(metrics.clone(), config.metrics.interval, cancel.clone()));

    let mut listener_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { listener.run(cancel).await }
    });

    let reason = tokio::select! {
        result = &mut listener_task => result?,
        _ = wait_for_shutdown() => {
            info!("shutdown signal received");
            cancel.cancel();
            listener_task.await?
        }
    };

    // Stops the metrics reporter as well
    cancel.cancel();
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    log_snapshot(metrics.listener_id(), &metrics.snapshot());

    match reason {
        ShutdownReason::Cancelled => Ok(()),
        ShutdownReason::RetriesExhausted => {
            bail!("listener gave up after {max_retries} consecutive socket failures")
        }
    }
}

/// Map file configuration onto the listener's runtime configuration
fn build_listener_config(config: &ListenerConfig) -> SyslogUdpListenerConfig {
    SyslogUdpListenerConfig {
        address: config.address.clone(),
        port: config.port,
        forward_target: config.forward_target.clone(),
        max_message_size: config.max_message_size,
        buffer_size: config.buffer_size,
        backoff_base: config.backoff_base,
        max_retries: config.max_retries,
        yield_interval: config.yield_interval,
        ..Default::default()
    }
}

fn spawn_metrics_reporter(
    handle: SyslogUdpMetricsHandle,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log_snapshot(handle.listener_id(), &handle.snapshot()),
            }
        }
    })
}

fn log_snapshot(listener_id: &str, s: &SyslogUdpMetricsSnapshot) {
    info!(
        listener_id = %listener_id,
        packets_received = s.packets_received,
        bytes_received = s.bytes_received,
        messages_oversized = s.messages_oversized,
        errors = s.errors,
        sockets_bound = s.sockets_bound,
        bind_failures = s.bind_failures,
        packets_forwarded = s.packets_forwarded,
        bytes_forwarded = s.bytes_forwarded,
        forward_failures = s.forward_failures,
        forward_disabled = s.forward_disabled,
        "syslog UDP listener metrics"
    );
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
