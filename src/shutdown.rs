//! Signal handling for a sync run.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the run's
//! [`CancellationToken`]: the walk stops before the next course, and the
//! download coordinator dispatches nothing new while in-flight files finish.
//! Any further signal exits at once with [`INTERRUPTED_EXIT_CODE`].

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

/// Exit status for a run stopped by a signal.
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Drain,
    ForceExit,
}

/// Count one received signal and decide what it means.
fn on_signal(received: &AtomicU32, token: &CancellationToken) -> SignalAction {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        token.cancel();
        SignalAction::Drain
    } else {
        SignalAction::ForceExit
    }
}

#[cfg(unix)]
async fn next_signal(
    sigterm: &mut tokio::signal::unix::Signal,
    sighup: &mut tokio::signal::unix::Signal,
) -> std::io::Result<()> {
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
        _ = sighup.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Register the handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        let received = AtomicU32::new(0);
        loop {
            #[cfg(unix)]
            let signal = next_signal(&mut sigterm, &mut sighup).await;
            #[cfg(not(unix))]
            let signal = next_signal().await;

            if let Err(e) = signal {
                tracing::warn!("Stopped listening for shutdown signals: {}", e);
                return;
            }
            match on_signal(&received, &handler_token) {
                SignalAction::Drain => {
                    tracing::info!(
                        "Shutdown requested: no new downloads will start, waiting for running ones"
                    );
                    tracing::info!("Send the signal again to exit immediately");
                }
                SignalAction::ForceExit => {
                    tracing::warn!("Exiting immediately; state is saved up to the last walked course");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }
    });

    Ok(token)
}
