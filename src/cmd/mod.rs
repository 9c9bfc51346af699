pub mod scrapbook;

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancel `token` on Ctrl-C or once `timeout` elapses.
pub fn spawn_cancellation(token: CancellationToken, timeout: Option<Duration>) {
    spawn_cancellation_on(token, timeout, tokio::signal::ctrl_c());
}

/// Cancel `token` when `interrupt` fires or `timeout` elapses. An interrupt
/// source that fails to install never fires.
fn spawn_cancellation_on<F>(token: CancellationToken, timeout: Option<Duration>, interrupt: F)
where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let interrupted = async {
            if let Err(e) = interrupt.await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        let deadline = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = interrupted => warn!("interrupted, cancelling"),
            _ = deadline => warn!(?timeout, "deadline reached, cancelling"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
}
