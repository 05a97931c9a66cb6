//! Shutdown signalling for in-flight exports.
//!
//! A single [`ShutdownTx`] is owned by the process. Every export subscribes a [`ShutdownRx`] and
//! races its network calls against it, so a shutdown aborts pending work instead of waiting for
//! slow warehouse or Pub/Sub round trips.

use std::future::Future;

use tokio::sync::watch;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Sender side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every subscribed receiver.
    ///
    /// Fails when no receiver is alive anymore.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
///
/// The receiver starts with the current value marked as seen, so it only resolves once
/// [`ShutdownTx::shutdown`] is called.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Outcome of a future raced against the shutdown signal.
#[derive(Debug, PartialEq, Eq)]
pub enum ShutdownResult<T> {
    Ok(T),
    Shutdown,
}

/// Runs `future` until it completes or the shutdown signal fires.
///
/// A dropped sender is not treated as a shutdown; the future is then awaited to completion.
pub async fn run_until_shutdown<F>(future: F, shutdown_rx: &mut ShutdownRx) -> ShutdownResult<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;

        Ok(()) = shutdown_rx.changed() => ShutdownResult::Shutdown,
        output = future => ShutdownResult::Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_future_completes_without_shutdown() {
        let (_tx, mut rx) = create_shutdown_channel();

        let result = run_until_shutdown(async { 7 }, &mut rx).await;
        assert_eq!(result, ShutdownResult::Ok(7));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_future() {
        let (tx, mut rx) = create_shutdown_channel();
        tx.shutdown().unwrap();

        let result = run_until_shutdown(tokio::time::sleep(Duration::from_secs(60)), &mut rx).await;
        assert_eq!(result, ShutdownResult::Shutdown);
    }

    #[tokio::test]
    async fn test_dropped_sender_is_not_a_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        let result = run_until_shutdown(async { "done" }, &mut rx).await;
        assert_eq!(result, ShutdownResult::Ok("done"));
    }
}
