use tokio::sync::watch;

/// Sending side of the shutdown channel.
///
/// The channel carries no payload. Any send, or dropping the sender, tells every subscribed
/// receiver to stop.
pub type ShutdownTx = watch::Sender<()>;

/// Receiving side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown channel.
///
/// Further receivers are obtained with [`watch::Sender::subscribe`], which only observes sends
/// that happen after subscribing.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let (shutdown_tx, _) = create_shutdown_channel();
        let mut first = shutdown_tx.subscribe();
        let mut second = shutdown_tx.subscribe();

        shutdown_tx.send(()).unwrap();

        assert!(first.changed().await.is_ok());
        assert!(second.changed().await.is_ok());
    }

    #[tokio::test]
    async fn dropping_the_sender_wakes_receivers() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
        drop(shutdown_tx);

        assert!(shutdown_rx.changed().await.is_err());
    }
}
