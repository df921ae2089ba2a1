use crate::error::AwsError;
use crate::sqs::Sqs;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps a received message invisible to other consumers while it is being
/// processed.
///
/// Every `max(processing_time - 3s, 2s)` the visibility timeout is extended by
/// `processing_time`. A halt request is only observed between two extension
/// calls, an in-flight call always completes.
#[derive(Debug)]
pub struct VisibilityExtender {
    halt_tx: flume::Sender<()>,
    handle: JoinHandle<()>,
}

impl VisibilityExtender {
    /// Must be called from within a tokio runtime.
    pub fn start(sqs: Sqs, queue_url: String, message_id: String, processing_time: Duration) -> Self {
        let interval = processing_time
            .saturating_sub(Duration::from_secs(3))
            .max(Duration::from_secs(2));
        let extension = processing_time.as_secs();
        let (halt_tx, halt_rx) = flume::bounded::<()>(1);

        let handle = tokio::spawn(async move {
            info!(
                "extending visibility of message {} by {}s every {:?}",
                message_id, extension, interval
            );

            loop {
                tokio::select! {
                    // also fires when the extender is dropped without a halt
                    _ = halt_rx.recv_async() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                debug!("extending visibility of message {} by {}s", message_id, extension);
                if let Err(err) = sqs
                    .change_message_visibility(&queue_url, &message_id, extension)
                    .await
                {
                    warn!("visibility extension of message {} failed: {}", message_id, err);
                }
            }

            debug!("visibility extender for message {} halted", message_id);
        });

        Self { halt_tx, handle }
    }

    /// Stops the extensions and waits until the background task is gone.
    pub async fn halt(self) -> Result<(), AwsError> {
        // the task may be gone already, a closed channel is fine
        let _ = self.halt_tx.try_send(());
        self.handle.await?;
        Ok(())
    }
}
