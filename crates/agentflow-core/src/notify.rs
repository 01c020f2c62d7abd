//! Fire-and-forget progress updates emitted while a pipeline runs.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub agent_id: String,
    /// Whether the agent is actively producing output (`ANSWER`, `MCP`) as
    /// opposed to handing off (`REDIRECT`).
    pub is_processing: bool,
    pub step: String,
}

/// Receives progress updates. Implementations must not block and never fail
/// the pipeline.
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, update: ProgressUpdate);
}

/// Logs updates through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl ProgressNotifier for TracingNotifier {
    fn notify(&self, update: ProgressUpdate) {
        tracing::debug!(
            agent_id = %update.agent_id,
            step = %update.step,
            processing = update.is_processing,
            "[Progress] step update"
        );
    }
}

/// Forwards updates to an unbounded channel; a closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressNotifier for ChannelNotifier {
    fn notify(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_channel_is_ignored() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(ProgressUpdate {
            agent_id: "a".into(),
            is_processing: true,
            step: "ANSWER".into(),
        });
    }

    #[tokio::test]
    async fn updates_arrive_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        for step in ["ANSWER", "REDIRECT+b"] {
            notifier.notify(ProgressUpdate {
                agent_id: "a".into(),
                is_processing: step == "ANSWER",
                step: step.into(),
            });
        }
        assert_eq!(rx.recv().await.unwrap().step, "ANSWER");
        assert!(!rx.recv().await.unwrap().is_processing);
    }
}
