use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Payload streamed to the caller while an installation runs.
#[derive(Debug, Clone, Serialize)]
pub struct InstallProgress {
    pub status: String,
    pub percent: Option<u8>,
}

/// Fire-and-forget progress emitter.
///
/// Delivery is ordered and never blocks the operation: a dropped or slow
/// receiver is ignored. Every event is also logged, so headless callers keep
/// an audit trail.
#[derive(Clone, Default)]
pub struct ProgressSink {
    sender: Option<UnboundedSender<InstallProgress>>,
}

impl ProgressSink {
    pub fn new(sender: UnboundedSender<InstallProgress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that only logs.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, status: impl Into<String>, percent: Option<u8>) {
        let status = status.into();
        match percent {
            Some(p) => info!("[{p:>3}%] {status}"),
            None => info!("{status}"),
        }
        if let Some(sender) = &self.sender {
            let _ = sender.send(InstallProgress { status, percent });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_emission_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ProgressSink::new(tx);
        sink.emit("first", Some(10));
        sink.emit("second", None);

        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        assert_eq!(a.status, "first");
        assert_eq!(a.percent, Some(10));
        assert_eq!(b.status, "second");
        assert_eq!(b.percent, None);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = ProgressSink::new(tx);
        sink.emit("into the void", Some(50));
    }
}
