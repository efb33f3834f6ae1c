use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::accountant::{BatchEvent, EventSink};
use crate::config::EventsOutConfig;

#[derive(Clone)]
enum LineTx {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

/// Sending half of the JSONL event file. Cheap to clone; every clone feeds
/// the same writer task.
#[derive(Clone)]
pub struct EventsOutTx {
    tx: LineTx,
    dropped: Arc<AtomicU64>,
}

impl EventsOutTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn send_line(&self, line: String) {
        let sent = match &self.tx {
            LineTx::Bounded(tx) => tx.try_send(line).is_ok(),
            LineTx::Unbounded(tx) => tx.send(line).is_ok(),
        };
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl EventSink for EventsOutTx {
    fn name(&self) -> &str {
        "events_out"
    }

    fn emit(&self, event: &BatchEvent) {
        if let Ok(line) = serde_json::to_string(&event.to_json()) {
            self.send_line(line);
        }
    }
}

/// Handle on the running writer task.
pub struct EventsOut {
    tx: EventsOutTx,
    task: JoinHandle<()>,
}

impl EventsOut {
    pub fn sender(&self) -> EventsOutTx {
        self.tx.clone()
    }

    /// Drop this handle's sender and wait (bounded) for queued lines to be
    /// written. Senders still held elsewhere keep the task alive past the
    /// wait; every line is flushed as it is written.
    pub async fn close(self) {
        let dropped = self.tx.dropped_count();
        drop(self.tx);
        if tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .is_err()
        {
            tracing::warn!("events_out writer still busy at shutdown");
        }
        if dropped > 0 {
            tracing::warn!(dropped, "events_out dropped lines");
        }
    }
}

/// Start the writer task. Returns `None` when disabled. `path = "stdout:"`
/// writes to standard output.
pub async fn start_events_out(cfg: &EventsOutConfig) -> anyhow::Result<Option<EventsOut>> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if cfg.path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .await
            .map_err(|e| anyhow::anyhow!("cannot open events_out {}: {e}", cfg.path))?;
        Box::new(file)
    };

    let (tx, mut rx): (LineTx, LineRx) = if cfg.drop_when_full {
        let (tx, rx) = mpsc::channel::<String>(cfg.channel_capacity.max(1));
        (LineTx::Bounded(tx), LineRx::Bounded(rx))
    } else {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        (LineTx::Unbounded(tx), LineRx::Unbounded(rx))
    };

    let task = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err()
            {
                tracing::warn!("events_out write failed, writer stopped");
                return;
            }
        }
    });

    Ok(Some(EventsOut {
        tx: EventsOutTx {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        task,
    }))
}

enum LineRx {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

impl LineRx {
    async fn recv(&mut self) -> Option<String> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}
