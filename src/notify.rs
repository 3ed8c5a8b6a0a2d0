use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::logging;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub topic: String,
    pub subject: String,
    /// The triggering event, serialised unchanged.
    pub message: String,
}

impl FailureNotice {
    pub fn for_event(topic: &str, operator_name: &str, event: &Value) -> Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            subject: format!("Failure: {operator_name}, could not generate stream"),
            message: serde_json::to_string(event).context("serialize trigger event")?,
        })
    }
}

pub trait Notifier {
    fn publish(&self, notice: &FailureNotice) -> Result<()>;
}

/// Publishes by writing the notice to the error log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, notice: &FailureNotice) -> Result<()> {
        logging::error(
            "notification.publish",
            &notice.subject,
            json!({ "topic": notice.topic, "message": notice.message }),
        );
        Ok(())
    }
}

/// Appends each notice as a JSON line to an outbox file.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for OutboxNotifier {
    fn publish(&self, notice: &FailureNotice) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {:?}", parent))?;
        }
        let mut line = serde_json::to_vec(notice).context("serialize failure notice")?;
        line.push(b'\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .with_context(|| format!("failed to append notice to {:?}", self.path))?;

        logging::warn(
            "notification.publish",
            &notice.subject,
            json!({ "topic": notice.topic, "outbox": self.path.display().to_string() }),
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<FailureNotice>>,
}

impl MemoryNotifier {
    pub fn sent(&self) -> Vec<FailureNotice> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notice: &FailureNotice) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("notifier lock poisoned"))?
            .push(notice.clone());
        Ok(())
    }
}
