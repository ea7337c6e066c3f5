//! Audit trail for trust decisions
//!
//! ```text
//!  handler ──emit()──► AuditDispatcher ──bounded mpsc──► consumer task ──► AuditLogger
//!            (never blocks; drops when full)                              (ring buffer + tracing)
//! ```
//!
//! Emission is fire-and-forget. A full or closed channel costs one warning
//! line, never a failed request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Events
// ============================================================================

/// Outcome recorded with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Error => "error",
        }
    }
}

/// A single audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            status: AuditStatus::Success,
            metadata: Map::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<&str>) -> Self {
        self.actor_id = actor_id.map(str::to_string);
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Where handlers send audit events. Must not block.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Non-blocking front of the audit pipeline
#[derive(Debug)]
pub struct AuditDispatcher {
    sender: mpsc::Sender<AuditEvent>,
    dropped: AtomicU64,
}

impl AuditDispatcher {
    /// Dispatcher plus the receiving end, for callers that drain it themselves
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Dispatcher whose consumer task drains into `logger`
    pub fn spawn(logger: Arc<AuditLogger>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (dispatcher, mut receiver) = Self::channel(capacity);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                logger.log(event).await;
            }
            debug!("Audit channel closed");
        });
        (dispatcher, handle)
    }

    /// Events lost to a full or closed channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for AuditDispatcher {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let event = match e {
                mpsc::error::TrySendError::Full(event) | mpsc::error::TrySendError::Closed(event) => event,
            };
            warn!(
                action = %event.action,
                resource_type = %event.resource_type,
                "Audit event dropped"
            );
        }
    }
}

// ============================================================================
// Logger
// ============================================================================

/// In-memory audit trail, mirrored to tracing
pub struct AuditLogger {
    entries: RwLock<VecDeque<AuditEvent>>,
    max_entries: usize,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn log(&self, event: AuditEvent) {
        match event.status {
            AuditStatus::Success => info!(
                action = %event.action,
                resource_type = %event.resource_type,
                resource_id = event.resource_id.as_deref().unwrap_or("-"),
                actor = event.actor_id.as_deref().unwrap_or("anon"),
                "AUDIT"
            ),
            AuditStatus::Error => warn!(
                action = %event.action,
                resource_type = %event.resource_type,
                resource_id = event.resource_id.as_deref().unwrap_or("-"),
                actor = event.actor_id.as_deref().unwrap_or("anon"),
                "AUDIT error"
            ),
        }

        let mut entries = self.entries.write().await;
        entries.push_back(event);

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Most recent first
    pub async fn get_recent(&self, count: usize) -> Vec<AuditEvent> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(count).cloned().collect()
    }

    pub async fn get_by_action(&self, action: &str) -> Vec<AuditEvent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    pub async fn get_for_actor(&self, actor_id: &str) -> Vec<AuditEvent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.actor_id.as_deref() == Some(actor_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
