//! Filter pipeline: verdicts, the stage trait, and the dispatcher.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LogLevel};
use crate::event::Event;

/// Per-call scratch space seeded with `remote_ip`; stages may stash
/// values (e.g. the detected language) for later stages to observe.
pub type Meta = HashMap<String, String>;

/// Meta key holding the remote address of the event's source.
pub const META_REMOTE_IP: &str = "remote_ip";

/// Outcome of a single filter stage.
#[derive(Debug)]
pub enum Verdict {
    /// Stage admits the event; the reason code is for observability only.
    Accept(String),
    /// Stage rejects the event; the reason code travels to the relay.
    Reject(String),
    /// Stage failed internally; fails closed with an `internal_*` code.
    Error {
        reason: &'static str,
        source: anyhow::Error,
    },
}

impl Verdict {
    pub fn accept(reason: impl Into<String>) -> Self {
        Verdict::Accept(reason.into())
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Verdict::Reject(reason.into())
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }
}

/// A pipeline stage: a named predicate over `(event, meta)`.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn matches(&self, event: &Event, meta: &mut Meta) -> Verdict;
}

/// Fan-out hook invoked on every enforced rejection. Implementations
/// must return quickly; long work belongs on a spawned task.
pub trait RejectionHandler: Send + Sync {
    fn handle_rejection(&self, event: &Event, filter_name: &str);
}

/// Verdict rendered back to the relay, one JSON object per input line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyResponse {
    pub id: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Accept,
    Reject,
}

impl PolicyResponse {
    fn accept(id: &str) -> Self {
        Self {
            id: id.to_string(),
            action: Action::Accept,
            msg: None,
        }
    }

    fn reject(id: &str, msg: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            action: Action::Reject,
            msg: Some(msg.into()),
        }
    }
}

/// Ordered chain of filter stages with rejection fan-out.
pub struct Pipeline {
    stages: Vec<Box<dyn Filter>>,
    rejection_handlers: Vec<Arc<dyn RejectionHandler>>,
    rejection_levels: HashMap<String, LogLevel>,
}

impl Pipeline {
    pub fn new(
        cfg: &Config,
        stages: Vec<Box<dyn Filter>>,
        rejection_handlers: Vec<Arc<dyn RejectionHandler>>,
    ) -> Self {
        Self {
            stages,
            rejection_handlers,
            rejection_levels: cfg.log.rejection_levels.clone(),
        }
    }

    /// Run the event through every stage in order; the first non-accept
    /// verdict wins. Safe for concurrent callers.
    pub async fn process_event(
        &self,
        event: &Event,
        remote_ip: &str,
        dry_run: bool,
    ) -> PolicyResponse {
        let mut meta = Meta::new();
        meta.insert(META_REMOTE_IP.to_string(), remote_ip.to_string());

        for stage in &self.stages {
            let outcome = AssertUnwindSafe(stage.matches(event, &mut meta))
                .catch_unwind()
                .await;

            let verdict = match outcome {
                Ok(verdict) => verdict,
                Err(payload) => {
                    error!(
                        filter_name = stage.name(),
                        event_id = %event.id,
                        pubkey = %event.pubkey,
                        panic = panic_message(&payload),
                        "panic recovered in filter pipeline"
                    );
                    return PolicyResponse::reject(
                        &event.id,
                        "internal: an unexpected error occurred in a filter",
                    );
                }
            };

            match verdict {
                Verdict::Accept(_) => {}
                Verdict::Reject(reason) => {
                    self.log_rejection(stage.name(), event, remote_ip, &reason);

                    if dry_run {
                        info!(
                            filter_name = stage.name(),
                            event_id = %event.id,
                            reason = %reason,
                            "dry-run: event would be rejected"
                        );
                        return PolicyResponse::accept(&event.id);
                    }

                    for handler in &self.rejection_handlers {
                        handler.handle_rejection(event, stage.name());
                    }

                    return PolicyResponse::reject(&event.id, reason);
                }
                Verdict::Error { reason, source } => {
                    error!(
                        filter_name = stage.name(),
                        event_id = %event.id,
                        reason,
                        error = %source,
                        "filter execution failed"
                    );
                    return PolicyResponse::reject(&event.id, reason);
                }
            }
        }

        debug!(event_id = %event.id, pubkey = %event.pubkey, "event accepted by all filters");
        PolicyResponse::accept(&event.id)
    }

    fn log_rejection(&self, filter_name: &str, event: &Event, remote_ip: &str, reason: &str) {
        let level = self
            .rejection_levels
            .get(filter_name)
            .copied()
            .unwrap_or(LogLevel::Warn);
        match level {
            LogLevel::Debug => debug!(
                filter_name,
                remote_ip,
                event_id = %event.id,
                kind = event.kind,
                pubkey = %event.pubkey,
                reason,
                "event rejected by filter"
            ),
            LogLevel::Info => info!(
                filter_name,
                remote_ip,
                event_id = %event.id,
                kind = event.kind,
                pubkey = %event.pubkey,
                reason,
                "event rejected by filter"
            ),
            LogLevel::Warn => warn!(
                filter_name,
                remote_ip,
                event_id = %event.id,
                kind = event.kind,
                pubkey = %event.pubkey,
                reason,
                "event rejected by filter"
            ),
            LogLevel::Error => error!(
                filter_name,
                remote_ip,
                event_id = %event.id,
                kind = event.kind,
                pubkey = %event.pubkey,
                reason,
                "event rejected by filter"
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
