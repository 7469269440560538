//! Structured pipeline events and the sinks that receive them.
//!
//! Components report progress through an injected `IngestObserver` instead of
//! logging directly, so callers decide where events go.

use std::cell::RefCell;

use serde::Serialize;

use crate::error::{ErrorKind, RowProcessingError};
use crate::model::PipelineState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted { state: PipelineState },
    RowsRead { total: usize },
    RowsTransformed { kept: usize, filtered_out: usize },
    SitesResolved {
        distinct: usize,
        exact: usize,
        fuzzy_full: usize,
        fuzzy_generic: usize,
        unmatched: usize,
    },
    RowsFiltered { kept: usize, dropped: usize },
    RowRejected { error: RowProcessingError },
    ChunkCommitted { index: usize, inserted: usize, ignored: usize },
    ChunkFailed { index: usize, rows: usize, message: String },
    Warning { message: String },
    Finished { success: bool, persisted: usize },
    Failed { state: PipelineState, kind: ErrorKind, message: String },
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StageStarted { state } => write!(f, "stage {state}"),
            Self::RowsRead { total } => write!(f, "read {total} rows"),
            Self::RowsTransformed { kept, filtered_out } => {
                write!(f, "transformed {kept} rows ({filtered_out} filtered out)")
            }
            Self::SitesResolved { distinct, exact, fuzzy_full, fuzzy_generic, unmatched } => write!(
                f,
                "resolved {distinct} site names: {exact} exact, {fuzzy_full} fuzzy full, \
                 {fuzzy_generic} fuzzy generic, {unmatched} unmatched"
            ),
            Self::RowsFiltered { kept, dropped } => {
                write!(f, "{kept} rows kept, {dropped} dropped for unmatched sites")
            }
            Self::RowRejected { error } => write!(f, "row rejected: {error}"),
            Self::ChunkCommitted { index, inserted, ignored } => {
                write!(f, "chunk {index} committed: {inserted} inserted, {ignored} ignored")
            }
            Self::ChunkFailed { index, rows, message } => {
                write!(f, "chunk {index} failed ({rows} rows): {message}")
            }
            Self::Warning { message } => write!(f, "{message}"),
            Self::Finished { success, persisted } => {
                write!(f, "finished (success={success}, persisted={persisted})")
            }
            Self::Failed { state, kind, message } => {
                write!(f, "failed in {state} ({kind}): {message}")
            }
        }
    }
}

pub trait IngestObserver {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl IngestObserver for LogObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ChunkFailed { .. }
            | PipelineEvent::Warning { .. }
            | PipelineEvent::Failed { .. } => log::warn!("{event}"),
            PipelineEvent::RowRejected { .. } | PipelineEvent::StageStarted { .. } => {
                log::debug!("{event}")
            }
            _ => log::info!("{event}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl IngestObserver for NullObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<PipelineEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.borrow().clone()
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<PipelineState> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageStarted { state } => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl IngestObserver for EventLog {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
