//! Best-effort failure diagnostics.
//!
//! A diagnostic never masks the failure that triggered it: each task runs on
//! its own and its error is logged and dropped.

mod collector;

use std::future::Future;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::Result;

pub use collector::{CollectionReport, LogCollector};

/// One independent dump, rendered as text.
pub struct DiagnosticTask<'a> {
    label: String,
    dump: BoxFuture<'a, Result<String>>,
}

impl<'a> DiagnosticTask<'a> {
    pub fn new(
        label: impl Into<String>,
        dump: impl Future<Output = Result<String>> + Send + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            dump: Box::pin(dump),
        }
    }
}

/// What a task produced.
#[derive(Debug)]
pub struct DiagnosticOutcome {
    pub label: String,
    pub result: std::result::Result<String, String>,
}

impl DiagnosticOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every task in order, logging each dump or the reason it is unavailable.
pub async fn run_isolated(tasks: Vec<DiagnosticTask<'_>>) -> Vec<DiagnosticOutcome> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        let result = match task.dump.await {
            Ok(text) => {
                info!("{}:\n----\n{}\n----", task.label, indent(&text));
                Ok(text)
            }
            Err(e) => {
                warn!(label = %task.label, error = %e, "Diagnostic not available");
                Err(e.to_string())
            }
        };
        outcomes.push(DiagnosticOutcome {
            label: task.label,
            result,
        });
    }
    outcomes
}

/// Indent every line of `text` by four spaces.
pub fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
