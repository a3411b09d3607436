//! Ordered multi-step writes with per-step failure policy.
//!
//! Several engine operations are a chain of independent storage round trips
//! with no surrounding transaction. Each step is tagged: a failing
//! [`Criticality::Critical`] step aborts the chain and its error is returned,
//! a failing [`Criticality::BestEffort`] step is logged and recorded in the
//! [`CascadeReport`] and the chain goes on. Steps already executed are not
//! undone.

use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    BestEffort,
}

pub struct Step<'a> {
    name: &'static str,
    criticality: Criticality,
    action: BoxFuture<'a, Result<()>>,
}

impl<'a> Step<'a> {
    pub fn critical<F>(name: &'static str, action: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'a,
    {
        Self {
            name,
            criticality: Criticality::Critical,
            action: Box::pin(action),
        }
    }

    pub fn best_effort<F>(name: &'static str, action: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'a,
    {
        Self {
            name,
            criticality: Criticality::BestEffort,
            action: Box::pin(action),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }
}

/// A best-effort step that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepWarning {
    pub step: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    /// Steps that succeeded, in execution order.
    pub completed: Vec<&'static str>,
    pub warnings: Vec<StepWarning>,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Runs `steps` in order. Steps are lazy: a step's work only starts when the
/// previous one has finished.
pub async fn run_cascade(label: &str, steps: Vec<Step<'_>>) -> Result<CascadeReport> {
    let mut report = CascadeReport::default();

    for step in steps {
        match step.action.await {
            Ok(()) => {
                tracing::debug!("{}: step '{}' done", label, step.name);
                report.completed.push(step.name);
            }
            Err(e) if step.criticality == Criticality::BestEffort => {
                tracing::warn!("{}: best-effort step '{}' failed: {}", label, step.name, e);
                report.warnings.push(StepWarning {
                    step: step.name,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!("{}: step '{}' failed, aborting: {}", label, step.name, e);
                return Err(e);
            }
        }
    }

    Ok(report)
}
