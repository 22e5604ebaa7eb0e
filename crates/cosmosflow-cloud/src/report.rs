//! Step records collected while a workflow runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Authenticate,
    ResolveSubscription,
    CreateResourceGroup,
    CreateAccount,
    FetchKeys,
    UpdateLocations,
    ExerciseDataPlane,
    DeleteAccount,
    DeleteResourceGroup,
}

impl Step {
    /// Teardown steps run on every exit path
    pub fn is_teardown(&self) -> bool {
        matches!(self, Step::DeleteAccount | Step::DeleteResourceGroup)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Authenticate => "authenticate",
            Step::ResolveSubscription => "resolve subscription",
            Step::CreateResourceGroup => "create resource group",
            Step::CreateAccount => "create account",
            Step::FetchKeys => "fetch keys",
            Step::UpdateLocations => "update locations",
            Step::ExerciseDataPlane => "exercise data plane",
            Step::DeleteAccount => "delete account",
            Step::DeleteResourceGroup => "delete resource group",
        };
        f.write_str(name)
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
    /// Delete target was already gone
    NotFound,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::NotFound => write!(f, "not found"),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,

    /// Success or skip message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,

    pub duration_ms: u64,
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every step succeeded
    Succeeded,
    /// Forward steps finished but the data plane or teardown reported problems
    Degraded,
    /// A forward step failed and the run went straight to teardown
    Aborted(Step),
}

/// Everything that happened during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub started_at: DateTime<Utc>,
    pub records: Vec<StepRecord>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,

    /// Step and message of the failure that aborted the forward path
    pub aborted: Option<(Step, String)>,
}

impl WorkflowReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            records: Vec::new(),
            duration_ms: 0,
            aborted: None,
        }
    }

    pub fn add_success(&mut self, step: Step, message: impl Into<String>, duration_ms: u64) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::Succeeded,
            message: message.into(),
            error: None,
            duration_ms,
        });
    }

    pub fn add_failure(&mut self, step: Step, error: impl Into<String>, duration_ms: u64) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::Failed,
            message: String::new(),
            error: Some(error.into()),
            duration_ms,
        });
    }

    pub fn add_skipped(&mut self, step: Step, message: impl Into<String>) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::Skipped,
            message: message.into(),
            error: None,
            duration_ms: 0,
        });
    }

    pub fn add_not_found(&mut self, step: Step, message: impl Into<String>, duration_ms: u64) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::NotFound,
            message: message.into(),
            error: None,
            duration_ms,
        });
    }

    /// Steps that were attempted, in order (skipped steps excluded)
    pub fn steps(&self) -> Vec<Step> {
        self.records
            .iter()
            .filter(|r| r.status != StepStatus::Skipped)
            .map(|r| r.step)
            .collect()
    }

    pub fn record(&self, step: Step) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.step == step)
    }

    /// Failed steps that did not abort the run
    pub fn warnings(&self) -> Vec<&StepRecord> {
        let aborted = self.aborted.as_ref().map(|(step, _)| *step);
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Failed && Some(r.step) != aborted)
            .collect()
    }

    pub fn outcome(&self) -> Outcome {
        if let Some((step, _)) = &self.aborted {
            return Outcome::Aborted(*step);
        }
        if self.warnings().is_empty() {
            Outcome::Succeeded
        } else {
            Outcome::Degraded
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let count = |status: StepStatus| self.records.iter().filter(|r| r.status == status).count();
        ReportSummary {
            succeeded: count(StepStatus::Succeeded),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            not_found: count(StepStatus::NotFound),
        }
    }
}

impl Default for WorkflowReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of recorded steps
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_found: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped, {} already gone",
            self.succeeded, self.failed, self.skipped, self.not_found
        )
    }
}
