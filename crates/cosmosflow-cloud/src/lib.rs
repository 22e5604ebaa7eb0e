//! CosmosFlow Cloud
//!
//! Provider abstraction and the provisioning workflow for managed
//! database accounts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 cosmosflow CLI                   │
//! │              (cosmosflow run/accounts)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               cosmosflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          ProvisioningWorkflow            │   │
//! │  │  steps -> CleanupScope -> teardown       │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ ManagementApi│  │  DataPlane   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼─────────────────▼───────┐
//! │      cosmosflow-cloud-azure     │
//! │   (ARM REST + SQL data plane)   │
//! └─────────────────────────────────┘
//! ```

pub mod error;
pub mod model;
pub mod poller;
pub mod provider;
pub mod report;
pub mod workflow;

// Re-exports
pub use error::{CloudError, Result};
pub use model::{
    AccessKeys, AccountHandle, AccountKind, AccountSpec, ConsistencyLevel, ConsistencyPolicy,
    ContainerSpec, DatabaseSpec, LocationList, Region, RegionLocation, ResourceGroupHandle,
    SubscriptionInfo, random_name, validate_account_name, validate_resource_group_name,
};
pub use poller::{OperationStatus, PollConfig, PollResponse, wait_until_completed};
pub use provider::{AuthStatus, DataPlane, DataPlaneConnection, DeleteOutcome, ManagementApi};
pub use report::{Outcome, ReportSummary, Step, StepRecord, StepStatus, WorkflowReport};
pub use workflow::{
    CleanupScope, ProvisioningWorkflow, WorkflowContext, WorkflowError, WorkflowPlan,
};
