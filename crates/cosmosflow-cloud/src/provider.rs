//! Provider trait definitions

use crate::error::{CloudError, Result};
use crate::model::{
    AccessKeys, AccountHandle, AccountSpec, ContainerSpec, DatabaseSpec, LocationList, Region,
    ResourceGroupHandle, SubscriptionInfo,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Management (control) plane abstraction
///
/// Every mutating call blocks until the provider reports a terminal state
/// for the long-running operation behind it.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Acquire a credential and report whether it is usable
    async fn authenticate(&self) -> Result<AuthStatus>;

    /// Resolve the subscription resources are placed in
    async fn resolve_subscription(&self) -> Result<SubscriptionInfo>;

    /// Create or update a resource group
    async fn create_resource_group(&self, name: &str, region: &Region)
    -> Result<ResourceGroupHandle>;

    /// Create a database account and wait for provisioning to finish
    async fn create_account(
        &self,
        resource_group: &ResourceGroupHandle,
        spec: &AccountSpec,
    ) -> Result<AccountHandle>;

    /// Read the account's keys
    async fn list_keys(&self, account: &AccountHandle) -> Result<AccessKeys>;

    /// Replace the account's replica list and wait for the control plane to accept it
    async fn update_locations(
        &self,
        account: &AccountHandle,
        locations: &LocationList,
    ) -> Result<AccountHandle>;

    /// List database accounts in a resource group
    async fn list_accounts(&self, resource_group: &str) -> Result<Vec<AccountHandle>>;

    /// Delete a database account
    async fn delete_account(&self, account: &AccountHandle) -> DeleteOutcome;

    /// Delete a resource group and everything in it
    async fn delete_resource_group(&self, resource_group: &ResourceGroupHandle) -> DeleteOutcome;
}

/// Data plane abstraction (databases and containers inside an account)
#[async_trait]
pub trait DataPlane: Send + Sync {
    async fn create_database(
        &self,
        connection: &DataPlaneConnection,
        database: &DatabaseSpec,
    ) -> Result<()>;

    async fn create_container(
        &self,
        connection: &DataPlaneConnection,
        database: &DatabaseSpec,
        container: &ContainerSpec,
    ) -> Result<()>;
}

/// Endpoint and key used to reach an account's data plane
#[derive(Clone)]
pub struct DataPlaneConnection {
    pub endpoint: String,
    pub key: String,
}

impl fmt::Debug for DataPlaneConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPlaneConnection")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Result of a delete call
///
/// A resource that is already gone is an expected outcome, not a failure.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(CloudError),
}

impl DeleteOutcome {
    /// Classify a delete result, folding "not found" into its own variant
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) if e.is_not_found() => DeleteOutcome::NotFound,
            Err(e) => DeleteOutcome::Failed(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DeleteOutcome::Failed(_))
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
