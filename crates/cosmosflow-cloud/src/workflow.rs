//! Provisioning workflow runner
//!
//! Stands up a resource group and database account, widens its replica
//! list, reads its keys, exercises the data plane, then tears everything
//! down again. Teardown runs on every exit path and only touches what the
//! [`WorkflowContext`] records as created.
//!
//! ```text
//! authenticate -> resolve subscription -> create resource group
//!   -> create account -> fetch keys -> update locations -> data plane
//!   -> (always) delete account -> delete resource group
//! ```

use crate::error::CloudError;
use crate::model::{
    AccessKeys, AccountHandle, AccountKind, AccountSpec, ContainerSpec, DatabaseSpec,
    LocationList, Region, ResourceGroupHandle, SubscriptionInfo,
};
use crate::provider::{DataPlane, DataPlaneConnection, DeleteOutcome, ManagementApi};
use crate::report::{Step, WorkflowReport};
use std::time::Instant;
use thiserror::Error;

/// Inputs for one run
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub resource_group_name: String,
    pub resource_group_region: Region,
    pub account: AccountSpec,

    /// Full replica list sent by the location patch
    pub replica_locations: LocationList,

    pub database: DatabaseSpec,
    pub container: ContainerSpec,
}

/// Failures that stop the forward path
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("authentication failed: {0}")]
    Authentication(#[source] CloudError),

    #[error("subscription could not be resolved: {0}")]
    Subscription(#[source] CloudError),

    #[error("{step} failed: {source}")]
    Provisioning {
        step: Step,
        #[source]
        source: CloudError,
    },

    #[error("replica list rejected: {0}")]
    InvalidLocations(String),
}

impl WorkflowError {
    fn at(step: Step, source: CloudError) -> Self {
        match step {
            Step::Authenticate => WorkflowError::Authentication(source),
            Step::ResolveSubscription => WorkflowError::Subscription(source),
            _ => WorkflowError::Provisioning { step, source },
        }
    }

    /// Step the failure happened in
    pub fn step(&self) -> Step {
        match self {
            WorkflowError::Authentication(_) => Step::Authenticate,
            WorkflowError::Subscription(_) => Step::ResolveSubscription,
            WorkflowError::Provisioning { step, .. } => *step,
            WorkflowError::InvalidLocations(_) => Step::UpdateLocations,
        }
    }
}

/// Handles for everything created so far in a run
#[derive(Debug, Default)]
pub struct WorkflowContext {
    pub subscription: Option<SubscriptionInfo>,
    pub resource_group: Option<ResourceGroupHandle>,
    pub account: Option<AccountHandle>,
    pub keys: Option<AccessKeys>,
}

/// Owns the context of a run until teardown consumes it
///
/// Dropping a scope that still holds a resource group without calling
/// [`CleanupScope::teardown`] logs the resources left behind.
pub struct CleanupScope {
    context: WorkflowContext,
    closed: bool,
}

impl CleanupScope {
    pub fn new() -> Self {
        Self {
            context: WorkflowContext::default(),
            closed: false,
        }
    }

    pub fn context_mut(&mut self) -> &mut WorkflowContext {
        &mut self.context
    }

    /// Delete the account, then the resource group
    ///
    /// Each delete is isolated: a failed account delete still lets the
    /// resource group delete run. With no resource group this is a no-op.
    pub async fn teardown(mut self, management: &dyn ManagementApi, report: &mut WorkflowReport) {
        let context = std::mem::take(&mut self.context);
        self.closed = true;

        let Some(resource_group) = context.resource_group else {
            tracing::info!("Did not create any resources. No clean up is necessary");
            return;
        };

        if let Some(account) = &context.account {
            tracing::info!("Deleting account: {}", account.name);
            let started = Instant::now();
            let outcome = management.delete_account(account).await;
            record_delete(report, Step::DeleteAccount, &account.name, started, outcome);
        }

        tracing::info!("Deleting resource group: {}", resource_group.name);
        let started = Instant::now();
        let outcome = management.delete_resource_group(&resource_group).await;
        record_delete(
            report,
            Step::DeleteResourceGroup,
            &resource_group.name,
            started,
            outcome,
        );
    }
}

impl Default for CleanupScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Some(resource_group) = &self.context.resource_group {
            tracing::warn!(
                "Resource group {} ({}) was not torn down and must be deleted manually",
                resource_group.name,
                resource_group.id
            );
        }
    }
}

fn record_delete(
    report: &mut WorkflowReport,
    step: Step,
    name: &str,
    started: Instant,
    outcome: DeleteOutcome,
) {
    let elapsed = elapsed_ms(started);
    match outcome {
        DeleteOutcome::Deleted => {
            tracing::info!("Deleted {}", name);
            report.add_success(step, format!("deleted {}", name), elapsed);
        }
        DeleteOutcome::NotFound => {
            tracing::info!("{} was already gone", name);
            report.add_not_found(step, format!("{} was already gone", name), elapsed);
        }
        DeleteOutcome::Failed(e) => {
            tracing::warn!("Failed to delete {}: {}", name, e);
            report.add_failure(step, e.to_string(), elapsed);
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Record a forward step and turn its error into a [`WorkflowError`]
fn finish<T>(
    report: &mut WorkflowReport,
    step: Step,
    started: Instant,
    result: crate::Result<T>,
    describe: impl FnOnce(&T) -> String,
) -> Result<T, WorkflowError> {
    let elapsed = elapsed_ms(started);
    match result {
        Ok(value) => {
            let message = describe(&value);
            tracing::info!("{}: {}", step, message);
            report.add_success(step, message, elapsed);
            Ok(value)
        }
        Err(source) => {
            tracing::error!("{} failed: {}", step, source);
            report.add_failure(step, source.to_string(), elapsed);
            Err(WorkflowError::at(step, source))
        }
    }
}

/// Runs the provisioning pipeline against a management and data plane
pub struct ProvisioningWorkflow<'a> {
    management: &'a dyn ManagementApi,
    data_plane: &'a dyn DataPlane,
    plan: WorkflowPlan,
}

impl<'a> ProvisioningWorkflow<'a> {
    pub fn new(
        management: &'a dyn ManagementApi,
        data_plane: &'a dyn DataPlane,
        plan: WorkflowPlan,
    ) -> Self {
        Self {
            management,
            data_plane,
            plan,
        }
    }

    /// Run every step, then tear down whatever was created
    pub async fn run(&self) -> WorkflowReport {
        let start = Instant::now();
        let mut report = WorkflowReport::new();
        let mut scope = CleanupScope::new();

        tracing::info!(
            "Starting provisioning run on {} (resource group {}, account {})",
            self.management.name(),
            self.plan.resource_group_name,
            self.plan.account.name
        );

        if let Err(e) = self.provision(scope.context_mut(), &mut report).await {
            tracing::error!("Provisioning aborted: {}", e);
            report.aborted = Some((e.step(), e.to_string()));
        }

        scope.teardown(self.management, &mut report).await;

        report.duration_ms = elapsed_ms(start);
        report
    }

    async fn provision(
        &self,
        context: &mut WorkflowContext,
        report: &mut WorkflowReport,
    ) -> Result<(), WorkflowError> {
        let started = Instant::now();
        let auth = self.management.authenticate().await.and_then(|status| {
            if status.authenticated {
                Ok(status.account_info.unwrap_or_else(|| "unknown".to_string()))
            } else {
                Err(CloudError::AuthenticationFailed(
                    status
                        .error
                        .unwrap_or_else(|| "no usable credential".to_string()),
                ))
            }
        });
        finish(report, Step::Authenticate, started, auth, |who| {
            format!("authenticated as {}", who)
        })?;

        let started = Instant::now();
        let subscription = self.management.resolve_subscription().await;
        let subscription = finish(report, Step::ResolveSubscription, started, subscription, |s| {
            format!("using subscription {}", s.id)
        })?;
        context.subscription = Some(subscription);

        let started = Instant::now();
        let resource_group = self
            .management
            .create_resource_group(
                &self.plan.resource_group_name,
                &self.plan.resource_group_region,
            )
            .await;
        let resource_group =
            finish(report, Step::CreateResourceGroup, started, resource_group, |rg| {
                format!("created resource group {} in {}", rg.name, rg.region)
            })?;
        context.resource_group = Some(resource_group.clone());

        let started = Instant::now();
        let account = self
            .management
            .create_account(&resource_group, &self.plan.account)
            .await;
        let account = finish(report, Step::CreateAccount, started, account, |a| {
            format!("created {} account {}", a.kind, a.name)
        })?;
        context.account = Some(account.clone());

        let started = Instant::now();
        let keys = self
            .management
            .list_keys(&account)
            .await
            .and_then(|keys| {
                if keys.primary_master_key.is_empty() {
                    Err(CloudError::ApiError(
                        "provider returned an empty master key".to_string(),
                    ))
                } else {
                    Ok(keys)
                }
            });
        let keys = finish(report, Step::FetchKeys, started, keys, |_| {
            "retrieved master keys".to_string()
        })?;
        context.keys = Some(keys.clone());

        let account = self.update_locations(&account, report).await?;
        context.account = Some(account.clone());

        self.exercise_data_plane(&account, &keys, report).await;
        Ok(())
    }

    async fn update_locations(
        &self,
        account: &AccountHandle,
        report: &mut WorkflowReport,
    ) -> Result<AccountHandle, WorkflowError> {
        let started = Instant::now();
        let replicas = &self.plan.replica_locations;
        let current_write = account
            .write_region()
            .unwrap_or_else(|| self.plan.account.locations.write_region());

        if replicas.write_region() != current_write {
            let message = format!(
                "failover priority 0 must stay on {}, replica list puts {} first",
                current_write,
                replicas.write_region()
            );
            tracing::error!("{} failed: {}", Step::UpdateLocations, message);
            report.add_failure(Step::UpdateLocations, message.clone(), elapsed_ms(started));
            return Err(WorkflowError::InvalidLocations(message));
        }

        let regions: Vec<String> = replicas.iter().map(|l| l.region.to_string()).collect();
        tracing::info!(
            "Updating account {} to {} regions: {}",
            account.name,
            replicas.len(),
            regions.join(", ")
        );
        let updated = self.management.update_locations(account, replicas).await;
        finish(report, Step::UpdateLocations, started, updated, |a| {
            format!("account {} now replicates to {} regions", a.name, regions.len())
        })
    }

    /// Create the database and container; failures are recorded, never escalated
    async fn exercise_data_plane(
        &self,
        account: &AccountHandle,
        keys: &AccessKeys,
        report: &mut WorkflowReport,
    ) {
        if account.kind == AccountKind::MongoDB {
            report.add_skipped(
                Step::ExerciseDataPlane,
                "MongoDB accounts are not served by the document data plane",
            );
            return;
        }

        let started = Instant::now();
        let Some(endpoint) = account.document_endpoint.clone() else {
            tracing::warn!("Account {} reported no document endpoint", account.name);
            report.add_failure(
                Step::ExerciseDataPlane,
                "account has no document endpoint",
                elapsed_ms(started),
            );
            return;
        };

        let connection = DataPlaneConnection {
            endpoint,
            key: keys.primary_master_key.clone(),
        };
        let database = &self.plan.database;
        let container = &self.plan.container;

        let result = async {
            self.data_plane
                .create_database(&connection, database)
                .await?;
            self.data_plane
                .create_container(&connection, database, container)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                let message = format!(
                    "created database {} and container {} ({} RU/s, partition key {})",
                    database.id, container.id, container.throughput, container.partition_key_path
                );
                tracing::info!("{}", message);
                report.add_success(Step::ExerciseDataPlane, message, elapsed_ms(started));
            }
            Err(e) => {
                tracing::warn!("Data plane step failed, continuing to teardown: {}", e);
                report.add_failure(Step::ExerciseDataPlane, e.to_string(), elapsed_ms(started));
            }
        }
    }
}
