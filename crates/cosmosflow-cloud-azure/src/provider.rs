//! Azure provider implementation

use crate::arm::{AccountDto, ArmClient, KeysDto, SubscriptionDto};
use crate::credential::AzureCredential;
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use cosmosflow_cloud::{
    AccessKeys, AccountHandle, AccountKind, AccountSpec, AuthStatus, CloudError, DeleteOutcome,
    LocationList, ManagementApi, PollConfig, Region, RegionLocation, ResourceGroupHandle,
    SubscriptionInfo,
};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;

/// Azure provider (Resource Manager control plane)
pub struct AzureProvider {
    arm: ArmClient,
    configured_subscription: Option<String>,
    subscription: OnceCell<SubscriptionInfo>,
}

impl AzureProvider {
    pub fn new(credential: AzureCredential, subscription_id: Option<String>) -> Self {
        Self::with_poll_config(credential, subscription_id, PollConfig::default())
    }

    pub fn with_poll_config(
        credential: AzureCredential,
        subscription_id: Option<String>,
        poll: PollConfig,
    ) -> Self {
        Self {
            arm: ArmClient::new(credential, poll),
            configured_subscription: subscription_id.filter(|s| !s.trim().is_empty()),
            subscription: OnceCell::new(),
        }
    }

    /// Override the management endpoint (sovereign clouds)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.arm = self.arm.with_endpoint(endpoint);
        self
    }

    /// Configured id, then the CLI login's subscription, then the first enabled one
    async fn lookup_subscription(&self) -> Result<SubscriptionInfo> {
        let preferred = match &self.configured_subscription {
            Some(id) => Some(id.clone()),
            None => self.arm.credential().default_subscription().await,
        };

        if let Some(id) = preferred {
            tracing::debug!("Using subscription {}", id);
            let dto = self.arm.get_subscription(&id).await.map_err(|e| match e {
                AzureError::NotFound(_) => AzureError::CloudError(
                    CloudError::SubscriptionUnavailable(format!("{} does not exist", id)),
                ),
                other => other,
            })?;
            return Ok(subscription_info(dto));
        }

        let subscriptions = self.arm.list_subscriptions().await?;
        subscriptions
            .into_iter()
            .find(|s| s.state.as_deref().is_none_or(|state| state == "Enabled"))
            .map(subscription_info)
            .ok_or_else(|| {
                AzureError::CloudError(CloudError::SubscriptionUnavailable(
                    "no enabled subscription is visible to this credential".to_string(),
                ))
            })
    }

    async fn subscription_id(&self) -> Result<&str> {
        let info = self
            .subscription
            .get_or_try_init(|| self.lookup_subscription())
            .await?;
        Ok(info.id.as_str())
    }
}

fn subscription_info(dto: SubscriptionDto) -> SubscriptionInfo {
    SubscriptionInfo {
        id: dto.subscription_id,
        display_name: dto.display_name,
    }
}

fn account_kind(kind: Option<&str>) -> AccountKind {
    kind.and_then(|k| k.parse().ok())
        .unwrap_or(AccountKind::GlobalDocumentDB)
}

fn account_handle(dto: AccountDto, resource_group: &str) -> AccountHandle {
    let mut locations: Vec<RegionLocation> = dto
        .properties
        .locations
        .iter()
        .filter_map(|l| {
            Region::new(&l.location_name)
                .ok()
                .map(|region| RegionLocation::new(region, l.failover_priority))
        })
        .collect();
    locations.sort_by_key(|l| l.failover_priority);

    AccountHandle {
        id: dto.id,
        name: dto.name,
        resource_group: resource_group.to_string(),
        kind: account_kind(dto.kind.as_deref()),
        document_endpoint: dto.properties.document_endpoint,
        locations,
        provisioning_state: dto.properties.provisioning_state,
    }
}

impl From<KeysDto> for AccessKeys {
    fn from(keys: KeysDto) -> Self {
        Self {
            primary_master_key: keys.primary_master_key,
            secondary_master_key: keys.secondary_master_key,
            primary_readonly_master_key: keys.primary_readonly_master_key,
            secondary_readonly_master_key: keys.secondary_readonly_master_key,
        }
    }
}

#[async_trait]
impl ManagementApi for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn authenticate(&self) -> cosmosflow_cloud::Result<AuthStatus> {
        match self.arm.credential().bearer_token().await {
            Ok(_) => Ok(AuthStatus::ok(self.arm.credential().describe())),
            Err(AzureError::AzCliNotFound) => Ok(AuthStatus::failed(
                "no service principal configured and the az CLI is not installed",
            )),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn resolve_subscription(&self) -> cosmosflow_cloud::Result<SubscriptionInfo> {
        let info = self
            .subscription
            .get_or_try_init(|| self.lookup_subscription())
            .await?;
        Ok(info.clone())
    }

    async fn create_resource_group(
        &self,
        name: &str,
        region: &Region,
    ) -> cosmosflow_cloud::Result<ResourceGroupHandle> {
        let subscription = self.subscription_id().await?;
        let dto = self
            .arm
            .create_resource_group(subscription, name, region.as_str(), &BTreeMap::new())
            .await?;

        Ok(ResourceGroupHandle {
            id: dto.id,
            name: dto.name,
            region: Region::new(&dto.location)?,
        })
    }

    async fn create_account(
        &self,
        resource_group: &ResourceGroupHandle,
        spec: &AccountSpec,
    ) -> cosmosflow_cloud::Result<AccountHandle> {
        let subscription = self.subscription_id().await?;
        let dto = self
            .arm
            .create_or_update_account(subscription, &resource_group.name, spec)
            .await?;
        Ok(account_handle(dto, &resource_group.name))
    }

    async fn list_keys(&self, account: &AccountHandle) -> cosmosflow_cloud::Result<AccessKeys> {
        let subscription = self.subscription_id().await?;
        let keys = self
            .arm
            .list_keys(subscription, &account.resource_group, &account.name)
            .await?;
        Ok(keys.into())
    }

    async fn update_locations(
        &self,
        account: &AccountHandle,
        locations: &LocationList,
    ) -> cosmosflow_cloud::Result<AccountHandle> {
        let subscription = self.subscription_id().await?;
        let dto = self
            .arm
            .update_account_locations(subscription, &account.resource_group, &account.name, locations)
            .await?;
        Ok(account_handle(dto, &account.resource_group))
    }

    async fn list_accounts(
        &self,
        resource_group: &str,
    ) -> cosmosflow_cloud::Result<Vec<AccountHandle>> {
        let subscription = self.subscription_id().await?;
        let accounts = self.arm.list_accounts(subscription, resource_group).await?;
        Ok(accounts
            .into_iter()
            .map(|dto| account_handle(dto, resource_group))
            .collect())
    }

    async fn delete_account(&self, account: &AccountHandle) -> DeleteOutcome {
        let result = match self.subscription_id().await {
            Ok(subscription) => {
                self.arm
                    .delete_account(subscription, &account.resource_group, &account.name)
                    .await
            }
            Err(e) => Err(e),
        };
        DeleteOutcome::from_result(result.map_err(CloudError::from))
    }

    async fn delete_resource_group(&self, resource_group: &ResourceGroupHandle) -> DeleteOutcome {
        let result = match self.subscription_id().await {
            Ok(subscription) => {
                self.arm
                    .delete_resource_group(subscription, &resource_group.name)
                    .await
            }
            Err(e) => Err(e),
        };
        DeleteOutcome::from_result(result.map_err(CloudError::from))
    }
}
