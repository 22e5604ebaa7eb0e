use async_trait::async_trait;
use cosmosflow_cloud::{
    AccessKeys, AccountHandle, AccountKind, AccountSpec, AuthStatus, CloudError, ConsistencyPolicy,
    ContainerSpec, DataPlane, DataPlaneConnection, DatabaseSpec, DeleteOutcome, LocationList,
    ManagementApi, Region, ResourceGroupHandle, Result, SubscriptionInfo, WorkflowPlan,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory provider that records every call it receives
#[derive(Default)]
pub struct FakeCloud {
    pub calls: Mutex<Vec<String>>,
    pub fail_auth: bool,
    pub fail_resource_group: bool,
    pub fail_create_account: bool,
    pub fail_update: bool,
    pub fail_delete_account: bool,
    pub account_already_gone: bool,
    pub resource_group_already_gone: bool,
    pub fail_data_plane: bool,
    pub empty_keys: bool,
    pub sent_locations: Mutex<Option<LocationList>>,
    pub data_plane_key: Mutex<Option<String>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ManagementApi for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn authenticate(&self) -> Result<AuthStatus> {
        self.log("authenticate");
        if self.fail_auth {
            return Ok(AuthStatus::failed("CLIENT_SECRET is not set"));
        }
        Ok(AuthStatus::ok("tester"))
    }

    async fn resolve_subscription(&self) -> Result<SubscriptionInfo> {
        self.log("resolve_subscription");
        Ok(SubscriptionInfo {
            id: "00000000-0000-0000-0000-000000000001".to_string(),
            display_name: Some("test".to_string()),
        })
    }

    async fn create_resource_group(
        &self,
        name: &str,
        region: &Region,
    ) -> Result<ResourceGroupHandle> {
        self.log("create_resource_group");
        if self.fail_resource_group {
            return Err(CloudError::ApiError("quota exceeded".to_string()));
        }
        Ok(ResourceGroupHandle {
            id: format!("/subscriptions/1/resourceGroups/{}", name),
            name: name.to_string(),
            region: region.clone(),
        })
    }

    async fn create_account(
        &self,
        resource_group: &ResourceGroupHandle,
        spec: &AccountSpec,
    ) -> Result<AccountHandle> {
        self.log("create_account");
        if self.fail_create_account {
            return Err(CloudError::OperationFailed {
                operation: "create account".to_string(),
                message: "capacity".to_string(),
            });
        }
        Ok(AccountHandle {
            id: format!("{}/databaseAccounts/{}", resource_group.id, spec.name),
            name: spec.name.clone(),
            resource_group: resource_group.name.clone(),
            kind: spec.kind,
            document_endpoint: Some(format!("https://{}.documents.azure.com:443/", spec.name)),
            locations: spec.locations.iter().cloned().collect(),
            provisioning_state: Some("Succeeded".to_string()),
        })
    }

    async fn list_keys(&self, _account: &AccountHandle) -> Result<AccessKeys> {
        self.log("list_keys");
        let key = if self.empty_keys { "" } else { "cHJpbWFyeQ==" };
        Ok(AccessKeys {
            primary_master_key: key.to_string(),
            secondary_master_key: "c2Vjb25kYXJ5".to_string(),
            primary_readonly_master_key: "cm8x".to_string(),
            secondary_readonly_master_key: "cm8y".to_string(),
        })
    }

    async fn update_locations(
        &self,
        account: &AccountHandle,
        locations: &LocationList,
    ) -> Result<AccountHandle> {
        self.log("update_locations");
        *self.sent_locations.lock().unwrap() = Some(locations.clone());
        if self.fail_update {
            return Err(CloudError::OperationFailed {
                operation: "update locations".to_string(),
                message: "simulated provider error".to_string(),
            });
        }
        let mut updated = account.clone();
        updated.locations = locations.iter().cloned().collect();
        Ok(updated)
    }

    async fn list_accounts(&self, _resource_group: &str) -> Result<Vec<AccountHandle>> {
        self.log("list_accounts");
        Ok(Vec::new())
    }

    async fn delete_account(&self, _account: &AccountHandle) -> DeleteOutcome {
        self.log("delete_account");
        if self.account_already_gone {
            return DeleteOutcome::NotFound;
        }
        if self.fail_delete_account {
            return DeleteOutcome::Failed(CloudError::ApiError("conflict".to_string()));
        }
        DeleteOutcome::Deleted
    }

    async fn delete_resource_group(&self, _resource_group: &ResourceGroupHandle) -> DeleteOutcome {
        self.log("delete_resource_group");
        if self.resource_group_already_gone {
            return DeleteOutcome::NotFound;
        }
        DeleteOutcome::Deleted
    }
}

#[async_trait]
impl DataPlane for FakeCloud {
    async fn create_database(
        &self,
        connection: &DataPlaneConnection,
        _database: &DatabaseSpec,
    ) -> Result<()> {
        self.log("create_database");
        *self.data_plane_key.lock().unwrap() = Some(connection.key.clone());
        if self.fail_data_plane {
            return Err(CloudError::ResourceAlreadyExists("TestDB".to_string()));
        }
        Ok(())
    }

    async fn create_container(
        &self,
        _connection: &DataPlaneConnection,
        _database: &DatabaseSpec,
        _container: &ContainerSpec,
    ) -> Result<()> {
        self.log("create_container");
        Ok(())
    }
}

pub fn region(name: &str) -> Region {
    Region::new(name).unwrap()
}

/// Plan matching the default run: one write region, patched to four
pub fn test_plan() -> WorkflowPlan {
    let write = region("eastus");
    let replicas = LocationList::with_read_regions(
        write.clone(),
        vec![region("eastasia"), region("southeastasia"), region("uksouth")],
    )
    .unwrap();

    WorkflowPlan {
        resource_group_name: "CosmosDBTemplateRG1a2b3c4d".to_string(),
        resource_group_region: write.clone(),
        account: AccountSpec {
            name: "dbaccount1a2b3c4d".to_string(),
            location: write.clone(),
            kind: AccountKind::GlobalDocumentDB,
            consistency: ConsistencyPolicy::bounded_staleness(300, 1000),
            locations: LocationList::single(write),
            ip_rules: Vec::new(),
            virtual_network_filter: false,
            automatic_failover: false,
            tags: BTreeMap::from([
                ("key1".to_string(), "value".to_string()),
                ("key2".to_string(), "value".to_string()),
            ]),
        },
        replica_locations: replicas,
        database: DatabaseSpec {
            id: "TestDB".to_string(),
        },
        container: ContainerSpec {
            id: "TestCollection".to_string(),
            partition_key_path: "/partitionKey".to_string(),
            throughput: 4000,
        },
    }
}
