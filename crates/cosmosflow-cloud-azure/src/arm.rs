//! Azure Resource Manager REST client
//!
//! Direct ARM implementation for subscriptions, resource groups and
//! `Microsoft.DocumentDB/databaseAccounts`. Mutating calls follow the
//! long-running-operation headers until the provider reports a terminal
//! status.

use crate::credential::AzureCredential;
use crate::error::{AzureError, Result};
use cosmosflow_cloud::{
    AccountSpec, CloudError, LocationList, OperationStatus, PollConfig, PollResponse, wait_until_completed,
};
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

pub const ARM_ENDPOINT: &str = "https://management.azure.com";

const SUBSCRIPTION_API_VERSION: &str = "2022-12-01";
const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const COSMOS_API_VERSION: &str = "2024-05-15";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// ARM client bound to one credential
pub struct ArmClient {
    client: reqwest::Client,
    credential: AzureCredential,
    endpoint: String,
    poll: PollConfig,
}

/// How to follow a long-running operation
#[derive(Debug, Clone, PartialEq, Eq)]
enum LroTracker {
    /// `Azure-AsyncOperation` status resource
    AsyncOperation(String),
    /// `Location` header: 202 while running, 200/204 when done
    Location(String),
    /// No header: read `provisioningState` of the resource itself
    ProvisioningState(String),
    /// Already complete
    Done,
}

impl ArmClient {
    pub fn new(credential: AzureCredential, poll: PollConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            endpoint: ARM_ENDPOINT.to_string(),
            poll,
        }
    }

    /// Override the management endpoint (sovereign clouds)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn credential(&self) -> &AzureCredential {
        &self.credential
    }

    fn subscription_url(&self, subscription: &str) -> String {
        format!("{}/subscriptions/{}", self.endpoint, subscription)
    }

    fn resource_group_url(&self, subscription: &str, name: &str) -> String {
        format!(
            "{}/resourcegroups/{}?api-version={}",
            self.subscription_url(subscription),
            name,
            RESOURCE_GROUP_API_VERSION
        )
    }

    fn accounts_base(&self, subscription: &str, resource_group: &str) -> String {
        format!(
            "{}/resourceGroups/{}/providers/Microsoft.DocumentDB/databaseAccounts",
            self.subscription_url(subscription),
            resource_group
        )
    }

    fn account_url(&self, subscription: &str, resource_group: &str, name: &str) -> String {
        format!(
            "{}/{}?api-version={}",
            self.accounts_base(subscription, resource_group),
            name,
            COSMOS_API_VERSION
        )
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<reqwest::Response> {
        let token = self.credential.bearer_token().await?;
        tracing::debug!("ARM {} {}", method, url);

        // ARM は Content-Length のない POST/PUT を 411 で拒否する
        let needs_length = method == Method::POST || method == Method::PUT;
        let mut request = self.client.request(method, url).bearer_auth(token);
        match body {
            Some(body) => request = request.json(body),
            None if needs_length => request = request.header(CONTENT_LENGTH, "0"),
            None => {}
        }
        Ok(request.send().await?)
    }

    /// Map non-success statuses to errors; `what` names the target for not-found
    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_error(status, &text, what))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self.send(Method::GET, url, None).await?;
        let response = Self::check(response, what).await?;
        Ok(response.json().await?)
    }

    /// Collect every page of an ARM list response
    async fn list_all<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next {
            let page: ListResponse<T> = self.get_json(&url, what).await?;
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }

    async fn poll_once(&self, tracker: &LroTracker) -> Result<PollResponse> {
        match tracker {
            LroTracker::Done => Ok(OperationStatus::Succeeded.into()),
            LroTracker::AsyncOperation(url) => {
                let response = self.send(Method::GET, url, None).await?;
                let retry_after = retry_after(response.headers());
                let response = Self::check(response, "operation status").await?;
                let body: AsyncOperationStatus = response.json().await?;
                let error = body.error.map(|e| format!("{}: {}", e.code, e.message));
                Ok(PollResponse {
                    status: OperationStatus::from_provider(&body.status, error),
                    retry_after,
                })
            }
            LroTracker::Location(url) => {
                let response = self.send(Method::GET, url, None).await?;
                let retry_after = retry_after(response.headers());
                let status = match response.status() {
                    StatusCode::ACCEPTED => OperationStatus::InProgress,
                    s if s.is_success() => OperationStatus::Succeeded,
                    s => {
                        let text = response.text().await.unwrap_or_default();
                        OperationStatus::Failed(classify_error(s, &text, "operation").to_string())
                    }
                };
                Ok(PollResponse {
                    status,
                    retry_after,
                })
            }
            LroTracker::ProvisioningState(url) => {
                let resource: ProvisionedResource = self.get_json(url, "resource").await?;
                let state = resource
                    .properties
                    .provisioning_state
                    .unwrap_or_else(|| "Succeeded".to_string());
                Ok(OperationStatus::from_provider(&state, None).into())
            }
        }
    }

    async fn wait(&self, tracker: LroTracker, operation: &str) -> Result<()> {
        if tracker == LroTracker::Done {
            return Ok(());
        }
        tracing::info!("Waiting for {} to complete", operation);
        let tracker = &tracker;
        wait_until_completed(&self.poll, operation, move || async move {
            self.poll_once(tracker).await.map_err(CloudError::from)
        })
        .await?;
        Ok(())
    }

    // ============ Subscriptions ============

    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionDto>> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.endpoint, SUBSCRIPTION_API_VERSION
        );
        self.list_all(&url, "subscriptions").await
    }

    pub async fn get_subscription(&self, subscription: &str) -> Result<SubscriptionDto> {
        let url = format!(
            "{}?api-version={}",
            self.subscription_url(subscription),
            SUBSCRIPTION_API_VERSION
        );
        self.get_json(&url, &format!("subscription {}", subscription))
            .await
    }

    // ============ Resource groups ============

    /// Create or update a resource group (synchronous in ARM)
    pub async fn create_resource_group(
        &self,
        subscription: &str,
        name: &str,
        location: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<ResourceGroupDto> {
        let url = self.resource_group_url(subscription, name);
        let body = json!({ "location": location, "tags": tags });
        let response = self.send(Method::PUT, &url, Some(&body)).await?;
        let response = Self::check(response, &format!("resource group {}", name)).await?;
        Ok(response.json().await?)
    }

    /// Delete a resource group and wait for ARM to finish
    ///
    /// Returns `AzureError::NotFound` when the group does not exist.
    pub async fn delete_resource_group(&self, subscription: &str, name: &str) -> Result<()> {
        let url = self.resource_group_url(subscription, name);
        self.delete(&url, &format!("resource group {}", name)).await
    }

    // ============ Database accounts ============

    pub async fn create_or_update_account(
        &self,
        subscription: &str,
        resource_group: &str,
        spec: &AccountSpec,
    ) -> Result<AccountDto> {
        let url = self.account_url(subscription, resource_group, &spec.name);
        let body = account_create_body(spec);
        let what = format!("database account {}", spec.name);

        let response = self.send(Method::PUT, &url, Some(&body)).await?;
        let response = Self::check(response, &what).await?;
        let tracker = tracker_for(response.status(), response.headers(), &url);
        self.wait(tracker, &format!("create {}", what)).await?;

        self.get_account(subscription, resource_group, &spec.name)
            .await
    }

    pub async fn get_account(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<AccountDto> {
        let url = self.account_url(subscription, resource_group, name);
        self.get_json(&url, &format!("database account {}", name))
            .await
    }

    /// Replace the replica list of an account
    pub async fn update_account_locations(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        locations: &LocationList,
    ) -> Result<AccountDto> {
        let url = self.account_url(subscription, resource_group, name);
        let body = locations_patch_body(locations);
        let what = format!("database account {}", name);

        let response = self.send(Method::PATCH, &url, Some(&body)).await?;
        let response = Self::check(response, &what).await?;
        let tracker = tracker_for(response.status(), response.headers(), &url);
        self.wait(tracker, &format!("update locations of {}", what))
            .await?;

        self.get_account(subscription, resource_group, name).await
    }

    pub async fn list_accounts(
        &self,
        subscription: &str,
        resource_group: &str,
    ) -> Result<Vec<AccountDto>> {
        let url = format!(
            "{}?api-version={}",
            self.accounts_base(subscription, resource_group),
            COSMOS_API_VERSION
        );
        self.list_all(&url, &format!("resource group {}", resource_group))
            .await
    }

    pub async fn list_keys(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<KeysDto> {
        let url = format!(
            "{}/{}/listKeys?api-version={}",
            self.accounts_base(subscription, resource_group),
            name,
            COSMOS_API_VERSION
        );
        let response = self.send(Method::POST, &url, None).await?;
        let response = Self::check(response, &format!("database account {}", name)).await?;
        Ok(response.json().await?)
    }

    /// Delete an account and wait for ARM to finish
    ///
    /// Returns `AzureError::NotFound` when the account does not exist.
    pub async fn delete_account(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<()> {
        let url = self.account_url(subscription, resource_group, name);
        self.delete(&url, &format!("database account {}", name))
            .await
    }

    async fn delete(&self, url: &str, what: &str) -> Result<()> {
        let response = self.send(Method::DELETE, url, None).await?;
        // ARM answers 204 when there was nothing to delete
        if response.status() == StatusCode::NO_CONTENT {
            return Err(AzureError::NotFound(what.to_string()));
        }
        let response = Self::check(response, what).await?;
        let tracker = match tracker_for(response.status(), response.headers(), url) {
            // a deleted resource cannot report its own provisioning state
            LroTracker::ProvisioningState(_) => LroTracker::Done,
            other => other,
        };
        self.wait(tracker, &format!("delete {}", what)).await
    }
}

/// Pick the polling strategy from an initial LRO response
fn tracker_for(status: StatusCode, headers: &HeaderMap, resource_url: &str) -> LroTracker {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(url) = header(ASYNC_OPERATION_HEADER) {
        return LroTracker::AsyncOperation(url);
    }
    if let Some(url) = header(LOCATION_HEADER) {
        return LroTracker::Location(url);
    }
    match status {
        StatusCode::ACCEPTED | StatusCode::CREATED => {
            LroTracker::ProvisioningState(resource_url.to_string())
        }
        _ => LroTracker::Done,
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Turn an ARM error response into an [`AzureError`]
fn classify_error(status: StatusCode, body: &str, what: &str) -> AzureError {
    let detail = serde_json::from_str::<ArmErrorResponse>(body)
        .ok()
        .and_then(|r| r.error);
    let (code, message) = match detail {
        Some(d) => (d.code, d.message),
        None => (
            status.canonical_reason().unwrap_or("Unknown").to_string(),
            body.trim().to_string(),
        ),
    };

    match status {
        StatusCode::NOT_FOUND => AzureError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AzureError::Unauthorized {
            status: status.as_u16(),
            message: format!("{}: {}", code, message),
        },
        StatusCode::CONFLICT => AzureError::Conflict(format!("{}: {}", what, message)),
        _ => AzureError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

fn locations_json(locations: &LocationList) -> Vec<Value> {
    locations
        .iter()
        .map(|l| {
            json!({
                "locationName": l.region.as_str(),
                "failoverPriority": l.failover_priority,
                "isZoneRedundant": false,
            })
        })
        .collect()
}

/// Request body for creating a database account
pub fn account_create_body(spec: &AccountSpec) -> Value {
    let mut consistency = json!({
        "defaultConsistencyLevel": spec.consistency.level.as_api_str(),
    });
    if spec.consistency.level == cosmosflow_cloud::ConsistencyLevel::BoundedStaleness {
        consistency["maxStalenessPrefix"] = json!(spec.consistency.max_staleness_prefix);
        consistency["maxIntervalInSeconds"] = json!(spec.consistency.max_interval_seconds);
    }

    let ip_rules: Vec<Value> = spec
        .ip_rules
        .iter()
        .map(|ip| json!({ "ipAddressOrRange": ip }))
        .collect();

    json!({
        "location": spec.location.as_str(),
        "kind": spec.kind.as_api_str(),
        "tags": spec.tags,
        "properties": {
            "databaseAccountOfferType": "Standard",
            "locations": locations_json(&spec.locations),
            "consistencyPolicy": consistency,
            "ipRules": ip_rules,
            "isVirtualNetworkFilterEnabled": spec.virtual_network_filter,
            "enableAutomaticFailover": spec.automatic_failover,
            "disableKeyBasedMetadataWriteAccess": false,
        }
    })
}

/// Request body replacing the replica list
pub fn locations_patch_body(locations: &LocationList) -> Value {
    json!({
        "properties": {
            "locations": locations_json(locations),
        }
    })
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProvisionedResource {
    #[serde(default)]
    properties: ProvisionedProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionedProperties {
    provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroupDto {
    pub id: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub properties: AccountPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPropertiesDto {
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub document_endpoint: Option<String>,
    #[serde(default)]
    pub locations: Vec<LocationDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub location_name: String,
    pub failover_priority: u32,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysDto {
    pub primary_master_key: String,
    pub secondary_master_key: String,
    pub primary_readonly_master_key: String,
    pub secondary_readonly_master_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmosflow_cloud::{AccountKind, ConsistencyPolicy, Region};
    use reqwest::header::HeaderValue;

    fn region(name: &str) -> Region {
        Region::new(name).unwrap()
    }

    fn spec() -> AccountSpec {
        AccountSpec {
            name: "dbaccount1234abcd".to_string(),
            location: region("westus2"),
            kind: AccountKind::GlobalDocumentDB,
            consistency: ConsistencyPolicy::bounded_staleness(300, 1000),
            locations: LocationList::single(region("eastus")),
            ip_rules: vec!["23.43.235.120".to_string()],
            virtual_network_filter: true,
            automatic_failover: false,
            tags: BTreeMap::from([("key1".to_string(), "value".to_string())]),
        }
    }

    fn client() -> ArmClient {
        let credential = AzureCredential::from_settings(Some("a"), Some("b"), Some("c")).unwrap();
        ArmClient::new(credential, PollConfig::default())
            .with_endpoint("https://management.example.com/")
    }

    #[test]
    fn test_account_create_body() {
        let body = account_create_body(&spec());

        assert_eq!(body["location"], "westus2");
        assert_eq!(body["kind"], "GlobalDocumentDB");
        assert_eq!(body["tags"]["key1"], "value");

        let properties = &body["properties"];
        assert_eq!(properties["locations"][0]["locationName"], "eastus");
        assert_eq!(properties["locations"][0]["failoverPriority"], 0);
        assert_eq!(
            properties["consistencyPolicy"]["defaultConsistencyLevel"],
            "BoundedStaleness"
        );
        assert_eq!(properties["consistencyPolicy"]["maxStalenessPrefix"], 300);
        assert_eq!(properties["consistencyPolicy"]["maxIntervalInSeconds"], 1000);
        assert_eq!(properties["ipRules"][0]["ipAddressOrRange"], "23.43.235.120");
        assert_eq!(properties["isVirtualNetworkFilterEnabled"], true);
        assert_eq!(properties["enableAutomaticFailover"], false);
    }

    #[test]
    fn test_session_consistency_has_no_bounds() {
        let mut spec = spec();
        spec.consistency = ConsistencyPolicy::new(cosmosflow_cloud::ConsistencyLevel::Session);
        let body = account_create_body(&spec);
        let policy = &body["properties"]["consistencyPolicy"];
        assert_eq!(policy["defaultConsistencyLevel"], "Session");
        assert!(policy.get("maxStalenessPrefix").is_none());
    }

    #[test]
    fn test_locations_patch_body() {
        let locations = LocationList::with_read_regions(
            region("eastus"),
            vec![region("eastasia"), region("uksouth")],
        )
        .unwrap();
        let body = locations_patch_body(&locations);
        let sent = body["properties"]["locations"].as_array().unwrap();

        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2]["locationName"], "uksouth");
        assert_eq!(sent[2]["failoverPriority"], 2);
    }

    #[test]
    fn test_urls() {
        let arm = client();
        assert_eq!(
            arm.resource_group_url("sub", "rg1"),
            "https://management.example.com/subscriptions/sub/resourcegroups/rg1?api-version=2021-04-01"
        );
        assert_eq!(
            arm.account_url("sub", "rg1", "acct"),
            "https://management.example.com/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.DocumentDB/databaseAccounts/acct?api-version=2024-05-15"
        );
    }

    #[test]
    fn test_tracker_prefers_async_operation() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Azure-AsyncOperation",
            HeaderValue::from_static("https://management.example.com/op/1"),
        );
        headers.insert("Location", HeaderValue::from_static("https://management.example.com/loc/1"));

        assert_eq!(
            tracker_for(StatusCode::OK, &headers, "https://r"),
            LroTracker::AsyncOperation("https://management.example.com/op/1".to_string())
        );

        headers.remove("Azure-AsyncOperation");
        assert_eq!(
            tracker_for(StatusCode::ACCEPTED, &headers, "https://r"),
            LroTracker::Location("https://management.example.com/loc/1".to_string())
        );
    }

    #[test]
    fn test_tracker_without_headers() {
        let headers = HeaderMap::new();
        assert_eq!(
            tracker_for(StatusCode::CREATED, &headers, "https://r"),
            LroTracker::ProvisioningState("https://r".to_string())
        );
        assert_eq!(tracker_for(StatusCode::OK, &headers, "https://r"), LroTracker::Done);
    }

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert("Retry-After", HeaderValue::from_static("15"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_classify_error() {
        let body = r#"{"error":{"code":"BadRequest","message":"Invalid throughput"}}"#;
        match classify_error(StatusCode::BAD_REQUEST, body, "account") {
            AzureError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "BadRequest");
                assert_eq!(message, "Invalid throughput");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }

        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, "", "rg1"),
            AzureError::NotFound(what) if what == "rg1"
        ));
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, "not json", "rg1"),
            AzureError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            classify_error(StatusCode::CONFLICT, body, "acct"),
            AzureError::Conflict(_)
        ));
    }

    #[test]
    fn test_account_dto_parse() {
        let body = r#"{
            "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/acct",
            "name": "acct",
            "location": "West US 2",
            "kind": "GlobalDocumentDB",
            "properties": {
                "provisioningState": "Succeeded",
                "documentEndpoint": "https://acct.documents.azure.com:443/",
                "locations": [
                    {"locationName": "East US", "failoverPriority": 0, "isZoneRedundant": false},
                    {"locationName": "UK South", "failoverPriority": 1, "isZoneRedundant": false}
                ]
            }
        }"#;
        let dto: AccountDto = serde_json::from_str(body).unwrap();
        assert_eq!(dto.name, "acct");
        assert_eq!(dto.properties.locations.len(), 2);
        assert_eq!(
            dto.properties.document_endpoint.as_deref(),
            Some("https://acct.documents.azure.com:443/")
        );
    }

    #[test]
    fn test_list_response_parse() {
        let body = r#"{"value":[{"subscriptionId":"s1","displayName":"Dev","state":"Enabled"}],"nextLink":null}"#;
        let page: ListResponse<SubscriptionDto> = serde_json::from_str(body).unwrap();
        assert_eq!(page.value[0].subscription_id, "s1");
        assert!(page.next_link.is_none());
    }

    // ============ HTTP ============

    mod http {
        use super::*;
        use crate::test_support::{FakeArm, Reply, fast_poll};

        const ACCOUNT_PATH: &str =
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/acct";

        fn account_json() -> String {
            format!(
                r#"{{"id":"{}","name":"acct","kind":"GlobalDocumentDB",
                   "properties":{{"provisioningState":"Succeeded",
                   "documentEndpoint":"https://acct.documents.azure.com:443/",
                   "locations":[{{"locationName":"East US","failoverPriority":0}}]}}}}"#,
                ACCOUNT_PATH
            )
        }

        fn arm(fake: &FakeArm) -> ArmClient {
            ArmClient::new(fake.credential(), fast_poll()).with_endpoint(&fake.endpoint)
        }

        fn spec_named(name: &str) -> AccountSpec {
            AccountSpec {
                name: name.to_string(),
                ..spec()
            }
        }

        #[tokio::test]
        async fn test_list_keys_sends_empty_body_with_length() {
            let fake = FakeArm::start(|_, _, _| {
                Reply::json(
                    200,
                    r#"{"primaryMasterKey":"p","secondaryMasterKey":"s",
                       "primaryReadonlyMasterKey":"pr","secondaryReadonlyMasterKey":"sr"}"#,
                )
            })
            .await;

            let keys = arm(&fake).list_keys("sub", "rg", "acct").await.unwrap();
            assert_eq!(keys.primary_master_key, "p");

            let requests = fake.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].line(), format!("POST {}/listKeys", ACCOUNT_PATH));
            assert_eq!(requests[0].header("content-length"), Some("0"));
            assert_eq!(requests[0].header("authorization"), Some("Bearer test-token"));
        }

        #[tokio::test]
        async fn test_create_account_waits_for_async_operation() {
            let fake = FakeArm::start(|req, seen, base| match (req.method.as_str(), req.path.as_str()) {
                ("PUT", ACCOUNT_PATH) => Reply::json(201, &account_json())
                    .with_header("Azure-AsyncOperation", format!("{}/operations/create", base))
                    .with_header("Retry-After", "0"),
                ("GET", "/operations/create") if seen < 2 => {
                    Reply::json(200, r#"{"status":"InProgress"}"#)
                }
                ("GET", "/operations/create") => Reply::json(200, r#"{"status":"Succeeded"}"#),
                ("GET", ACCOUNT_PATH) => Reply::json(200, &account_json()),
                _ => Reply::empty(500),
            })
            .await;

            let account = arm(&fake)
                .create_or_update_account("sub", "rg", &spec_named("acct"))
                .await
                .unwrap();
            assert_eq!(account.name, "acct");
            assert_eq!(account.properties.provisioning_state.as_deref(), Some("Succeeded"));

            let put = format!("PUT {}", ACCOUNT_PATH);
            let get = format!("GET {}", ACCOUNT_PATH);
            assert_eq!(
                fake.lines(),
                vec![
                    put.as_str(),
                    "GET /operations/create",
                    "GET /operations/create",
                    "GET /operations/create",
                    get.as_str(),
                ]
            );

            let sent: Value = serde_json::from_str(&fake.requests()[0].body).unwrap();
            assert_eq!(sent["location"], "westus2");
        }

        #[tokio::test]
        async fn test_failed_operation_is_reported() {
            let fake = FakeArm::start(|req, _, base| match (req.method.as_str(), req.path.as_str()) {
                ("PATCH", ACCOUNT_PATH) => Reply::empty(202)
                    .with_header("Azure-AsyncOperation", format!("{}/operations/patch", base)),
                ("GET", "/operations/patch") => Reply::json(
                    200,
                    r#"{"status":"Failed","error":{"code":"BadRequest","message":"region unavailable"}}"#,
                ),
                _ => Reply::empty(500),
            })
            .await;

            let locations = LocationList::single(region("eastus"));
            let err = arm(&fake)
                .update_account_locations("sub", "rg", "acct", &locations)
                .await
                .unwrap_err();

            match err {
                AzureError::CloudError(CloudError::OperationFailed { message, .. }) => {
                    assert_eq!(message, "BadRequest: region unavailable")
                }
                other => panic!("Expected OperationFailed, got {:?}", other),
            }
            // no GET of the account after a failed operation
            assert_eq!(fake.lines().len(), 2);
        }

        #[tokio::test]
        async fn test_canceled_operation_is_reported() {
            let fake = FakeArm::start(|req, _, base| match req.method.as_str() {
                "PATCH" => Reply::empty(202)
                    .with_header("Azure-AsyncOperation", format!("{}/operations/patch", base)),
                _ => Reply::json(200, r#"{"status":"Canceled"}"#),
            })
            .await;

            let locations = LocationList::single(region("eastus"));
            let err = arm(&fake)
                .update_account_locations("sub", "rg", "acct", &locations)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                AzureError::CloudError(CloudError::OperationFailed { .. })
            ));
        }

        #[tokio::test]
        async fn test_delete_follows_location_header() {
            let fake = FakeArm::start(|req, seen, base| match (req.method.as_str(), req.path.as_str()) {
                ("DELETE", "/subscriptions/sub/resourcegroups/rg") => {
                    Reply::empty(202).with_header("Location", format!("{}/operations/delete", base))
                }
                ("GET", "/operations/delete") if seen == 0 => Reply::empty(202),
                ("GET", "/operations/delete") => Reply::empty(200),
                _ => Reply::empty(500),
            })
            .await;

            arm(&fake).delete_resource_group("sub", "rg").await.unwrap();
            assert_eq!(
                fake.lines(),
                vec![
                    "DELETE /subscriptions/sub/resourcegroups/rg",
                    "GET /operations/delete",
                    "GET /operations/delete",
                ]
            );
        }

        #[tokio::test]
        async fn test_delete_no_content_is_not_found() {
            let fake = FakeArm::start(|_, _, _| Reply::empty(204)).await;

            let err = arm(&fake).delete_account("sub", "rg", "acct").await.unwrap_err();
            assert!(matches!(err, AzureError::NotFound(_)));
        }

        #[tokio::test]
        async fn test_delete_missing_is_not_found() {
            let fake = FakeArm::start(|_, _, _| {
                Reply::json(
                    404,
                    r#"{"error":{"code":"ResourceGroupNotFound","message":"gone"}}"#,
                )
            })
            .await;

            let err = arm(&fake).delete_resource_group("sub", "rg").await.unwrap_err();
            assert!(matches!(err, AzureError::NotFound(_)));
        }

        #[tokio::test]
        async fn test_list_follows_next_link() {
            let fake = FakeArm::start(|req, _, base| match req.path.as_str() {
                "/subscriptions" => Reply::json(
                    200,
                    &format!(
                        r#"{{"value":[{{"subscriptionId":"s1"}}],"nextLink":"{}/page2"}}"#,
                        base
                    ),
                ),
                "/page2" => Reply::json(200, r#"{"value":[{"subscriptionId":"s2"}]}"#),
                _ => Reply::empty(500),
            })
            .await;

            let subscriptions = arm(&fake).list_subscriptions().await.unwrap();
            let ids: Vec<&str> = subscriptions
                .iter()
                .map(|s| s.subscription_id.as_str())
                .collect();
            assert_eq!(ids, vec!["s1", "s2"]);
        }
    }
}
