//! 実行設定
//!
//! 優先順位: 組み込みデフォルト < YAML ファイル < 環境変数 < CLI フラグ
//! (CLI フラグはバイナリ側でフィールドを上書きする)

use crate::error::{ConfigError, Result};
use cosmosflow_cloud::{
    AccountKind, AccountSpec, CloudError, ConsistencyLevel, ConsistencyPolicy, ContainerSpec,
    DatabaseSpec, LocationList, PollConfig, Region, WorkflowPlan, random_name,
    validate_account_name, validate_resource_group_name,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const RESOURCE_GROUP_PREFIX: &str = "CosmosDBTemplateRG";
pub const ACCOUNT_PREFIX: &str = "dbaccount";

const REDACTED: &str = "********";

/// サービスプリンシパル
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| REDACTED))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Resolved settings for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub credentials: Credentials,
    pub subscription_id: Option<String>,

    /// Resource group and write region
    pub region: String,
    /// Where the account resource itself lives (defaults to `region`)
    pub account_location: Option<String>,
    /// Regions added by the location patch, in failover order
    pub read_regions: Vec<String>,

    /// Fixed names instead of generated ones
    pub resource_group_name: Option<String>,
    pub account_name: Option<String>,

    pub account_kind: String,
    pub consistency: String,
    pub max_staleness_prefix: u64,
    pub max_interval_seconds: u32,
    pub allowed_ips: Vec<String>,
    pub virtual_network_filter: bool,
    pub automatic_failover: bool,
    pub tags: BTreeMap<String, String>,

    pub database_id: String,
    pub container_id: String,
    pub partition_key: String,
    pub throughput: u32,

    /// 長時間実行オペレーションの待機設定
    pub poll: PollConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            subscription_id: None,
            region: "eastus".to_string(),
            account_location: None,
            read_regions: vec![
                "eastasia".to_string(),
                "southeastasia".to_string(),
                "uksouth".to_string(),
            ],
            resource_group_name: None,
            account_name: None,
            account_kind: "document".to_string(),
            consistency: "bounded-staleness".to_string(),
            max_staleness_prefix: 300,
            max_interval_seconds: 1000,
            allowed_ips: Vec::new(),
            virtual_network_filter: false,
            automatic_failover: false,
            tags: BTreeMap::from([
                ("key1".to_string(), "value".to_string()),
                ("key2".to_string(), "value".to_string()),
            ]),
            database_id: "TestDB".to_string(),
            container_id: "TestCollection".to_string(),
            partition_key: "/partitionKey".to_string(),
            throughput: 4000,
            poll: PollConfig::default(),
        }
    }
}

/// 空文字は未設定として扱う
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    /// デフォルト → 設定ファイル → 環境変数 の順で読み込む
    pub fn load() -> Result<Self> {
        let mut settings = match crate::find_config_file()? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    /// Load an explicit file, then apply the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
        }
        let mut settings = Self::from_file(path)?;
        settings.apply_env()?;
        Ok(settings)
    }

    /// YAML ファイルを読み込む (未指定の項目はデフォルト値)
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// 環境変数で上書きする
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value(&["AZURE_CLIENT_ID", "CLIENT_ID"]) {
            self.credentials.client_id = Some(v);
        }
        if let Some(v) = env_value(&["AZURE_CLIENT_SECRET", "CLIENT_SECRET"]) {
            self.credentials.client_secret = Some(v);
        }
        if let Some(v) = env_value(&["AZURE_TENANT_ID", "TENANT_ID"]) {
            self.credentials.tenant_id = Some(v);
        }
        if let Some(v) = env_value(&["AZURE_SUBSCRIPTION_ID", "SUBSCRIPTION_ID"]) {
            self.subscription_id = Some(v);
        }
        if let Some(v) = env_value(&["COSMOSFLOW_REGION"]) {
            self.region = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_ACCOUNT_LOCATION"]) {
            self.account_location = Some(v);
        }
        if let Some(v) = env_value(&["COSMOSFLOW_READ_REGIONS"]) {
            self.read_regions = split_list(&v);
        }
        if let Some(v) = env_value(&["COSMOSFLOW_DATABASE_ID"]) {
            self.database_id = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_CONTAINER_ID"]) {
            self.container_id = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_PARTITION_KEY"]) {
            self.partition_key = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_THROUGHPUT"]) {
            self.throughput = v.parse().map_err(|_| {
                ConfigError::invalid("COSMOSFLOW_THROUGHPUT", format!("'{}' is not a number", v))
            })?;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_ALLOWED_IP"]) {
            self.allowed_ips = split_list(&v);
        }
        if let Some(v) = env_value(&["COSMOSFLOW_CONSISTENCY"]) {
            self.consistency = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_ACCOUNT_KIND"]) {
            self.account_kind = v;
        }
        if let Some(v) = env_value(&["COSMOSFLOW_MAX_WAIT_SECS"]) {
            self.poll.max_wait_secs = v.parse().map_err(|_| {
                ConfigError::invalid("COSMOSFLOW_MAX_WAIT_SECS", format!("'{}' is not a number", v))
            })?;
        }
        Ok(())
    }

    pub fn consistency_policy(&self) -> Result<ConsistencyPolicy> {
        let level: ConsistencyLevel = self
            .consistency
            .parse()
            .map_err(|e: CloudError| ConfigError::invalid("consistency", e.to_string()))?;
        let policy = match level {
            ConsistencyLevel::BoundedStaleness => ConsistencyPolicy::bounded_staleness(
                self.max_staleness_prefix,
                self.max_interval_seconds,
            ),
            other => ConsistencyPolicy::new(other),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn account_kind(&self) -> Result<AccountKind> {
        self.account_kind
            .parse()
            .map_err(|e: CloudError| ConfigError::invalid("account_kind", e.to_string()))
    }

    /// 書き込みリージョン + 読み取りリージョン
    pub fn replica_locations(&self) -> Result<LocationList> {
        let write = Region::new(&self.region)?;
        let reads = self
            .read_regions
            .iter()
            .map(|r| Region::new(r))
            .collect::<cosmosflow_cloud::Result<Vec<_>>>()?;
        Ok(LocationList::with_read_regions(write, reads)?)
    }

    /// Validate everything and build the plan for one run
    ///
    /// Resource group and account names get a fresh random suffix unless
    /// fixed names are configured.
    pub fn workflow_plan(&self) -> Result<WorkflowPlan> {
        let write = Region::new(&self.region)?;
        let account_location = match &self.account_location {
            Some(location) => Region::new(location)?,
            None => write.clone(),
        };
        let replica_locations = self.replica_locations()?;

        let database = DatabaseSpec {
            id: self.database_id.clone(),
        };
        database.validate()?;

        let container = ContainerSpec {
            id: self.container_id.clone(),
            partition_key_path: self.partition_key.clone(),
            throughput: self.throughput,
        };
        container.validate()?;

        if self.poll.max_wait_secs == 0 {
            return Err(ConfigError::invalid("poll.max_wait_secs", "must be greater than zero"));
        }

        let resource_group_name = self
            .resource_group_name
            .clone()
            .unwrap_or_else(|| random_name(RESOURCE_GROUP_PREFIX));
        validate_resource_group_name(&resource_group_name)?;

        let account_name = self
            .account_name
            .clone()
            .unwrap_or_else(|| random_name(ACCOUNT_PREFIX));
        validate_account_name(&account_name)?;

        let account = AccountSpec {
            name: account_name,
            location: account_location,
            kind: self.account_kind()?,
            consistency: self.consistency_policy()?,
            locations: LocationList::single(write.clone()),
            ip_rules: self.allowed_ips.clone(),
            virtual_network_filter: self.virtual_network_filter,
            automatic_failover: self.automatic_failover,
            tags: self.tags.clone(),
        };

        Ok(WorkflowPlan {
            resource_group_name,
            resource_group_region: write,
            account,
            replica_locations,
            database,
            container,
        })
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.credentials.client_secret.is_some() {
            copy.credentials.client_secret = Some(REDACTED.to_string());
        }
        copy
    }

    /// YAML rendering with secrets masked
    pub fn to_redacted_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.redacted()).map_err(|source| ConfigError::Yaml {
            path: "<settings>".into(),
            source,
        })
    }
}
