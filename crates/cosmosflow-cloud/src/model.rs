//! Resource model shared by all providers
//!
//! These are handles to remote resources and the value objects sent when
//! creating or updating them. Nothing here talks to the network.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Provider region name, normalised to the ARM form (`"East US"` -> `"eastus"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    pub fn new(name: &str) -> Result<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if normalized.is_empty() {
            return Err(CloudError::InvalidConfig("region name is empty".to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Region {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        Region::new(s)
    }
}

impl TryFrom<String> for Region {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        Region::new(&value)
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.0
    }
}

/// Replication consistency level of a database account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    Eventual,
    ConsistentPrefix,
}

impl ConsistencyLevel {
    /// Name used on the wire by the management API
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::Eventual => "Eventual",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "strong" => Ok(ConsistencyLevel::Strong),
            "boundedstaleness" => Ok(ConsistencyLevel::BoundedStaleness),
            "session" => Ok(ConsistencyLevel::Session),
            "eventual" => Ok(ConsistencyLevel::Eventual),
            "consistentprefix" => Ok(ConsistencyLevel::ConsistentPrefix),
            _ => Err(CloudError::InvalidConfig(format!(
                "unknown consistency level: {}",
                s
            ))),
        }
    }
}

const MAX_STALENESS_PREFIX: u64 = 2_147_483_647;
const MIN_INTERVAL_SECONDS: u32 = 5;
const MAX_INTERVAL_SECONDS: u32 = 86_400;

/// Consistency policy set when the account is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyPolicy {
    pub level: ConsistencyLevel,

    /// Maximum lag in operations (bounded staleness only)
    pub max_staleness_prefix: u64,

    /// Maximum lag in seconds (bounded staleness only)
    pub max_interval_seconds: u32,
}

impl ConsistencyPolicy {
    pub fn new(level: ConsistencyLevel) -> Self {
        Self {
            level,
            max_staleness_prefix: 100,
            max_interval_seconds: 5,
        }
    }

    pub fn bounded_staleness(max_staleness_prefix: u64, max_interval_seconds: u32) -> Self {
        Self {
            level: ConsistencyLevel::BoundedStaleness,
            max_staleness_prefix,
            max_interval_seconds,
        }
    }

    /// Check the staleness bounds accepted by the provider
    pub fn validate(&self) -> Result<()> {
        if self.level != ConsistencyLevel::BoundedStaleness {
            return Ok(());
        }
        if !(1..=MAX_STALENESS_PREFIX).contains(&self.max_staleness_prefix) {
            return Err(CloudError::InvalidConfig(format!(
                "max staleness prefix must be between 1 and {}, got {}",
                MAX_STALENESS_PREFIX, self.max_staleness_prefix
            )));
        }
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&self.max_interval_seconds) {
            return Err(CloudError::InvalidConfig(format!(
                "max staleness interval must be between {} and {} seconds, got {}",
                MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS, self.max_interval_seconds
            )));
        }
        Ok(())
    }
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self::bounded_staleness(300, 1000)
    }
}

/// One replica region and its failover rank (0 = write region)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLocation {
    pub region: Region,
    pub failover_priority: u32,
}

impl RegionLocation {
    pub fn new(region: Region, failover_priority: u32) -> Self {
        Self {
            region,
            failover_priority,
        }
    }
}

/// Validated replica list
///
/// Exactly one entry has priority 0 and the priorities form `0..N-1`
/// without gaps or duplicates. Each region appears once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationList(Vec<RegionLocation>);

impl LocationList {
    pub fn new(mut locations: Vec<RegionLocation>) -> Result<Self> {
        if locations.is_empty() {
            return Err(CloudError::InvalidLocations(
                "at least one region is required".to_string(),
            ));
        }

        let writers = locations
            .iter()
            .filter(|l| l.failover_priority == 0)
            .count();
        if writers != 1 {
            return Err(CloudError::InvalidLocations(format!(
                "exactly one region must have failover priority 0, found {}",
                writers
            )));
        }

        let mut regions = HashSet::new();
        for location in &locations {
            if !regions.insert(location.region.as_str()) {
                return Err(CloudError::InvalidLocations(format!(
                    "region {} is listed more than once",
                    location.region
                )));
            }
        }

        locations.sort_by_key(|l| l.failover_priority);
        for (expected, location) in locations.iter().enumerate() {
            let expected = expected as u32;
            if location.failover_priority != expected {
                let reason = if location.failover_priority < expected {
                    "duplicate"
                } else {
                    "gap before"
                };
                return Err(CloudError::InvalidLocations(format!(
                    "{} failover priority {} (region {})",
                    reason, location.failover_priority, location.region
                )));
            }
        }

        Ok(Self(locations))
    }

    /// Single write region
    pub fn single(region: Region) -> Self {
        Self(vec![RegionLocation::new(region, 0)])
    }

    /// Write region followed by read regions in failover order
    pub fn with_read_regions(write: Region, reads: impl IntoIterator<Item = Region>) -> Result<Self> {
        let locations = std::iter::once(write)
            .chain(reads)
            .enumerate()
            .map(|(priority, region)| RegionLocation::new(region, priority as u32))
            .collect();
        Self::new(locations)
    }

    /// Region with failover priority 0
    pub fn write_region(&self) -> &Region {
        // Construction guarantees a non-empty list sorted by priority
        &self.0[0].region
    }

    /// Append regions after the current lowest priority; already listed regions are ignored
    pub fn extended(&self, additional: impl IntoIterator<Item = Region>) -> Self {
        let mut locations = self.0.clone();
        for region in additional {
            if locations.iter().any(|l| l.region == region) {
                continue;
            }
            let priority = locations.len() as u32;
            locations.push(RegionLocation::new(region, priority));
        }
        Self(locations)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionLocation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn regions(&self) -> Vec<&Region> {
        self.0.iter().map(|l| &l.region).collect()
    }
}

impl<'de> Deserialize<'de> for LocationList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let locations = Vec::<RegionLocation>::deserialize(deserializer)?;
        LocationList::new(locations).map_err(serde::de::Error::custom)
    }
}

/// API surface of a database account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    /// Document (SQL) API
    GlobalDocumentDB,
    /// Mongo-compatible API
    MongoDB,
}

impl AccountKind {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            AccountKind::GlobalDocumentDB => "GlobalDocumentDB",
            AccountKind::MongoDB => "MongoDB",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for AccountKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "globaldocumentdb" | "sql" => Ok(AccountKind::GlobalDocumentDB),
            "mongo" | "mongodb" => Ok(AccountKind::MongoDB),
            _ => Err(CloudError::InvalidConfig(format!("unknown account kind: {}", s))),
        }
    }
}

/// Everything needed to create a database account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSpec {
    pub name: String,

    /// Region the account resource itself is placed in
    pub location: Region,

    pub kind: AccountKind,
    pub consistency: ConsistencyPolicy,

    /// Initial replica list (normally the write region only)
    pub locations: LocationList,

    /// IP addresses or CIDR ranges allowed to reach the account
    pub ip_rules: Vec<String>,

    pub virtual_network_filter: bool,
    pub automatic_failover: bool,
    pub tags: BTreeMap<String, String>,
}

/// Subscription the workflow provisions into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub display_name: Option<String>,
}

/// Handle to a created resource group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupHandle {
    pub id: String,
    pub name: String,
    pub region: Region,
}

/// Handle to a created database account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountHandle {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub kind: AccountKind,

    /// Data-plane endpoint assigned by the provider
    pub document_endpoint: Option<String>,

    /// Replica regions as reported by the provider
    pub locations: Vec<RegionLocation>,

    pub provisioning_state: Option<String>,
}

impl AccountHandle {
    /// Current write region, if the provider reported one
    pub fn write_region(&self) -> Option<&Region> {
        self.locations
            .iter()
            .find(|l| l.failover_priority == 0)
            .map(|l| &l.region)
    }
}

/// Master and read-only keys of an account
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessKeys {
    pub primary_master_key: String,
    pub secondary_master_key: String,
    pub primary_readonly_master_key: String,
    pub secondary_readonly_master_key: String,
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys")
            .field("primary_master_key", &"<redacted>")
            .field("secondary_master_key", &"<redacted>")
            .field("primary_readonly_master_key", &"<redacted>")
            .field("secondary_readonly_master_key", &"<redacted>")
            .finish()
    }
}

/// Logical database to create on the data plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub id: String,
}

impl DatabaseSpec {
    pub fn validate(&self) -> Result<()> {
        validate_resource_id("database id", &self.id)
    }
}

/// Container to create inside the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub id: String,
    pub partition_key_path: String,

    /// Provisioned request units per second
    pub throughput: u32,
}

impl ContainerSpec {
    pub fn validate(&self) -> Result<()> {
        validate_resource_id("container id", &self.id)?;
        if !self.partition_key_path.starts_with('/') || self.partition_key_path.len() < 2 {
            return Err(CloudError::InvalidConfig(format!(
                "partition key path must look like '/field', got '{}'",
                self.partition_key_path
            )));
        }
        if self.throughput < 400 || self.throughput % 100 != 0 {
            return Err(CloudError::InvalidConfig(format!(
                "throughput must be at least 400 in steps of 100, got {}",
                self.throughput
            )));
        }
        Ok(())
    }
}

/// Resource group names: 1-90 of letters, digits, `_`, `-`, `.`, `(`, `)`; no trailing `.`
pub fn validate_resource_group_name(name: &str) -> Result<()> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '(' | ')');
    if name.is_empty() || name.chars().count() > 90 || !name.chars().all(allowed) || name.ends_with('.')
    {
        return Err(CloudError::InvalidConfig(format!(
            "invalid resource group name '{}': use 1-90 letters, digits, '_', '-', '.', '(' or ')' and do not end with '.'",
            name
        )));
    }
    Ok(())
}

/// Account names: 3-44 of lowercase letters, digits and `-`; no leading or trailing `-`
pub fn validate_account_name(name: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    if !(3..=44).contains(&name.len())
        || !name.chars().all(allowed)
        || name.starts_with('-')
        || name.ends_with('-')
    {
        return Err(CloudError::InvalidConfig(format!(
            "invalid account name '{}': use 3-44 lowercase letters, digits or '-'",
            name
        )));
    }
    Ok(())
}

/// Database and container ids end up in request paths and signed links
fn validate_resource_id(what: &str, id: &str) -> Result<()> {
    let forbidden = |c: char| matches!(c, '/' | '\\' | '?' | '#') || c.is_control();
    if id.trim().is_empty() || id.chars().count() > 255 || id.chars().any(forbidden) || id.ends_with(' ')
    {
        return Err(CloudError::InvalidConfig(format!(
            "invalid {} '{}': 1-255 characters without '/', '\\', '?', '#' or a trailing space",
            what, id
        )));
    }
    Ok(())
}

/// Generate a per-run resource name: `prefix` followed by 8 hex characters
pub fn random_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..8])
}
