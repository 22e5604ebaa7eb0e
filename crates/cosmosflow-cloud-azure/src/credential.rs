//! Credential acquisition for Azure Resource Manager
//!
//! Two sources are supported: a service principal (client id, secret and
//! tenant, OAuth2 client-credentials grant) and the ambient `az` CLI login.

use crate::error::{AzureError, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self) -> bool {
        self.expires_at - Duration::minutes(REFRESH_MARGIN_MINUTES) > Utc::now()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Service principal credential (client-credentials grant)
pub struct ClientSecretCredential {
    client: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    cache: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: AUTHORITY_HOST.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Override the authority host (sovereign clouds)
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }

    pub async fn get_token(&self) -> Result<AccessToken> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.clone());
        }

        tracing::debug!("Requesting token for client {}", self.client_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", MANAGEMENT_SCOPE),
        ];
        let response = self
            .client
            .post(self.token_url())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            return Err(AzureError::TokenRequest(format!(
                "{} {}: {}",
                status, body.error, body.error_description
            )));
        }

        let body: TokenResponse = response.json().await?;
        let token = AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        };
        *cache = Some(token.clone());
        Ok(token)
    }
}

/// Token obtained from `az account get-access-token`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
    #[serde(default)]
    subscription: Option<String>,
}

/// Parse the JSON printed by `az account get-access-token`
fn parse_cli_token(output: &str) -> Result<(AccessToken, Option<String>)> {
    let raw: CliToken = serde_json::from_str(output)?;

    let expires_at = match (raw.expires_on_epoch, raw.expires_on.as_deref()) {
        (Some(epoch), _) => Utc.timestamp_opt(epoch, 0).single(),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc)),
        (None, None) => None,
    }
    .ok_or_else(|| AzureError::UnexpectedResponse("az token has no usable expiry".to_string()))?;

    Ok((
        AccessToken {
            token: raw.access_token,
            expires_at,
        },
        raw.subscription,
    ))
}

/// Ambient credential from the Azure CLI login
pub struct AzureCliCredential {
    cache: Mutex<Option<(AccessToken, Option<String>)>>,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    async fn run_az(&self) -> Result<String> {
        let args = [
            "account",
            "get-access-token",
            "--resource",
            MANAGEMENT_RESOURCE,
            "--output",
            "json",
        ];
        tracing::debug!("Running: az {}", args.join(" "));

        let output = Command::new("az")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AzureError::AzCliNotFound,
                _ => AzureError::IoError(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Token plus the subscription the CLI is logged into
    pub async fn get_token(&self) -> Result<(AccessToken, Option<String>)> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref().filter(|(t, _)| t.is_fresh()) {
            return Ok(entry.clone());
        }

        let output = self.run_az().await?;
        let entry = parse_cli_token(&output)?;
        *cache = Some(entry.clone());
        Ok(entry)
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

/// Credential selected from configuration
pub enum AzureCredential {
    ClientSecret(ClientSecretCredential),
    Cli(AzureCliCredential),
}

impl AzureCredential {
    /// Service principal when all three settings are present, CLI when none are
    ///
    /// A partial service principal is rejected rather than silently falling
    /// back to a different identity.
    pub fn from_settings(
        client_id: Option<&str>,
        client_secret: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.filter(|s| !s.trim().is_empty())
        }

        match (
            present(client_id),
            present(client_secret),
            present(tenant_id),
        ) {
            (Some(id), Some(secret), Some(tenant)) => Ok(AzureCredential::ClientSecret(
                ClientSecretCredential::new(tenant, id, secret),
            )),
            (None, None, None) => Ok(AzureCredential::Cli(AzureCliCredential::new())),
            (id, secret, tenant) => {
                let missing: Vec<&str> = [
                    ("client id", id),
                    ("client secret", secret),
                    ("tenant id", tenant),
                ]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(AzureError::MissingCredential(missing.join(", ")))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AzureCredential::ClientSecret(c) => format!("service principal {}", c.client_id()),
            AzureCredential::Cli(_) => "az CLI login".to_string(),
        }
    }

    pub async fn bearer_token(&self) -> Result<String> {
        match self {
            AzureCredential::ClientSecret(c) => Ok(c.get_token().await?.token),
            AzureCredential::Cli(c) => Ok(c.get_token().await?.0.token),
        }
    }

    /// Subscription implied by the credential, if any
    pub async fn default_subscription(&self) -> Option<String> {
        match self {
            AzureCredential::ClientSecret(_) => None,
            AzureCredential::Cli(c) => c.get_token().await.ok().and_then(|(_, sub)| sub),
        }
    }
}
