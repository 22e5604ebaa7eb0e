//! Cosmos DB SQL REST data plane
//!
//! Requests are signed with the account master key:
//! `HMAC-SHA256(verb \n resourceType \n resourceLink \n date \n \n)`.

use crate::error::{AzureError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use cosmosflow_cloud::{ContainerSpec, DataPlane, DataPlaneConnection, DatabaseSpec};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;

pub const API_VERSION: &str = "2018-12-31";

/// Characters left alone by `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// RFC 1123 date as expected by `x-ms-date`
pub fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build the `authorization` header value for a master-key request
pub fn master_key_authorization(
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
    key: &str,
) -> Result<String> {
    let key_bytes = STANDARD
        .decode(key.trim())
        .map_err(|e| AzureError::InvalidKey(e.to_string()))?;
    if key_bytes.is_empty() {
        return Err(AzureError::InvalidKey("key is empty".to_string()));
    }

    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
        .map_err(|e| AzureError::InvalidKey(e.to_string()))?;
    mac.update(payload.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={}", signature);
    Ok(utf8_percent_encode(&token, URI_COMPONENT).to_string())
}

#[derive(Debug, Default, Deserialize)]
struct CosmosErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Data-plane client for SQL API accounts
pub struct CosmosDataPlane {
    client: reqwest::Client,
}

impl CosmosDataPlane {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST a new resource under `resource_link`
    async fn create(
        &self,
        connection: &DataPlaneConnection,
        resource_type: &str,
        resource_link: &str,
        body: &Value,
        extra_headers: &[(&str, String)],
    ) -> Result<()> {
        let path = if resource_link.is_empty() {
            resource_type.to_string()
        } else {
            format!("{}/{}", resource_link, resource_type)
        };
        let url = format!("{}/{}", connection.endpoint.trim_end_matches('/'), path);

        let date = rfc1123_now();
        let authorization =
            master_key_authorization("POST", resource_type, resource_link, &date, &connection.key)?;

        tracing::debug!("Cosmos POST {}", url);
        let mut request = self
            .client
            .post(&url)
            .header("authorization", authorization)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .json(body);
        for (name, value) in extra_headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: CosmosErrorBody = response.json().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => AzureError::Conflict(format!("{} {}", path, body.message)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AzureError::Unauthorized {
                status: status.as_u16(),
                message: body.message,
            },
            StatusCode::NOT_FOUND => AzureError::NotFound(resource_link.to_string()),
            _ => AzureError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            },
        })
    }
}

impl Default for CosmosDataPlane {
    fn default() -> Self {
        Self::new()
    }
}

/// Request body for a container with a hash partition key
pub fn container_body(container: &ContainerSpec) -> Value {
    json!({
        "id": container.id,
        "partitionKey": {
            "paths": [container.partition_key_path],
            "kind": "Hash",
            "version": 2,
        }
    })
}

#[async_trait]
impl DataPlane for CosmosDataPlane {
    async fn create_database(
        &self,
        connection: &DataPlaneConnection,
        database: &DatabaseSpec,
    ) -> cosmosflow_cloud::Result<()> {
        database.validate()?;
        tracing::info!("Creating database {}", database.id);
        let body = json!({ "id": database.id });
        self.create(connection, "dbs", "", &body, &[]).await?;
        tracing::info!("Created database {}", database.id);
        Ok(())
    }

    async fn create_container(
        &self,
        connection: &DataPlaneConnection,
        database: &DatabaseSpec,
        container: &ContainerSpec,
    ) -> cosmosflow_cloud::Result<()> {
        database.validate()?;
        container.validate()?;
        tracing::info!(
            "Creating container {} (partition key {}, {} RU/s)",
            container.id,
            container.partition_key_path,
            container.throughput
        );
        let link = format!("dbs/{}", database.id);
        let headers = [("x-ms-offer-throughput", container.throughput.to_string())];
        self.create(connection, "colls", &link, &container_body(container), &headers)
            .await?;
        tracing::info!("Created container {}", container.id);
        Ok(())
    }
}
