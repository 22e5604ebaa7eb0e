pub mod accounts;
pub mod config;
pub mod run;

use cosmosflow_cloud_azure::{AzureCredential, AzureProvider};
use cosmosflow_config::Settings;
use std::path::Path;

/// 設定を読み込む (--config 指定時はそのファイル)
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

/// 設定からプロバイダーを組み立てる
pub fn build_provider(settings: &Settings) -> anyhow::Result<AzureProvider> {
    let credentials = &settings.credentials;
    let credential = AzureCredential::from_settings(
        credentials.client_id.as_deref(),
        credentials.client_secret.as_deref(),
        credentials.tenant_id.as_deref(),
    )?;
    tracing::debug!("Using {}", credential.describe());

    Ok(AzureProvider::with_poll_config(
        credential,
        settings.subscription_id.clone(),
        settings.poll.clone(),
    ))
}
