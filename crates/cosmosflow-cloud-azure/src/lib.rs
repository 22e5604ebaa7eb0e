//! Azure provider for CosmosFlow
//!
//! Implements the `ManagementApi` and `DataPlane` traits for Azure Cosmos DB.
//!
//! # Features
//!
//! - Resource groups and database accounts via the Azure Resource Manager REST API
//! - Long-running operations followed through `Azure-AsyncOperation` / `Location`
//! - Databases and containers via the Cosmos DB SQL REST API (master-key auth)
//!
//! # Requirements
//!
//! - Either a service principal (`AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`,
//!   `AZURE_TENANT_ID`) or an `az login` session
//!
//! # Example
//!
//! ```ignore
//! use cosmosflow_cloud::ManagementApi;
//! use cosmosflow_cloud_azure::{AzureCredential, AzureProvider};
//!
//! let credential = AzureCredential::from_settings(None, None, None)?;
//! let provider = AzureProvider::new(credential, None);
//!
//! let auth = provider.authenticate().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let accounts = provider.list_accounts("my-rg").await?;
//! ```

pub mod arm;
pub mod credential;
pub mod data_plane;
pub mod error;
pub mod provider;

#[cfg(test)]
mod test_support;

pub use arm::ArmClient;
pub use credential::{AzureCliCredential, AzureCredential, ClientSecretCredential};
pub use data_plane::CosmosDataPlane;
pub use error::{AzureError, Result};
pub use provider::AzureProvider;
