//! Serializable configuration for the remote object store.

use serde::{Deserialize, Serialize};

/// Where the shipped objects live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    /// Process-local store, lost on exit. Useful for tests and dry runs.
    #[default]
    InMemory,

    /// A directory on the local filesystem.
    Local(LocalObjectStoreConfig),

    /// An Amazon S3 bucket. Credentials are read from the environment.
    Aws(AwsObjectStoreConfig),

    /// An Azure Blob Storage container. Credentials are read from the
    /// environment.
    Azure(AzureObjectStoreConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectStoreConfig {
    /// Root directory; created if missing.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsObjectStoreConfig {
    pub region: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureObjectStoreConfig {
    /// Storage account name.
    pub account: String,
    pub container: String,
}
