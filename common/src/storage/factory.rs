//! Storage factory for creating append stores from configuration.

use std::sync::Arc;

use object_store::ObjectStore;

use super::config::ObjectStoreConfig;
use super::in_memory::InMemoryAppendStore;
use super::object::ObjectAppendStore;
use super::{AppendStore, StorageError, StorageResult};

/// Creates an object store from configuration.
pub fn create_object_store(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(object_store::memory::InMemory::new())),
        ObjectStoreConfig::Aws(aws_config) => {
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_region(&aws_config.region)
                .with_bucket_name(&aws_config.bucket)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create AWS S3 store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
        ObjectStoreConfig::Azure(azure_config) => {
            let store = object_store::azure::MicrosoftAzureBuilder::from_env()
                .with_account(&azure_config.account)
                .with_container_name(&azure_config.container)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create Azure blob store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
        ObjectStoreConfig::Local(local_config) => {
            std::fs::create_dir_all(&local_config.path).map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local_config.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local_config.path)
                .map_err(|e| {
                StorageError::Storage(format!("Failed to create local filesystem store: {}", e))
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// Creates the append store the shipper writes through.
///
/// The in-memory configuration gets the native [`InMemoryAppendStore`];
/// every other backend is wrapped in an [`ObjectAppendStore`].
pub fn create_append_store(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn AppendStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(InMemoryAppendStore::new())),
        other => {
            let store = create_object_store(other)?;
            Ok(Arc::new(ObjectAppendStore::new(store)))
        }
    }
}
