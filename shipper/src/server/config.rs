//! Command-line and environment configuration for the `logship` binary.

use std::time::Duration;

use clap::Parser;
use common::ObjectStoreConfig;
use common::storage::config::{
    AwsObjectStoreConfig, AzureObjectStoreConfig, LocalObjectStoreConfig,
};

use crate::config::{Config, DEFAULT_MAX_PENDING_BLOCKS, DEFAULT_NAME_TEMPLATE, site_template};

/// CLI arguments for the log shipper.
///
/// Every flag can also be set through the `LOGSHIP_*` environment variable
/// named next to it in `--help`.
#[derive(Debug, Parser)]
#[command(name = "logship")]
#[command(about = "Ship log lines to append-only object storage")]
pub struct CliArgs {
    /// HTTP server port.
    #[arg(long, env = "LOGSHIP_PORT", default_value = "8080")]
    pub port: u16,

    /// Storage directory path (for local storage).
    #[arg(long, env = "LOGSHIP_DATA_DIR", default_value = ".data")]
    pub data_dir: String,

    /// Use in-memory storage (for testing).
    #[arg(long, env = "LOGSHIP_IN_MEMORY", default_value = "false")]
    pub in_memory: bool,

    /// S3 bucket name (enables S3 storage when set).
    #[arg(long, env = "LOGSHIP_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// AWS region for S3 storage.
    #[arg(long, env = "LOGSHIP_S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// Azure storage account (enables Azure storage together with the
    /// container).
    #[arg(long, env = "LOGSHIP_AZURE_ACCOUNT")]
    pub azure_account: Option<String>,

    /// Azure blob container.
    #[arg(long, env = "LOGSHIP_AZURE_CONTAINER")]
    pub azure_container: Option<String>,

    /// Object name template; overrides the site-based default.
    #[arg(long, env = "LOGSHIP_NAME_TEMPLATE")]
    pub name_template: Option<String>,

    /// Site name used as the top-level directory of the default template.
    #[arg(long, env = "LOGSHIP_SITE_NAME")]
    pub site_name: Option<String>,

    /// Days to keep log objects (0 or unset keeps them forever).
    #[arg(long, env = "LOGSHIP_RETENTION_DAYS")]
    pub retention_days: Option<u32>,

    /// Seconds between idle flushes.
    #[arg(long, env = "LOGSHIP_FLUSH_INTERVAL_SECS", default_value = "300")]
    pub flush_interval_secs: u64,

    /// Undelivered full blocks kept while the store rejects appends.
    #[arg(long, env = "LOGSHIP_MAX_PENDING_BLOCKS", default_value_t = DEFAULT_MAX_PENDING_BLOCKS)]
    pub max_pending_blocks: usize,

    /// Maximum number of records written per batch.
    #[arg(long, env = "LOGSHIP_MAX_BATCH_RECORDS")]
    pub max_batch_records: Option<usize>,

    /// Ship lines read from standard input.
    #[arg(long, env = "LOGSHIP_STDIN", default_value = "false")]
    pub stdin: bool,

    /// Log every batch, block and rotation at debug level.
    #[arg(long, env = "LOGSHIP_TRACE", default_value = "false")]
    pub trace: bool,
}

impl CliArgs {
    /// The name template to use, honoring the site name when no explicit
    /// template is given.
    pub fn name_template(&self) -> String {
        match (&self.name_template, &self.site_name) {
            (Some(template), _) => template.clone(),
            (None, Some(site)) if !site.is_empty() => site_template(site),
            (None, _) => DEFAULT_NAME_TEMPLATE.to_string(),
        }
    }

    pub fn object_store(&self) -> ObjectStoreConfig {
        if self.in_memory {
            ObjectStoreConfig::InMemory
        } else if let Some(bucket) = &self.s3_bucket {
            ObjectStoreConfig::Aws(AwsObjectStoreConfig {
                region: self.s3_region.clone(),
                bucket: bucket.clone(),
            })
        } else if let (Some(account), Some(container)) =
            (&self.azure_account, &self.azure_container)
        {
            ObjectStoreConfig::Azure(AzureObjectStoreConfig {
                account: account.clone(),
                container: container.clone(),
            })
        } else {
            ObjectStoreConfig::Local(LocalObjectStoreConfig {
                path: self.data_dir.clone(),
            })
        }
    }

    /// Convert CLI args to shipper configuration.
    pub fn to_config(&self) -> Config {
        Config {
            storage: self.object_store(),
            name_template: self.name_template(),
            retention_days: self.retention_days,
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            max_pending_blocks: self.max_pending_blocks,
            max_batch_records: self.max_batch_records,
            trace: self.trace,
            ..Default::default()
        }
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl From<&CliArgs> for ServerConfig {
    fn from(args: &CliArgs) -> Self {
        Self { port: args.port }
    }
}
