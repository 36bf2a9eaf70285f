pub mod credential;
pub mod imds;
pub mod monitor_client;

pub use credential::{
    CachingCredential, ClientSecretCredential, DEFAULT_AUTHORITY_HOST, ManagedIdentityCredential,
};
pub use imds::{DEFAULT_IMDS_ENDPOINT, ImdsClient, parse_compute_metadata};
pub use monitor_client::AzureMonitorClient;
