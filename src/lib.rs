//! Unified cloud storage facade.
//!
//! Re-exports the core crates and wires the provider adapters enabled by
//! Cargo features (`google-drive`, `onedrive`, `dropbox`). Host applications
//! depend on this crate instead of wiring each workspace crate individually:
//!
//! ```no_run
//! # async fn run(config: cloud_workspace::CoreConfig, credentials: cloud_workspace::ClientCredentials) -> cloud_workspace::CloudResult<()> {
//! use cloud_workspace::{auth_controller, storage_for, CloudPath, ProviderKind};
//!
//! let controller = auth_controller(&config, ProviderKind::Dropbox, &credentials)?;
//! if let Some(connection) = controller.connect(false).await?.into_connection() {
//!     let storage = storage_for(&config, connection)?;
//!     let files = storage.list(&CloudPath::root()).await?;
//!     println!("{} entries", files.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use core_auth::{
    AccountSummary, AuthError, AuthFlowController, ConnectOutcome, Connection, ProviderKind,
};
pub use core_cloud::{CloudError, CloudFile, CloudPath, CloudStorage, Result as CloudResult};
pub use core_runtime::{AccessLevel, ClientCredentials, CoreConfig, CoreConfigBuilder};

pub use core_auth;
pub use core_cloud;
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "dropbox")]
pub use provider_dropbox;
#[cfg(feature = "google-drive")]
pub use provider_google_drive;
#[cfg(feature = "onedrive")]
pub use provider_onedrive;

/// Sign-in controller for `provider`.
///
/// Fails with `Unsupported` when the provider's feature is disabled.
pub fn auth_controller(
    config: &CoreConfig,
    provider: ProviderKind,
    credentials: &ClientCredentials,
) -> CloudResult<AuthFlowController> {
    match provider {
        #[cfg(feature = "google-drive")]
        ProviderKind::GoogleDrive => Ok(
            provider_google_drive::GoogleDriveConnector::auth_controller(config, credentials),
        ),
        #[cfg(feature = "onedrive")]
        ProviderKind::OneDrive => Ok(provider_onedrive::OneDriveConnector::auth_controller(
            config,
            credentials,
        )),
        #[cfg(feature = "dropbox")]
        ProviderKind::Dropbox => Ok(provider_dropbox::DropboxConnector::auth_controller(
            config,
            credentials,
        )),
        #[allow(unreachable_patterns)]
        other => Err(disabled(other)),
    }
}

/// Storage adapter for an established connection.
pub fn storage_for(
    config: &CoreConfig,
    connection: Connection,
) -> CloudResult<Arc<dyn CloudStorage>> {
    match connection.provider() {
        #[cfg(feature = "google-drive")]
        ProviderKind::GoogleDrive => Ok(Arc::new(
            provider_google_drive::GoogleDriveConnector::from_connection(config, connection),
        )),
        #[cfg(feature = "onedrive")]
        ProviderKind::OneDrive => Ok(Arc::new(
            provider_onedrive::OneDriveConnector::from_connection(config, connection),
        )),
        #[cfg(feature = "dropbox")]
        ProviderKind::Dropbox => Ok(Arc::new(
            provider_dropbox::DropboxConnector::from_connection(config, connection),
        )),
        #[allow(unreachable_patterns)]
        other => Err(disabled(other)),
    }
}

#[allow(dead_code)]
fn disabled(provider: ProviderKind) -> CloudError {
    CloudError::Unsupported(format!(
        "{} support is not compiled in",
        provider.display_name()
    ))
}
