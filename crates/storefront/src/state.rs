//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use valfinds_core::Email;

use crate::catalog::{
    BlobStore, CatalogError, CatalogService, CatalogStore, CloudStorageBlobs, FirestoreCatalog,
};
use crate::config::StorefrontConfig;
use crate::db::{CartStorage, FileCartStorage, PersistenceError};
use crate::identity::{FirebaseIdentity, IdentityError, IdentityProvider, TokenSource};
use crate::services::auth::AuthContext;
use crate::services::cart::CartContext;
use crate::services::checkout::CheckoutConfig;

/// Error connecting the storefront to its backing services.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("identity provider: {0}")]
    Identity(#[from] IdentityError),
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("cart storage: {0}")]
    Persistence(#[from] PersistenceError),
}

/// External services the storefront talks to.
pub struct Ports {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn CatalogStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub carts: Arc<dyn CartStorage>,
}

/// Tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub admin_email: Email,
    pub reconcile_interval: Duration,
    pub checkout: CheckoutConfig,
}

impl From<&StorefrontConfig> for Settings {
    fn from(config: &StorefrontConfig) -> Self {
        Self {
            admin_email: config.admin_email.clone(),
            reconcile_interval: config.reconcile_interval,
            checkout: config.checkout.clone(),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It holds the single auth and
/// cart context of this device.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    auth: AuthContext,
    cart: CartContext,
    catalog: CatalogService,
    checkout: CheckoutConfig,
}

impl AppState {
    /// Wire the contexts over the given ports.
    ///
    /// Starts the cart's reconciliation worker, so it must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn new(ports: Ports, settings: Settings) -> Self {
        let auth = AuthContext::new(ports.identity, settings.admin_email);
        let cart = CartContext::start(
            auth.subscribe(),
            Arc::clone(&ports.catalog),
            ports.carts,
            settings.reconcile_interval,
        );
        let catalog = CatalogService::new(ports.catalog, ports.blobs);

        Self {
            inner: Arc::new(AppStateInner {
                auth,
                cart,
                catalog,
                checkout: settings.checkout,
            }),
        }
    }

    /// Connect to Firebase and the local data directory.
    ///
    /// Restores a persisted session before the cart starts, so a returning
    /// user's cart is loaded immediately.
    ///
    /// # Errors
    ///
    /// Returns `StartupError` if a client cannot be built or the data
    /// directory is unusable.
    pub async fn connect(config: &StorefrontConfig) -> Result<Self, StartupError> {
        let identity = FirebaseIdentity::restore(&config.firebase, &config.data_dir).await?;
        let tokens: Arc<dyn TokenSource> = Arc::new(identity.clone());

        let ports = Ports {
            identity: Arc::new(identity),
            catalog: Arc::new(FirestoreCatalog::new(&config.firebase, Arc::clone(&tokens))?),
            blobs: Arc::new(CloudStorageBlobs::new(&config.firebase, tokens)?),
            carts: Arc::new(FileCartStorage::new(&config.data_dir)?),
        };

        Ok(Self::new(ports, Settings::from(config)))
    }

    /// Get a reference to the auth context.
    #[must_use]
    pub fn auth(&self) -> &AuthContext {
        &self.inner.auth
    }

    /// Get a reference to the cart context.
    #[must_use]
    pub fn cart(&self) -> &CartContext {
        &self.inner.cart
    }

    /// Get a reference to the catalog service.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Get a reference to the checkout configuration.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutConfig {
        &self.inner.checkout
    }
}
