//! In-memory implementations of the external service ports.
//!
//! Compiled for unit tests and behind the `test-support` feature so the
//! integration tests crate can build a full router without Firebase.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use valfinds_core::{Email, ProductId, UserId};

use crate::catalog::{BlobRef, BlobStore, CatalogError, CatalogStore, NewProduct, Product};
use crate::identity::{
    IdentityError, IdentityProvider, ProviderCode, Session, SessionBroadcaster,
    SessionSubscription, TokenSource,
};

const BLOB_BASE_URL: &str = "https://blobs.test/o/";

/// Minimum password length accepted by [`InMemoryIdentity::create_account`].
const MIN_PASSWORD_LENGTH: usize = 6;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    password: String,
}

/// Identity provider backed by a map of accounts.
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    sessions: SessionBroadcaster,
    next_failure: Mutex<Option<ProviderCode>>,
    resets: Mutex<Vec<String>>,
    next_uid: AtomicUsize,
}

impl InMemoryIdentity {
    /// Register an account.
    #[must_use]
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.insert_account(email, password);
        self
    }

    fn insert_account(&self, email: &str, password: &str) -> UserId {
        let n = self.next_uid.fetch_add(1, Ordering::Relaxed) + 1;
        let uid = UserId::new(format!("uid-{n}"));
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        uid
    }

    /// Make the next provider call fail with `code`.
    pub fn fail_next(&self, code: ProviderCode) {
        *lock(&self.next_failure) = Some(code);
    }

    /// End the session as if it expired elsewhere.
    pub fn expire_session(&self) {
        self.sessions.publish(None);
    }

    /// Replace the session with `email`'s account, as if it signed in
    /// elsewhere. Returns `None` if no such account exists.
    pub fn switch_to(&self, email: &str) -> Option<Session> {
        let account = lock(&self.accounts).get(email).cloned()?;
        self.start_session(account.uid, email).ok()
    }

    /// Emails that password resets were sent to, in order.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        lock(&self.resets).clone()
    }

    fn take_failure(&self) -> Result<(), IdentityError> {
        lock(&self.next_failure)
            .take()
            .map_or(Ok(()), |code| Err(IdentityError::Rejected(code)))
    }

    fn start_session(&self, uid: UserId, email: &str) -> Result<Session, IdentityError> {
        let email = Email::parse(email)
            .map_err(|_| IdentityError::Rejected(ProviderCode::InvalidEmail))?;
        let session = Session { uid, email };
        self.sessions.publish(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.take_failure()?;
        let account = lock(&self.accounts)
            .get(email)
            .cloned()
            .ok_or(IdentityError::Rejected(ProviderCode::UserNotFound))?;
        if account.password != password {
            return Err(IdentityError::Rejected(ProviderCode::WrongPassword));
        }
        self.start_session(account.uid, email)
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        self.take_failure()?;
        if Email::parse(email).is_err() {
            return Err(IdentityError::Rejected(ProviderCode::InvalidEmail));
        }
        if lock(&self.accounts).contains_key(email) {
            return Err(IdentityError::Rejected(ProviderCode::EmailAlreadyInUse));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(IdentityError::Rejected(ProviderCode::WeakPassword));
        }
        let uid = self.insert_account(email, password);
        self.start_session(uid, email)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.take_failure()?;
        if Email::parse(email).is_err() {
            return Err(IdentityError::Rejected(ProviderCode::InvalidEmail));
        }
        if !lock(&self.accounts).contains_key(email) {
            return Err(IdentityError::Rejected(ProviderCode::UserNotFound));
        }
        lock(&self.resets).push(email.to_string());
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.take_failure()?;
        self.sessions.publish(None);
        Ok(())
    }

    fn on_session_changed(&self) -> SessionSubscription {
        self.sessions.subscribe()
    }
}

type FetchHook = Box<dyn FnOnce() + Send>;

/// Catalog held in a vector, in insertion order.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<Vec<Product>>,
    unreadable: Mutex<HashSet<ProductId>>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
    next_id: AtomicUsize,
    before_fetch: Mutex<Option<FetchHook>>,
}

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("products", &lock(&self.products).len())
            .field("list_calls", &self.list_calls())
            .finish_non_exhaustive()
    }
}

impl InMemoryCatalog {
    /// Add products with their ids as given.
    pub fn seed(&self, products: impl IntoIterator<Item = Product>) {
        lock(&self.products).extend(products);
    }

    /// Delete a product behind the storefront's back.
    pub fn remove(&self, id: &ProductId) {
        lock(&self.products).retain(|p| &p.id != id);
    }

    /// Add a document that exists but does not decode into a product.
    pub fn seed_unreadable(&self, id: &ProductId) {
        lock(&self.unreadable).insert(id.clone());
    }

    /// Run `hook` at the start of the next fetch, before it returns.
    pub fn before_next_fetch(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.before_fetch) = Some(Box::new(hook));
    }

    /// Make every call fail (or succeed again).
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many times the catalog was fetched, by either listing call.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn start_fetch(&self) -> Result<(), CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let hook = lock(&self.before_fetch).take();
        if let Some(hook) = hook {
            hook();
        }
        self.check()
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Api {
                status: 503,
                message: "catalog unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        self.start_fetch()?;
        Ok(lock(&self.products).clone())
    }

    async fn product_ids(&self) -> Result<HashSet<ProductId>, CatalogError> {
        self.start_fetch()?;
        let mut ids: HashSet<_> = lock(&self.products).iter().map(|p| p.id.clone()).collect();
        ids.extend(lock(&self.unreadable).iter().cloned());
        Ok(ids)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        self.check()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let product = Product {
            id: ProductId::new(format!("prod-{n}")),
            name: product.name,
            price: product.price,
            image: product.image,
        };
        lock(&self.products).push(product.clone());
        Ok(product)
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), CatalogError> {
        self.check()?;
        let mut products = lock(&self.products);
        let before = products.len();
        products.retain(|p| &p.id != id);
        if products.len() == before {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Blob store holding uploads in a map keyed by path.
#[derive(Debug, Default)]
pub struct InMemoryBlobs {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_deletes: AtomicBool,
}

impl InMemoryBlobs {
    /// Stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = lock(&self.blobs).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Make deletes fail (or succeed again).
    pub fn fail_deletes(&self, failing: bool) {
        self.fail_deletes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobs {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobRef, CatalogError> {
        lock(&self.blobs).insert(path.to_string(), bytes);
        Ok(BlobRef {
            path: path.to_string(),
            download_token: None,
        })
    }

    async fn resolve_url(&self, blob: &BlobRef) -> Result<Url, CatalogError> {
        Url::parse(&format!("{BLOB_BASE_URL}{}", urlencoding::encode(&blob.path)))
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), CatalogError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::Api {
                status: 500,
                message: "delete failed".to_string(),
            });
        }
        lock(&self.blobs)
            .remove(&blob.path)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound(blob.path.clone()))
    }

    fn blob_for_url(&self, url: &str) -> Option<BlobRef> {
        let encoded = url.strip_prefix(BLOB_BASE_URL)?;
        Some(BlobRef {
            path: urlencoding::decode(encoded).ok()?.into_owned(),
            download_token: None,
        })
    }
}

/// Token source that never has a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl TokenSource for Anonymous {
    async fn bearer_token(&self) -> Option<SecretString> {
        None
    }
}
