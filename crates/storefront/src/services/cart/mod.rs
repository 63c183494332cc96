//! Device-local shopping cart.
//!
//! # Architecture
//!
//! - The cart belongs to whoever is signed in. Its owner is synchronized with
//!   the identity provider's session before every operation, so a read never
//!   sees a previous user's items.
//! - Every change while signed in writes the full cart to the owner's slot in
//!   [`CartStorage`]. Signing out discards the in-memory items but leaves the
//!   slot; signing in loads it.
//! - A background worker reconciles held items against the live catalog after
//!   each mutation, on session change, and on a fixed interval. It is aborted
//!   when the [`CartContext`] is dropped.
//!
//! Reconciliation only removes items: an item is dropped when its product id
//! was in the cart when the catalog fetch started and is missing from the
//! fetched catalog. A failed fetch leaves the cart untouched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use valfinds_core::{Price, ProductId, UserId};

use crate::catalog::{CatalogError, CatalogStore, Product};
use crate::db::CartStorage;
use crate::identity::SessionSubscription;
use crate::models::CartItem;

/// Default period of the background reconciliation.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Catalog fetch failed during reconciliation.
#[derive(Debug, Error)]
#[error("cart reconciliation failed: {0}")]
pub struct ReconciliationError(#[from] pub CatalogError);

#[derive(Debug, Default)]
struct CartState {
    owner: Option<UserId>,
    items: Vec<CartItem>,
}

struct Inner {
    state: Mutex<CartState>,
    sessions: SessionSubscription,
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn CartStorage>,
    mutated: Notify,
}

/// Shopping cart for the signed-in user of this device.
pub struct CartContext {
    inner: Arc<Inner>,
    worker: JoinHandle<()>,
}

impl CartContext {
    /// Create the cart and start its reconciliation worker.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(
        sessions: SessionSubscription,
        catalog: Arc<dyn CatalogStore>,
        storage: Arc<dyn CartStorage>,
        interval: Duration,
    ) -> Self {
        let worker_sessions = sessions.clone();
        let inner = Arc::new(Inner {
            state: Mutex::new(CartState::default()),
            sessions,
            catalog,
            storage,
            mutated: Notify::new(),
        });
        drop(inner.sync());

        let worker = tokio::spawn(run_worker(Arc::clone(&inner), worker_sessions, interval));
        Self { inner, worker }
    }

    /// Add one unit of `product`.
    ///
    /// Returns `false` and changes nothing when no one is signed in.
    pub fn add_to_cart(&self, product: &Product) -> bool {
        let mut state = self.inner.sync();
        if state.owner.is_none() {
            debug!(product = %product.id, "Ignoring add to cart without a session");
            return false;
        }

        match state.items.iter_mut().find(|item| item.id == product.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(1),
            None => state.items.push(CartItem::from_product(product)),
        }
        self.inner.persist(&state);
        drop(state);

        self.inner.mutated.notify_one();
        true
    }

    /// Remove the item for `id`, whatever its quantity. No-op if absent.
    pub fn remove_from_cart(&self, id: &ProductId) {
        let mut state = self.inner.sync();
        let before = state.items.len();
        state.items.retain(|item| &item.id != id);
        if state.items.len() == before {
            return;
        }
        self.inner.persist(&state);
        drop(state);

        self.inner.mutated.notify_one();
    }

    /// Empty the cart and delete the signed-in user's slot.
    pub fn clear_cart(&self) {
        drop(self.take_items());
    }

    /// Empty the cart and delete the signed-in user's slot, returning the
    /// items that were in it. Nothing can be added in between.
    pub fn take_items(&self) -> Vec<CartItem> {
        let mut state = self.inner.sync();
        let items = std::mem::take(&mut state.items);
        if let Some(owner) = &state.owner
            && let Err(e) = self.inner.storage.remove(owner)
        {
            warn!(error = %e, uid = %owner, "Failed to remove saved cart");
        }
        items
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner.sync().items.clone()
    }

    /// Sum of `price × quantity` over all items.
    #[must_use]
    pub fn total(&self) -> Price {
        self.inner.sync().items.iter().map(CartItem::line_total).sum()
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.inner
            .sync()
            .items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity))
    }

    /// Drop items whose product is no longer in the catalog.
    ///
    /// Returns the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns `ReconciliationError` if the catalog could not be fetched; the
    /// cart is left unchanged.
    pub async fn reconcile(&self) -> Result<usize, ReconciliationError> {
        self.inner.reconcile().await
    }
}

impl Drop for CartContext {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the cart with its owner matched to the current session.
    fn sync(&self) -> MutexGuard<'_, CartState> {
        let mut state = self.lock();
        let current = self.sessions.current().map(|session| session.uid);
        if state.owner == current {
            return state;
        }

        state.items = match &current {
            Some(uid) => self.load(uid),
            None => Vec::new(),
        };
        debug!(
            from = ?state.owner,
            to = ?current,
            items = state.items.len(),
            "Cart owner changed"
        );
        state.owner = current;
        state
    }

    fn load(&self, owner: &UserId) -> Vec<CartItem> {
        match self.storage.load(owner) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, uid = %owner, "Discarding unreadable saved cart");
                Vec::new()
            }
        }
    }

    fn persist(&self, state: &CartState) {
        if let Some(owner) = &state.owner
            && let Err(e) = self.storage.save(owner, &state.items)
        {
            warn!(error = %e, uid = %owner, "Failed to save cart");
        }
    }

    #[instrument(skip(self))]
    async fn reconcile(&self) -> Result<usize, ReconciliationError> {
        let (owner, snapshot) = {
            let state = self.sync();
            if state.items.is_empty() {
                return Ok(0);
            }
            let ids: HashSet<ProductId> = state.items.iter().map(|item| item.id.clone()).collect();
            (state.owner.clone(), ids)
        };

        let live = self.catalog.product_ids().await?;

        let mut state = self.sync();
        if state.owner != owner {
            debug!("Session changed during reconciliation; skipping");
            return Ok(0);
        }

        let removed = prune(&mut state.items, &snapshot, &live);
        if removed > 0 {
            self.persist(&state);
            info!(removed, "Removed unavailable products from cart");
        }
        Ok(removed)
    }
}

/// Remove items that were in `snapshot` and are missing from `live`.
fn prune(
    items: &mut Vec<CartItem>,
    snapshot: &HashSet<ProductId>,
    live: &HashSet<ProductId>,
) -> usize {
    let before = items.len();
    items.retain(|item| !snapshot.contains(&item.id) || live.contains(&item.id));
    before - items.len()
}

async fn run_worker(inner: Arc<Inner>, mut sessions: SessionSubscription, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = sessions.changed() => {
                if changed.is_err() {
                    debug!("Session stream closed; stopping cart worker");
                    return;
                }
            }
            () = inner.mutated.notified() => {}
            _ = ticker.tick() => {}
        }

        if let Err(e) = inner.reconcile().await {
            warn!(error = %e, "Cart reconciliation failed; keeping items");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryCartStorage;
    use crate::identity::IdentityProvider;
    use crate::testing::{InMemoryCatalog, InMemoryIdentity};

    const INTERVAL: Duration = Duration::from_secs(300);

    struct Fixture {
        cart: CartContext,
        identity: Arc<InMemoryIdentity>,
        catalog: Arc<InMemoryCatalog>,
        storage: Arc<MemoryCartStorage>,
    }

    fn product(id: &str, name: &str, price: u64) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Price::from_units(price),
            image: format!("https://img/{id}.jpg"),
        }
    }

    fn jacket() -> Product {
        product("p1", "Jacket", 1500)
    }

    async fn fixture() -> Fixture {
        let identity = Arc::new(
            InMemoryIdentity::default()
                .with_account("jane@shop.test", "jane-pass")
                .with_account("bob@shop.test", "bob-pass"),
        );
        let catalog = Arc::new(InMemoryCatalog::default());
        catalog.seed([
            jacket(),
            product("p2", "Scarf", 250),
            product("p3", "Hat", 800),
        ]);
        let storage = Arc::new(MemoryCartStorage::default());

        let cart = CartContext::start(
            identity.on_session_changed(),
            catalog.clone(),
            storage.clone(),
            INTERVAL,
        );
        identity
            .sign_in_with_password("jane@shop.test", "jane-pass")
            .await
            .unwrap();

        Fixture {
            cart,
            identity,
            catalog,
            storage,
        }
    }

    fn uid(f: &Fixture) -> UserId {
        f.identity.on_session_changed().current().unwrap().uid
    }

    #[tokio::test]
    async fn test_repeat_add_increments_quantity() {
        let f = fixture().await;

        assert!(f.cart.add_to_cart(&jacket()));
        assert!(f.cart.add_to_cart(&jacket()));

        let items = f.cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, ProductId::new("p1"));
        assert_eq!(items[0].quantity, 2);
        assert_eq!(f.cart.total(), Price::from_units(3000));
        assert_eq!(f.cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_add_preserves_insertion_order() {
        let f = fixture().await;
        f.cart.add_to_cart(&product("p3", "Hat", 800));
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p3", "Hat", 800));

        let ids: Vec<_> = f.cart.items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ProductId::new("p3"), ProductId::new("p1")]);
    }

    #[tokio::test]
    async fn test_remove_then_add_starts_over() {
        let f = fixture().await;
        for _ in 0..3 {
            f.cart.add_to_cart(&jacket());
        }

        f.cart.remove_from_cart(&ProductId::new("p1"));
        assert!(f.cart.items().is_empty());

        f.cart.add_to_cart(&jacket());
        assert_eq!(f.cart.items()[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.cart.remove_from_cart(&ProductId::new("nope"));
        assert_eq!(f.cart.items().len(), 1);
    }

    #[tokio::test]
    async fn test_add_without_session_is_noop() {
        let f = fixture().await;
        f.identity.sign_out().await.unwrap();

        assert!(!f.cart.add_to_cart(&jacket()));
        assert!(f.cart.items().is_empty());
    }

    #[tokio::test]
    async fn test_every_change_is_persisted() {
        let f = fixture().await;
        let owner = uid(&f);

        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));
        assert_eq!(f.storage.load(&owner).unwrap().unwrap(), f.cart.items());

        f.cart.remove_from_cart(&ProductId::new("p1"));
        let saved = f.storage.load(&owner).unwrap().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, ProductId::new("p2"));
    }

    #[tokio::test]
    async fn test_clear_removes_slot() {
        let f = fixture().await;
        let owner = uid(&f);
        f.cart.add_to_cart(&jacket());
        assert!(f.storage.contains(&owner));

        f.cart.clear_cart();

        assert!(f.cart.items().is_empty());
        assert!(!f.storage.contains(&owner));
    }

    #[tokio::test]
    async fn test_sign_out_keeps_slot() {
        let f = fixture().await;
        let owner = uid(&f);
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));
        f.cart.add_to_cart(&product("p3", "Hat", 800));

        f.identity.sign_out().await.unwrap();

        assert!(f.cart.items().is_empty());
        assert_eq!(f.storage.load(&owner).unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sign_in_restores_saved_cart() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&jacket());
        f.identity.sign_out().await.unwrap();
        assert!(f.cart.items().is_empty());

        f.identity
            .sign_in_with_password("jane@shop.test", "jane-pass")
            .await
            .unwrap();

        let items = f.cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_malformed_slot_loads_empty() {
        let f = fixture().await;
        let owner = uid(&f);
        f.identity.sign_out().await.unwrap();
        f.storage.put_raw(&owner, "{\"not\": \"a cart\"}");

        f.identity
            .sign_in_with_password("jane@shop.test", "jane-pass")
            .await
            .unwrap();

        assert!(f.cart.items().is_empty());
        assert!(f.cart.add_to_cart(&jacket()));
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.identity.sign_out().await.unwrap();

        f.identity.create_account("carol@shop.test", "carol-pass").await.unwrap();
        assert!(f.cart.items().is_empty());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));
        assert_eq!(f.cart.items()[0].id, ProductId::new("p2"));
    }

    #[tokio::test]
    async fn test_reconcile_removes_deleted_products() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));

        f.catalog.remove(&ProductId::new("p1"));
        f.cart.reconcile().await.unwrap();

        let ids: Vec<_> = f.cart.items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ProductId::new("p2")]);
        assert_eq!(f.storage.load(&uid(&f)).unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_failure_keeps_cart() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));
        let before = f.cart.items();

        f.catalog.fail(true);
        assert!(f.cart.reconcile().await.is_err());

        assert_eq!(f.cart.items(), before);
    }

    #[tokio::test]
    async fn test_reconcile_abandoned_when_user_switches_mid_fetch() {
        let f = fixture().await;
        let jane = uid(&f);
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));

        // Bob's saved cart holds a product the catalog no longer has
        let bob = f.identity.switch_to("bob@shop.test").unwrap().uid;
        f.cart.add_to_cart(&product("p3", "Hat", 800));
        f.identity.switch_to("jane@shop.test").unwrap();
        f.catalog.remove(&ProductId::new("p1"));
        f.catalog.remove(&ProductId::new("p3"));

        let identity = Arc::clone(&f.identity);
        f.catalog.before_next_fetch(move || {
            identity.switch_to("bob@shop.test");
        });
        assert_eq!(f.cart.reconcile().await.unwrap(), 0);

        // Bob's cart is loaded as-is, Jane's slot keeps the deleted product
        assert_eq!(uid(&f), bob);
        let bob_items: Vec<_> = f.cart.items().into_iter().map(|i| i.id).collect();
        assert_eq!(bob_items, vec![ProductId::new("p3")]);
        let jane_saved = f.storage.load(&jane).unwrap().unwrap();
        let jane_ids: Vec<_> = jane_saved.into_iter().map(|i| i.id).collect();
        assert_eq!(jane_ids, vec![ProductId::new("p1"), ProductId::new("p2")]);
    }

    #[tokio::test]
    async fn test_reconcile_abandoned_when_signed_out_mid_fetch() {
        let f = fixture().await;
        let owner = uid(&f);
        f.cart.add_to_cart(&jacket());
        f.catalog.remove(&ProductId::new("p1"));

        let identity = Arc::clone(&f.identity);
        f.catalog.before_next_fetch(move || identity.expire_session());
        assert_eq!(f.cart.reconcile().await.unwrap(), 0);

        assert!(f.cart.items().is_empty());
        assert_eq!(f.storage.load(&owner).unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_items_with_unreadable_documents() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.catalog.remove(&ProductId::new("p1"));
        f.catalog.seed_unreadable(&ProductId::new("p1"));

        assert_eq!(f.cart.reconcile().await.unwrap(), 0);
        assert_eq!(f.cart.items().len(), 1);
    }

    #[tokio::test]
    async fn test_take_items_empties_cart_and_slot() {
        let f = fixture().await;
        let owner = uid(&f);
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&jacket());

        let taken = f.cart.take_items();

        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].quantity, 2);
        assert!(f.cart.items().is_empty());
        assert!(!f.storage.contains(&owner));
    }

    #[tokio::test]
    async fn test_total_of_huge_prices_saturates() {
        let f = fixture().await;
        let mut crown = product("p1", "Crown", 1);
        crown.price = "50000000000000000000000000000".parse().unwrap();

        f.cart.add_to_cart(&crown);
        f.cart.add_to_cart(&crown);

        assert_eq!(f.cart.item_count(), 2);
        assert_eq!(f.cart.total().amount(), rust_decimal::Decimal::MAX);
    }

    #[tokio::test]
    async fn test_reconcile_empty_cart_skips_fetch() {
        let f = fixture().await;
        let calls = f.catalog.list_calls();
        assert_eq!(f.cart.reconcile().await.unwrap(), 0);
        assert_eq!(f.catalog.list_calls(), calls);
    }

    #[test]
    fn test_prune_only_removes_snapshot_ids() {
        let mut items = vec![
            CartItem::from_product(&jacket()),
            CartItem::from_product(&product("p2", "Scarf", 250)),
            CartItem::from_product(&product("p9", "Added mid-fetch", 10)),
        ];
        let snapshot: HashSet<_> = [ProductId::new("p1"), ProductId::new("p2")].into();
        let live: HashSet<_> = [ProductId::new("p2")].into();

        assert_eq!(prune(&mut items, &snapshot, &live), 1);
        let ids: Vec<_> = items.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ProductId::new("p2"), ProductId::new("p9")]);
    }

    #[test]
    fn test_prune_never_grows() {
        let mut items = vec![CartItem::from_product(&jacket())];
        let snapshot: HashSet<_> = [ProductId::new("p1")].into();
        let live: HashSet<_> = ["p1", "p2", "p3"].into_iter().map(ProductId::new).collect();

        assert_eq!(prune(&mut items, &snapshot, &live), 0);
        assert_eq!(items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_reconciles() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        f.cart.add_to_cart(&product("p2", "Scarf", 250));
        tokio::task::yield_now().await;

        f.catalog.remove(&ProductId::new("p2"));
        let calls = f.catalog.list_calls();

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

        assert!(f.catalog.list_calls() > calls);
        let ids: Vec<_> = f.cart.items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ProductId::new("p1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_worker() {
        let f = fixture().await;
        f.cart.add_to_cart(&jacket());
        tokio::task::yield_now().await;

        let Fixture { cart, catalog, .. } = f;
        drop(cart);
        let calls = catalog.list_calls();

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(catalog.list_calls(), calls);
    }

    #[tokio::test]
    async fn test_mutation_triggers_reconciliation() {
        let f = fixture().await;
        f.catalog.remove(&ProductId::new("p3"));

        f.cart.add_to_cart(&product("p3", "Hat", 800));

        for _ in 0..100 {
            if f.cart.items().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(f.cart.items().is_empty());
    }
}
