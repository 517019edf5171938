//! Merge rules between remote results and the local overlays.
//!
//! Everything here is synchronous and network-free; the engine calls these after a
//! gateway round trip has succeeded and then persists the collections reported as
//! changed. After every operation:
//!
//! - no tombstoned id is present in `products` or `added_products`;
//! - no id appears twice across `products` and `added_products`, with the
//!   `added_products` entry winning a conflict;
//! - every id in `local_product_ids` belongs to an entry of `added_products`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::config::MergePolicy;
use crate::overlay_store::{OverlayKey, OverlayStore};
use crate::product_model::{title_matches, Product, ProductFilter, ProductId};

/// The overlay collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayState {
    products: Vec<Product>,
    added_products: Vec<Product>,
    deleted_product_ids: Vec<ProductId>,
    favorites: Vec<ProductId>,
    #[serde(default)]
    local_product_ids: Vec<ProductId>,
}

impl OverlayState {
    /// Reads every collection, defaulting each to empty.
    pub fn load<S: OverlayStore>(store: &S) -> Self {
        Self {
            products: store.load(OverlayKey::Products),
            added_products: store.load(OverlayKey::AddedProducts),
            deleted_product_ids: store.load(OverlayKey::DeletedProductIds),
            favorites: store.load(OverlayKey::Favorites),
            local_product_ids: store.load(OverlayKey::LocalProductIds),
        }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn added_products(&self) -> &[Product] {
        &self.added_products
    }

    pub fn deleted_product_ids(&self) -> &[ProductId] {
        &self.deleted_product_ids
    }

    pub fn favorites(&self) -> &[ProductId] {
        &self.favorites
    }

    pub fn is_deleted(&self, id: ProductId) -> bool {
        self.deleted_product_ids.contains(&id)
    }

    pub fn local_product_ids(&self) -> &[ProductId] {
        &self.local_product_ids
    }

    pub fn is_favorite(&self, id: ProductId) -> bool {
        self.favorites.contains(&id)
    }

    /// Whether `id` was created on this client and never reached the service.
    pub fn is_local(&self, id: ProductId) -> bool {
        self.local_product_ids.contains(&id)
    }

    /// Local copy of a product, preferring the locally added entry.
    pub fn find(&self, id: ProductId) -> Option<&Product> {
        if self.is_deleted(id) {
            return None;
        }
        self.added_products
            .iter()
            .find(|p| p.id == id)
            .or_else(|| self.products.iter().find(|p| p.id == id))
    }

    /// Remote-origin products not shadowed by a local entry, then the local entries.
    pub fn displayed(&self) -> Vec<Product> {
        let added: HashSet<ProductId> = self.added_products.iter().map(|p| p.id).collect();
        self.products
            .iter()
            .filter(|p| !added.contains(&p.id) && !self.is_deleted(p.id))
            .chain(self.added_products.iter().filter(|p| !self.is_deleted(p.id)))
            .cloned()
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<Product> {
        if query.trim().is_empty() {
            return self.displayed();
        }
        self.displayed()
            .into_iter()
            .filter(|p| title_matches(p, query))
            .collect()
    }

    pub fn favorite_products(&self) -> Vec<Product> {
        self.displayed()
            .into_iter()
            .filter(|p| self.is_favorite(p.id))
            .collect()
    }

    /// Repairs state read from storage that breaks the invariants, e.g. after a
    /// crash between two saves. Returns the collections that changed.
    pub fn normalize(&mut self) -> Vec<OverlayKey> {
        let mut changed = Vec::new();

        if dedup_ids(&mut self.deleted_product_ids) {
            changed.push(OverlayKey::DeletedProductIds);
        }
        if dedup_ids(&mut self.favorites) {
            changed.push(OverlayKey::Favorites);
        }

        let tombstones: HashSet<ProductId> = self.deleted_product_ids.iter().copied().collect();

        let before = self.added_products.len();
        self.added_products.retain(|p| !tombstones.contains(&p.id));
        let added_changed =
            dedup_products(&mut self.added_products) || before != self.added_products.len();
        if added_changed {
            changed.push(OverlayKey::AddedProducts);
        }

        let added: HashSet<ProductId> = self.added_products.iter().map(|p| p.id).collect();
        let before = self.products.len();
        self.products
            .retain(|p| !tombstones.contains(&p.id) && !added.contains(&p.id));
        let products_changed = dedup_products(&mut self.products) || before != self.products.len();
        if products_changed {
            changed.push(OverlayKey::Products);
        }

        let before = self.local_product_ids.len();
        self.local_product_ids.retain(|id| added.contains(id));
        if dedup_ids(&mut self.local_product_ids) || before != self.local_product_ids.len() {
            changed.push(OverlayKey::LocalProductIds);
        }

        changed
    }

    /// Folds a fresh remote list into `products`. Returns how many products became
    /// newly cached.
    ///
    /// Remote items are dropped when tombstoned, when they fail `filter`, or when
    /// their id is already cached in either product collection. With
    /// [`MergePolicy::Replace`] the cached list is rebuilt from the survivors instead
    /// of being appended to.
    pub fn merge_remote(
        &mut self,
        remote: Vec<Product>,
        filter: &ProductFilter,
        policy: MergePolicy,
    ) -> usize {
        let tombstones: HashSet<ProductId> = self.deleted_product_ids.iter().copied().collect();
        let added: HashSet<ProductId> = self.added_products.iter().map(|p| p.id).collect();
        let previous: HashSet<ProductId> = self.products.iter().map(|p| p.id).collect();

        let mut seen: HashSet<ProductId> = match policy {
            MergePolicy::Additive => previous.clone(),
            MergePolicy::Replace => HashSet::new(),
        };

        let survivors: Vec<Product> = remote
            .into_iter()
            .filter(|p| !tombstones.contains(&p.id))
            .filter(|p| filter.matches(p))
            .filter(|p| !added.contains(&p.id))
            .filter(|p| seen.insert(p.id))
            .collect();

        let fresh = survivors.iter().filter(|p| !previous.contains(&p.id)).count();
        match policy {
            MergePolicy::Additive => self.products.extend(survivors),
            MergePolicy::Replace => self.products = survivors,
        }
        fresh
    }

    /// Records a product the server accepted.
    ///
    /// Returns the changed collections; empty when `product.id` is tombstoned, since
    /// a deleted id must never come back.
    pub fn record_created(&mut self, product: Product) -> Vec<OverlayKey> {
        if self.is_deleted(product.id) {
            return Vec::new();
        }

        let mut changed = vec![OverlayKey::AddedProducts];
        if let Some(index) = self.local_product_ids.iter().position(|l| *l == product.id) {
            self.local_product_ids.remove(index);
            changed.push(OverlayKey::LocalProductIds);
        }
        let before = self.products.len();
        self.products.retain(|p| p.id != product.id);
        if before != self.products.len() {
            changed.push(OverlayKey::Products);
        }

        match self.added_products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => self.added_products.push(product),
        }
        changed
    }

    /// Records a product that exists only on this client.
    pub fn record_local(&mut self, product: Product) -> Vec<OverlayKey> {
        let id = product.id;
        let mut changed = self.record_created(product);
        if !changed.is_empty() && !self.is_local(id) {
            self.local_product_ids.push(id);
            changed.push(OverlayKey::LocalProductIds);
        }
        changed
    }

    /// Tombstones `id` and drops it from both product collections.
    ///
    /// All three collections are reported so each gets rewritten, plus the local
    /// marker when `id` carried one.
    pub fn apply_delete(&mut self, id: ProductId) -> Vec<OverlayKey> {
        if !self.deleted_product_ids.contains(&id) {
            self.deleted_product_ids.push(id);
        }
        self.products.retain(|p| p.id != id);
        self.added_products.retain(|p| p.id != id);

        let mut changed = vec![
            OverlayKey::DeletedProductIds,
            OverlayKey::Products,
            OverlayKey::AddedProducts,
        ];
        if let Some(index) = self.local_product_ids.iter().position(|l| *l == id) {
            self.local_product_ids.remove(index);
            changed.push(OverlayKey::LocalProductIds);
        }
        changed
    }

    /// Replaces the first entry with `updated.id`, looking in `products` first.
    ///
    /// An id found in neither collection is not inserted; `None` is returned and
    /// nothing changes.
    pub fn apply_edit(&mut self, updated: Product) -> Option<OverlayKey> {
        if let Some(slot) = self.products.iter_mut().find(|p| p.id == updated.id) {
            *slot = updated;
            return Some(OverlayKey::Products);
        }
        if let Some(slot) = self.added_products.iter_mut().find(|p| p.id == updated.id) {
            *slot = updated;
            return Some(OverlayKey::AddedProducts);
        }
        None
    }

    /// Flips favorite membership of `id`. Returns whether it is now a favorite.
    pub fn toggle_favorite(&mut self, id: ProductId) -> bool {
        match self.favorites.iter().position(|f| *f == id) {
            Some(index) => {
                self.favorites.remove(index);
                false
            }
            None => {
                self.favorites.push(id);
                true
            }
        }
    }

    /// Smallest id `>= candidate` not used by any product or tombstone, wrapping to 1
    /// past `ProductId::MAX`.
    pub fn next_local_id(&self, candidate: ProductId) -> ProductId {
        let taken: HashSet<ProductId> = self
            .products
            .iter()
            .chain(self.added_products.iter())
            .map(|p| p.id)
            .chain(self.deleted_product_ids.iter().copied())
            .collect();

        let mut id = candidate;
        while taken.contains(&id) {
            id = id.checked_add(1).unwrap_or(1);
        }
        id
    }

    /// Serializes one collection into `store`.
    pub fn save_key<S: OverlayStore>(&self, store: &S, key: OverlayKey) -> Result<(), AppResponse> {
        match key {
            OverlayKey::Products => store.save(key, &self.products),
            OverlayKey::AddedProducts => store.save(key, &self.added_products),
            OverlayKey::DeletedProductIds => store.save(key, &self.deleted_product_ids),
            OverlayKey::Favorites => store.save(key, &self.favorites),
            OverlayKey::LocalProductIds => store.save(key, &self.local_product_ids),
        }
    }
}

fn dedup_ids(ids: &mut Vec<ProductId>) -> bool {
    let mut seen = HashSet::new();
    let before = ids.len();
    ids.retain(|id| seen.insert(*id));
    before != ids.len()
}

// Keeps the first occurrence of each id.
fn dedup_products(products: &mut Vec<Product>) -> bool {
    let mut seen = HashSet::new();
    let before = products.len();
    products.retain(|p| seen.insert(p.id));
    before != products.len()
}
