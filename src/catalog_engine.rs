//! The catalog engine: the one owned object views talk to.
//!
//! It owns the overlay state, the overlay store, the gateway handle and the request
//! registry. Every operation follows the same order: call the gateway, apply the
//! result through [`OverlayState`], then write each changed collection to the store.
//! Nothing is mutated before the gateway answers, so a failed or cancelled call
//! leaves the state as it was.
//!
//! Persistence failures are logged and swallowed: the in-memory state stays
//! authoritative for the rest of the session.
//!
//! Hosts that drive several views against one engine can split a fetch into
//! [`CatalogEngine::begin_fetch`] and [`CatalogEngine::complete_fetch`] and run the
//! gateway call in between without borrowing the engine. Duplicate fetches are then
//! coalesced and results for closed sessions are dropped.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::app_response::AppResponse;
use crate::config::CatalogConfig;
use crate::notification::{LogNotifier, Notifier};
use crate::overlay_store::{OverlayKey, OverlayStore};
use crate::product_gateway::ProductGateway;
use crate::product_model::{Page, Product, ProductDraft, ProductFilter, ProductId};
use crate::reconciliation::OverlayState;
use crate::request_task::{Begin, Completion, RequestKey, RequestRegistry, SessionId, Ticket};

/// Progress of the requests for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Result of completing a split request.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<T> {
    Current(T),
    /// The issuing session is gone or a newer request superseded this one.
    Discarded,
}

pub struct CatalogEngine<G: ProductGateway, S: OverlayStore> {
    gateway: Arc<G>,
    store: S,
    notifier: Box<dyn Notifier>,
    config: CatalogConfig,
    state: OverlayState,
    filter: ProductFilter,
    requests: RequestRegistry,
    list_status: LoadStatus,
    detail_status: LoadStatus,
    current_product: Option<Product>,
    last_error: Option<AppResponse>,
}

impl<G: ProductGateway, S: OverlayStore> CatalogEngine<G, S> {
    /// Loads the overlays from `store` and repairs any invariant the stored data
    /// breaks.
    pub fn new(gateway: G, store: S, config: CatalogConfig) -> Self {
        let mut state = OverlayState::load(&store);
        let repaired = state.normalize();

        let engine = Self {
            gateway: Arc::new(gateway),
            store,
            notifier: Box::new(LogNotifier),
            config,
            state,
            filter: ProductFilter::default(),
            requests: RequestRegistry::new(),
            list_status: LoadStatus::Idle,
            detail_status: LoadStatus::Idle,
            current_product: None,
            last_error: None,
        };

        if !repaired.is_empty() {
            warn!("Stored overlays violated invariants, repaired {:?}", repaired);
            engine.persist(&repaired);
        }
        info!(
            "Catalog engine ready: {} cached, {} added, {} deleted, {} favorites",
            engine.state.products().len(),
            engine.state.added_products().len(),
            engine.state.deleted_product_ids().len(),
            engine.state.favorites().len()
        );
        engine
    }

    pub fn with_notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn gateway(&self) -> Arc<G> {
        Arc::clone(&self.gateway)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn products(&self) -> &[Product] {
        self.state.products()
    }

    pub fn added_products(&self) -> &[Product] {
        self.state.added_products()
    }

    pub fn deleted_product_ids(&self) -> &[ProductId] {
        self.state.deleted_product_ids()
    }

    pub fn favorites(&self) -> &[ProductId] {
        self.state.favorites()
    }

    pub fn current_product(&self) -> Option<&Product> {
        self.current_product.as_ref()
    }

    pub fn last_error(&self) -> Option<&AppResponse> {
        self.last_error.as_ref()
    }

    pub fn list_status(&self) -> LoadStatus {
        self.list_status
    }

    pub fn detail_status(&self) -> LoadStatus {
        self.detail_status
    }

    /// Reads the terminal list status once, returning it to `Idle`.
    pub fn take_list_outcome(&mut self) -> LoadStatus {
        take_outcome(&mut self.list_status)
    }

    pub fn take_detail_outcome(&mut self) -> LoadStatus {
        take_outcome(&mut self.detail_status)
    }

    // ---- sessions ----

    pub fn open_session(&mut self) -> SessionId {
        self.requests.open_session()
    }

    /// Closes a view's session; responses still in flight for it will be ignored.
    pub fn close_session(&mut self, session: SessionId) {
        let orphaned = self.requests.close_session(session);
        if orphaned > 0 {
            debug!("Session {:?} closed with {} request(s) in flight", session, orphaned);
        }
        if !self.requests.is_in_flight(RequestKey::List) && self.list_status == LoadStatus::Loading {
            self.list_status = LoadStatus::Idle;
        }
        if self.detail_status == LoadStatus::Loading && !self.detail_in_flight() {
            self.detail_status = LoadStatus::Idle;
        }
    }

    // ---- list ----

    pub fn filter(&self) -> &ProductFilter {
        &self.filter
    }

    /// Sets the criteria applied to the next remote fetch.
    pub fn set_filter(&mut self, filter: ProductFilter) {
        self.filter = filter;
    }

    pub fn clear_filter(&mut self) {
        self.filter = ProductFilter::default();
    }

    /// Registers a list fetch for `session`. Only a [`Begin::Started`] ticket
    /// should be followed by a gateway call.
    pub fn begin_fetch(&mut self, session: SessionId) -> Begin {
        let begin = self.requests.begin(session, RequestKey::List);
        if matches!(begin, Begin::Started(_)) {
            self.list_status = LoadStatus::Loading;
        }
        begin
    }

    /// Applies the outcome of a list fetch started with [`Self::begin_fetch`].
    ///
    /// On success returns how many products were newly cached.
    pub fn complete_fetch(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Product>, AppResponse>,
    ) -> Result<Applied<usize>, AppResponse> {
        if self.requests.complete(&ticket) == Completion::Stale {
            debug!("Dropping stale product list for {:?}", ticket.session());
            if !self.requests.is_in_flight(RequestKey::List) && self.list_status == LoadStatus::Loading {
                self.list_status = LoadStatus::Idle;
            }
            return Ok(Applied::Discarded);
        }

        match result {
            Ok(remote) => {
                let received = remote.len();
                let fresh = self
                    .state
                    .merge_remote(remote, &self.filter, self.config.merge_policy);
                self.persist(&[OverlayKey::Products]);
                self.list_status = LoadStatus::Succeeded;
                self.last_error = None;
                debug!("Merged product list: {} received, {} new", received, fresh);
                Ok(Applied::Current(fresh))
            }
            Err(e) => {
                self.list_status = LoadStatus::Failed;
                Err(self.fail(e))
            }
        }
    }

    /// Fetches the remote list and merges it.
    ///
    /// A fetch still running for the list (from a split request or a dropped call)
    /// is superseded, so its response will not be applied after this one.
    pub async fn fetch_products(&mut self, session: SessionId) -> Result<usize, AppResponse> {
        let ticket = match self.requests.restart(session, RequestKey::List) {
            Begin::Started(ticket) => ticket,
            _ => return Err(closed_session(session)),
        };
        self.list_status = LoadStatus::Loading;

        let gateway = self.gateway();
        let result = gateway.list_products().await;
        match self.complete_fetch(ticket, result)? {
            Applied::Current(fresh) => Ok(fresh),
            Applied::Discarded => Ok(0),
        }
    }

    /// What the list view shows: cached remote products not shadowed by a local
    /// entry, followed by local entries.
    pub fn displayed_products(&self) -> Vec<Product> {
        self.state.displayed()
    }

    /// Case-insensitive title search over the displayed products.
    pub fn search(&self, query: &str) -> Vec<Product> {
        self.state.search(query)
    }

    pub fn page(&self, page: usize) -> Page<Product> {
        Page::paginate(&self.state.displayed(), page, self.config.page_size)
    }

    pub fn search_page(&self, query: &str, page: usize) -> Page<Product> {
        Page::paginate(&self.state.search(query), page, self.config.page_size)
    }

    pub fn favorite_products(&self) -> Vec<Product> {
        self.state.favorite_products()
    }

    pub fn is_favorite(&self, id: ProductId) -> bool {
        self.state.is_favorite(id)
    }

    // ---- detail ----

    /// Registers a detail load. Loads still running for other ids are superseded,
    /// so only the most recently requested product can become current.
    pub fn begin_load_product(&mut self, session: SessionId, id: ProductId) -> Begin {
        let begin = self.requests.begin(session, RequestKey::Product(id));
        if matches!(begin, Begin::Started(_)) {
            self.supersede_other_details(id);
            self.detail_status = LoadStatus::Loading;
        }
        begin
    }

    pub fn complete_load_product(
        &mut self,
        ticket: Ticket,
        result: Result<Product, AppResponse>,
    ) -> Result<Applied<Product>, AppResponse> {
        if self.requests.complete(&ticket) == Completion::Stale {
            debug!("Dropping stale product detail {:?}", ticket.key());
            if self.detail_status == LoadStatus::Loading && !self.detail_in_flight() {
                self.detail_status = LoadStatus::Idle;
            }
            return Ok(Applied::Discarded);
        }

        match result {
            Ok(product) if self.state.is_deleted(product.id) => {
                self.current_product = None;
                self.detail_status = LoadStatus::Failed;
                let error = AppResponse::NotFound(format!("Product {} was deleted", product.id));
                Err(self.fail(error))
            }
            Ok(product) => {
                self.current_product = Some(product.clone());
                self.detail_status = LoadStatus::Succeeded;
                self.last_error = None;
                Ok(Applied::Current(product))
            }
            Err(e) => {
                self.current_product = None;
                self.detail_status = LoadStatus::Failed;
                Err(self.fail(e))
            }
        }
    }

    /// Fetches one product for the detail view and makes it the current product.
    pub async fn load_product(
        &mut self,
        session: SessionId,
        id: ProductId,
    ) -> Result<Product, AppResponse> {
        let ticket = match self.requests.restart(session, RequestKey::Product(id)) {
            Begin::Started(ticket) => ticket,
            _ => return Err(closed_session(session)),
        };
        self.supersede_other_details(id);
        self.detail_status = LoadStatus::Loading;

        let gateway = self.gateway();
        let result = gateway.get_product(id).await;
        match self.complete_load_product(ticket, result)? {
            Applied::Current(product) => Ok(product),
            Applied::Discarded => Err(AppResponse::NotFound(format!(
                "Request for product {} was superseded",
                id
            ))),
        }
    }

    /// Product to show in the detail view: the fetched one when it matches `id`,
    /// otherwise the local copy. Deleted ids never resolve.
    pub fn product_details(&self, id: ProductId) -> Option<Product> {
        if self.state.is_deleted(id) {
            return None;
        }
        match &self.current_product {
            Some(current) if current.id == id => Some(current.clone()),
            _ => self.state.find(id).cloned(),
        }
    }

    // ---- mutations ----

    /// Creates the product remotely and records the confirmed copy in
    /// `added_products`.
    pub async fn create_product(&mut self, draft: ProductDraft) -> Result<Product, AppResponse> {
        self.validate(&draft)?;

        let gateway = self.gateway();
        let product = match gateway.create_product(&draft).await {
            Ok(product) => product,
            Err(e) => return Err(self.fail(e)),
        };

        let changed = self.state.record_created(product.clone());
        if changed.is_empty() {
            warn!(
                "Server assigned previously deleted id {}; not showing it",
                product.id
            );
        }
        self.persist(&changed);
        self.succeed(format!("Product \"{}\" created", product.title));
        Ok(product)
    }

    /// Creates a product that only exists on this client, with an id taken from the
    /// clock in milliseconds.
    pub fn create_local_product(&mut self, draft: ProductDraft) -> Result<Product, AppResponse> {
        self.validate(&draft)?;

        let id = self.state.next_local_id(clock_millis());
        let product = Product::from_draft(id, draft);
        let changed = self.state.record_local(product.clone());
        self.persist(&changed);
        info!("Created local product {}", id);
        Ok(product)
    }

    /// Deletes remotely, then tombstones `id` locally.
    ///
    /// Products from [`Self::create_local_product`] are unknown to the service and
    /// are tombstoned without a gateway call.
    pub async fn delete_product(&mut self, id: ProductId) -> Result<ProductId, AppResponse> {
        let deleted = if self.state.is_local(id) {
            debug!("Deleting local-only product {} without a remote call", id);
            id
        } else {
            let gateway = self.gateway();
            match gateway.delete_product(id).await {
                Ok(deleted) => deleted,
                Err(e) => return Err(self.fail(e)),
            }
        };

        let changed = self.state.apply_delete(id);
        self.persist(&changed);
        if self.current_product.as_ref().is_some_and(|p| p.id == id) {
            self.current_product = None;
        }
        self.succeed(format!("Product {} deleted", id));
        Ok(deleted)
    }

    /// Replaces a product remotely, then locally.
    ///
    /// Returns `Ok(false)` when the id is cached in neither product collection; the
    /// local state is left untouched in that case. Local-only products are replaced
    /// without a gateway call.
    pub async fn edit_product(
        &mut self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<bool, AppResponse> {
        self.validate(&draft)?;

        let mut updated = if self.state.is_local(id) {
            debug!("Editing local-only product {} without a remote call", id);
            Product::from_draft(id, draft)
        } else {
            let gateway = self.gateway();
            match gateway.update_product(id, &draft).await {
                Ok(product) => product,
                Err(e) => return Err(self.fail(e)),
            }
        };
        updated.id = id;

        if self.current_product.as_ref().is_some_and(|p| p.id == id) {
            self.current_product = Some(updated.clone());
        }

        let applied = match self.state.apply_edit(updated) {
            Some(key) => {
                self.persist(&[key]);
                true
            }
            None => {
                debug!("Edited product {} is not cached locally; nothing replaced", id);
                false
            }
        };
        self.succeed(format!("Product {} updated", id));
        Ok(applied)
    }

    /// Flips the favorite mark of `id`. Local only.
    pub fn toggle_favorite(&mut self, id: ProductId) -> bool {
        let now_favorite = self.state.toggle_favorite(id);
        self.persist(&[OverlayKey::Favorites]);
        now_favorite
    }

    /// Wipes the overlay store and the in-memory overlays.
    pub fn clear_overlays(&mut self) -> Result<(), AppResponse> {
        self.store.clear_all_records()?;
        self.state = OverlayState::default();
        self.current_product = None;
        Ok(())
    }

    // ---- helpers ----

    fn supersede_other_details(&mut self, id: ProductId) {
        let retired = self
            .requests
            .retire_where(|key| matches!(key, RequestKey::Product(other) if *other != id));
        if retired > 0 {
            debug!("Superseded {} detail load(s) by product {}", retired, id);
        }
    }

    fn detail_in_flight(&self) -> bool {
        self.requests
            .any_in_flight(|key| matches!(key, RequestKey::Product(_)))
    }

    fn validate(&mut self, draft: &ProductDraft) -> Result<(), AppResponse> {
        draft.validate().map_err(|e| {
            self.last_error = Some(e.clone());
            e
        })
    }

    fn persist(&self, keys: &[OverlayKey]) {
        for key in keys {
            if let Err(e) = self.state.save_key(&self.store, *key) {
                warn!("Failed to persist '{}', keeping in-memory state: {}", key, e);
            }
        }
    }

    fn succeed(&mut self, message: String) {
        self.last_error = None;
        self.notifier.notify(&AppResponse::Ok(message));
    }

    fn fail(&mut self, error: AppResponse) -> AppResponse {
        self.notifier.notify(&error);
        self.last_error = Some(error.clone());
        error
    }
}

fn take_outcome(status: &mut LoadStatus) -> LoadStatus {
    match *status {
        LoadStatus::Succeeded | LoadStatus::Failed => std::mem::take(status),
        other => other,
    }
}

fn closed_session(session: SessionId) -> AppResponse {
    AppResponse::BadRequest(format!("Session {:?} is closed", session))
}

fn clock_millis() -> ProductId {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| ProductId::try_from(d.as_millis()).unwrap_or(ProductId::MAX))
        .unwrap_or(0)
}
