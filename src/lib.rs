//! # Offline Catalog Core
//!
//! State layer for a product catalog backed by a remote REST service. The remote
//! list is cached locally and overlaid with three collections the service itself
//! does not keep: products created on this client, tombstones for deleted ids, and
//! favorites. All of them survive restarts in an LMDB store.
//!
//! ## Features
//!
//! - **Typed gateway**: remote payloads are decoded into [`Product`]; a mismatch is a
//!   [`AppResponse::ParseError`], never a half-filled value
//! - **Tombstones**: a deleted id never comes back, whatever the remote list says
//! - **Additive merge**: repeated fetches never duplicate cached products
//! - **Durable overlays**: every mutation is followed by a full rewrite of the
//!   changed collection
//! - **Session-aware requests**: results for closed views are dropped, duplicate
//!   list fetches are coalesced
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_catalog_core::{
//!     AppDbState, CatalogConfig, CatalogEngine, HttpProductGateway, ProductDraft, SessionId,
//! };
//!
//! # async fn run() -> Result<(), offline_catalog_core::AppResponse> {
//! let config = CatalogConfig::from_env();
//! let gateway = HttpProductGateway::new(&config)?;
//! let store = AppDbState::init_with_map_size(config.db_name.clone(), config.map_size)?;
//! let mut engine = CatalogEngine::new(gateway, store, config);
//!
//! engine.fetch_products(SessionId::APP).await?;
//! let first_page = engine.page(1);
//!
//! let created = engine
//!     .create_product(ProductDraft::new("Desk lamp", "Warm light", 24.0))
//!     .await?;
//! engine.toggle_favorite(created.id);
//! # let _ = first_page;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`product_model`] - products, drafts, filters and pages
//! - [`overlay_store`] - durable key-value storage of the overlays
//! - [`product_gateway`] - HTTP access to the remote catalog
//! - [`reconciliation`] - merge rules between remote data and overlays
//! - [`catalog_engine`] - the engine views drive
//! - [`request_task`] - sessions and in-flight request tracking
//! - [`notification`] - transient success/error notices
//! - [`config`] - runtime configuration

pub mod app_response;
pub mod catalog_engine;
pub mod config;
pub mod notification;
pub mod overlay_store;
pub mod product_gateway;
pub mod product_model;
pub mod reconciliation;
pub mod request_task;

pub use crate::app_response::AppResponse;
pub use crate::catalog_engine::{Applied, CatalogEngine, LoadStatus};
pub use crate::config::{CatalogConfig, MergePolicy};
pub use crate::notification::{LogNotifier, MemoryNotifier, Notifier};
pub use crate::overlay_store::{AppDbState, MemoryOverlayStore, OverlayKey, OverlayStore};
pub use crate::product_gateway::{HttpProductGateway, ProductGateway};
pub use crate::product_model::{Page, Product, ProductDraft, ProductFilter, ProductId};
pub use crate::reconciliation::OverlayState;
pub use crate::request_task::{Begin, SessionId, Ticket};
