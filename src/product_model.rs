//! Catalog data model.
//!
//! [`Product`] is the typed form of a remote catalog entry. It is decoded at the
//! gateway boundary and is also the shape written into the overlay store, so a
//! product read back after a restart is the same value that was displayed before it.
//!
//! Products are value objects: two products are equal when their ids are equal,
//! regardless of the other fields. This is what lets the reconciliation rules treat
//! a locally edited copy and the remote one as "the same product".

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;

/// Identifier of a product, assigned by the remote service or by the client clock.
pub type ProductId = i64;

/// A catalog entry.
///
/// # Wire format
///
/// ```json
/// {
///   "id": 1,
///   "title": "Fjallraven Backpack",
///   "description": "Your perfect pack for everyday use",
///   "price": 109.95,
///   "image": "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
///   "category": "men's clothing"
/// }
/// ```
///
/// `id`, `title` and `price` are required. A missing `description` decodes as an
/// empty string, `image` and `category` are optional, and unknown fields such as the
/// remote `rating` object are ignored.
///
/// ```rust
/// use offline_catalog_core::product_model::Product;
///
/// let product: Product = serde_json::from_str(
///     r#"{"id":7,"title":"Lamp","price":12.5,"rating":{"rate":4.1,"count":3}}"#,
/// )?;
/// assert_eq!(product.id, 7);
/// assert_eq!(product.description, "");
/// assert!(product.category.is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PartialEq for Product {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Product {}

impl Product {
    /// Builds a product from a draft and an id chosen elsewhere.
    pub fn from_draft(id: ProductId, draft: ProductDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            price: draft.price,
            image: draft.image,
            category: draft.category,
        }
    }

    pub fn to_draft(&self) -> ProductDraft {
        ProductDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price,
            image: self.image.clone(),
            category: self.category.clone(),
        }
    }
}

/// Body of a create or full-replace update. Carries no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ProductDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>, price: f64) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            price,
            image: None,
            category: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Checks the fields a form would mark as required.
    ///
    /// Price sign is a convention only and is not checked.
    pub fn validate(&self) -> Result<(), AppResponse> {
        if self.title.trim().is_empty() {
            return Err(AppResponse::ValidationError("title is required".to_string()));
        }
        if !self.price.is_finite() {
            return Err(AppResponse::ValidationError(format!(
                "price must be a finite number, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Transient merge-time criteria. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search_query: Option<String>,
}

impl ProductFilter {
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_price_range(mut self, min_price: Option<f64>, max_price: Option<f64>) -> Self {
        self.min_price = min_price;
        self.max_price = max_price;
        self
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        active(&self.category).is_none()
            && active(&self.search_query).is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    /// Inclusive price range, exact category, case-insensitive title substring.
    /// Blank strings do not constrain anything.
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(min) = self.min_price {
            if product.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if product.price > max {
                return false;
            }
        }
        if let Some(category) = active(&self.category) {
            if product.category.as_deref() != Some(category) {
                return false;
            }
        }
        match active(&self.search_query) {
            Some(query) => title_matches(product, query),
            None => true,
        }
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

pub(crate) fn title_matches(product: &Product, query: &str) -> bool {
    product
        .title
        .to_lowercase()
        .contains(&query.trim().to_lowercase())
}

/// One page of a list view. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    /// Slices `all` into the requested page. Page 0 is read as page 1, a page past
    /// the end is empty but still reports the totals.
    pub fn paginate(all: &[T], page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(page_size);
        let start = (page - 1).saturating_mul(page_size);
        let items = if start >= total_items {
            Vec::new()
        } else {
            all[start..(start + page_size).min(total_items)].to_vec()
        };

        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1 && self.total_pages > 0
    }
}
