//! Purchase ledger, product catalog, and entitlement view types.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::batch::Keyed;

/// Opaque identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw identifier as supplied by the identity provider.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only ids identify nobody.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog identifier of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One successful acquisition of a product by a user.
///
/// Optional fields are a snapshot taken at purchase time. When present they
/// take precedence over the current catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub download_key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
}

impl Purchase {
    /// Creates a bare purchase record with no snapshot fields.
    pub fn new(user_id: UserId, product_id: ProductId) -> Self {
        Self {
            user_id,
            product_id,
            timestamp: None,
            name: None,
            author: None,
            game: None,
            download_key: None,
            description: None,
            last_updated: None,
        }
    }
}

/// Catalog entry for a purchasable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub game: Option<String>,
    /// Opaque key into the download descriptor table, never a URL.
    pub download_key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
}

impl Keyed for Product {
    type Key = ProductId;

    fn key(&self) -> ProductId {
        self.product_id.clone()
    }
}

/// A product the user owns, merged from purchase snapshot and catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedProduct {
    pub product_id: ProductId,
    pub name: String,
    pub author: String,
    pub image: String,
    pub game: String,
    /// `None` when neither purchase nor catalog names a download key.
    pub download_key: Option<String>,
    pub description: Option<String>,
    pub last_updated: Option<NaiveDate>,
    pub purchased_at: Option<DateTime<Utc>>,
}

impl OwnedProduct {
    pub fn is_downloadable(&self) -> bool {
        self.download_key.is_some()
    }
}

/// Owned products sharing one game label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameGroup {
    pub game: String,
    pub products: Vec<OwnedProduct>,
}

/// Per-request view of everything a user may download, grouped by game.
///
/// Groups are sorted by game label, no group is empty and no product id
/// appears twice across the whole view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntitlementView {
    groups: Vec<GameGroup>,
}

impl EntitlementView {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a view from already-deduplicated products.
    ///
    /// Group order is the lexicographic order of the labels; products keep
    /// their incoming order within a group.
    pub fn from_products(products: Vec<OwnedProduct>) -> Self {
        let mut grouped: std::collections::BTreeMap<String, Vec<OwnedProduct>> =
            std::collections::BTreeMap::new();
        for product in products {
            grouped
                .entry(product.game.clone())
                .or_default()
                .push(product);
        }

        Self {
            groups: grouped
                .into_iter()
                .map(|(game, products)| GameGroup { game, products })
                .collect(),
        }
    }

    pub fn groups(&self) -> &[GameGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of owned products across all groups.
    pub fn product_count(&self) -> usize {
        self.groups.iter().map(|g| g.products.len()).sum()
    }

    pub fn products(&self) -> impl Iterator<Item = &OwnedProduct> {
        self.groups.iter().flat_map(|g| g.products.iter())
    }

    /// Whether the view grants access to the given download key.
    pub fn grants(&self, download_key: &str) -> bool {
        self.products()
            .any(|p| p.download_key.as_deref() == Some(download_key))
    }
}
