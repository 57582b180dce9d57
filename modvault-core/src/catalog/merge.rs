//! Merging purchase snapshots with catalog entries.

use url::Url;

use super::types::{OwnedProduct, Product, Purchase};
use crate::config::CatalogConfig;

const UNTITLED: &str = "Untitled Mod";
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Fallback labels and image policy applied while merging.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    unknown_game: String,
    default_image: String,
    trusted_image_hosts: Vec<String>,
}

impl MergePolicy {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            unknown_game: config.unknown_game_label.clone(),
            default_image: config.default_image.clone(),
            trusted_image_hosts: config
                .trusted_image_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn unknown_game(&self) -> &str {
        &self.unknown_game
    }

    /// Merges one purchase with its catalog entry, if the catalog had one.
    ///
    /// A purchase field that is present and non-blank wins over the catalog.
    /// The image always comes from the catalog and is sanitized.
    pub fn merge(&self, purchase: &Purchase, product: Option<&Product>) -> OwnedProduct {
        let name = pick(purchase.name.as_deref(), product.map(|p| p.name.as_str()))
            .unwrap_or(UNTITLED);
        let author = pick(purchase.author.as_deref(), product.map(|p| p.author.as_str()))
            .unwrap_or(UNKNOWN_AUTHOR);
        let game = pick(purchase.game.as_deref(), product.and_then(|p| p.game.as_deref()))
            .unwrap_or(self.unknown_game.as_str());
        let download_key = pick(
            purchase.download_key.as_deref(),
            product.map(|p| p.download_key.as_str()),
        );
        let description = pick(
            purchase.description.as_deref(),
            product.and_then(|p| p.description.as_deref()),
        );

        OwnedProduct {
            product_id: purchase.product_id.clone(),
            name: name.to_string(),
            author: author.to_string(),
            image: self.sanitize_image(product.map(|p| p.image.as_str())),
            game: game.to_string(),
            download_key: download_key.map(str::to_string),
            description: description.map(str::to_string),
            last_updated: purchase
                .last_updated
                .or_else(|| product.and_then(|p| p.last_updated)),
            purchased_at: purchase.timestamp,
        }
    }

    /// Keeps https images on trusted hosts and site-relative paths.
    ///
    /// Anything else (plain http, unknown hosts, protocol-relative or
    /// unparseable values) is replaced by the default image.
    pub fn sanitize_image(&self, image: Option<&str>) -> String {
        let Some(image) = image.map(str::trim).filter(|i| !i.is_empty()) else {
            return self.default_image.clone();
        };

        if image.starts_with('/') && !image.starts_with("//") && !image.starts_with("/\\") {
            return image.to_string();
        }

        match Url::parse(image) {
            Ok(url)
                if url.scheme() == "https"
                    && url.host_str().is_some_and(|host| {
                        self.trusted_image_hosts
                            .iter()
                            .any(|trusted| trusted.eq_ignore_ascii_case(host))
                    }) =>
            {
                image.to_string()
            }
            _ => self.default_image.clone(),
        }
    }
}

fn pick<'a>(preferred: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    preferred
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.filter(|v| !v.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::catalog::types::{ProductId, UserId};

    fn policy() -> MergePolicy {
        MergePolicy::from_config(&CatalogConfig::default())
    }

    fn product() -> Product {
        Product {
            product_id: ProductId::new("kimdog-preset"),
            name: "KimDog's Reshade Preset".to_string(),
            author: "KimDog Studios".to_string(),
            image: "https://raw.githubusercontent.com/kimdog/assets/main/reshade.png".to_string(),
            game: Some("Reshade".to_string()),
            download_key: "kimdog-preset".to_string(),
            description: Some("Catalog description".to_string()),
            last_updated: NaiveDate::from_ymd_opt(2025, 7, 12),
        }
    }

    #[test]
    fn test_purchase_snapshot_overrides_catalog() {
        let mut purchase = Purchase::new(UserId::new("u1"), ProductId::new("kimdog-preset"));
        purchase.name = Some("Preset (launch edition)".to_string());
        purchase.last_updated = NaiveDate::from_ymd_opt(2025, 6, 1);

        let owned = policy().merge(&purchase, Some(&product()));

        assert_eq!(owned.name, "Preset (launch edition)");
        assert_eq!(owned.author, "KimDog Studios");
        assert_eq!(owned.game, "Reshade");
        assert_eq!(owned.download_key.as_deref(), Some("kimdog-preset"));
        assert_eq!(owned.description.as_deref(), Some("Catalog description"));
        assert_eq!(owned.last_updated, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn test_blank_snapshot_fields_fall_back_to_catalog() {
        let mut purchase = Purchase::new(UserId::new("u1"), ProductId::new("kimdog-preset"));
        purchase.game = Some("   ".to_string());

        let owned = policy().merge(&purchase, Some(&product()));
        assert_eq!(owned.game, "Reshade");
    }

    #[test]
    fn test_missing_catalog_entry_uses_defaults() {
        let purchase = Purchase::new(UserId::new("u1"), ProductId::new("retired-mod"));

        let owned = policy().merge(&purchase, None);

        assert_eq!(owned.name, "Untitled Mod");
        assert_eq!(owned.author, "Unknown Author");
        assert_eq!(owned.game, "Unknown Game");
        assert_eq!(owned.image, "/default-mod-icon.png");
        assert!(!owned.is_downloadable());
    }

    #[test]
    fn test_image_sanitizing() {
        let policy = policy();

        assert_eq!(
            policy.sanitize_image(Some("https://upload.wikimedia.org/a.png")),
            "https://upload.wikimedia.org/a.png"
        );
        assert_eq!(policy.sanitize_image(Some("/drift-car-pack.jpg")), "/drift-car-pack.jpg");
        assert_eq!(
            policy.sanitize_image(Some("http://upload.wikimedia.org/a.png")),
            "/default-mod-icon.png"
        );
        assert_eq!(
            policy.sanitize_image(Some("https://evil.example/a.png")),
            "/default-mod-icon.png"
        );
        assert_eq!(
            policy.sanitize_image(Some("//evil.example/a.png")),
            "/default-mod-icon.png"
        );
        assert_eq!(policy.sanitize_image(Some("javascript:alert(1)")), "/default-mod-icon.png");
        assert_eq!(policy.sanitize_image(None), "/default-mod-icon.png");
    }
}
