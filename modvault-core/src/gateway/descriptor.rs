//! Static table mapping opaque download keys to upstream resources.
//!
//! This table is the only place an upstream location lives. Keys are what
//! clients see; URLs never leave the server.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::catalog::{Product, ProductId};

/// Errors raised while building or loading the descriptor table.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Download key must not be empty")]
    EmptyKey,

    #[error("Download key '{key}' must be an opaque name, not a location")]
    KeyLooksLikeUrl { key: String },

    #[error("Invalid filename for '{key}': {reason}")]
    InvalidFilename { key: String, reason: String },

    #[error("Invalid upstream for '{key}': {reason}")]
    InvalidUpstream { key: String, reason: String },

    #[error("Failed to read download table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse download table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One downloadable resource.
#[derive(Clone)]
pub struct DownloadDescriptor {
    key: String,
    upstream_url: String,
    filename: String,
}

impl DownloadDescriptor {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name the client is told to save the file as.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// `Content-Disposition` value for this resource.
    ///
    /// The quoted `filename` carries the name verbatim (quotes and
    /// backslashes escaped); `filename*` repeats it percent-encoded for
    /// clients that prefer RFC 5987.
    pub fn content_disposition(&self) -> String {
        let quoted = self.filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "attachment; filename=\"{quoted}\"; filename*=UTF-8''{}",
            urlencoding::encode(&self.filename)
        )
    }
}

impl fmt::Debug for DownloadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadDescriptor")
            .field("key", &self.key)
            .field("upstream_url", &"<redacted>")
            .field("filename", &self.filename)
            .finish()
    }
}

/// Product whose download key has no descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndownloadableProduct {
    pub product_id: ProductId,
    pub download_key: String,
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(default)]
    downloads: BTreeMap<String, DescriptorEntry>,
}

#[derive(Debug, Deserialize)]
struct DescriptorEntry {
    upstream_url: String,
    filename: String,
}

/// Key → descriptor lookup table, immutable once the server starts.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    entries: HashMap<String, DownloadDescriptor>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table shipped with the binary, used when no download file is configured.
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        for (key, upstream_url, filename) in [
            (
                "kimdog-preset",
                "https://www.dropbox.com/scl/fi/lq0ym8h9hn4ljc5cvc5b5/KimDog_Personal.ini?rlkey=pdai9vbt11ns7dcpw48ggbkex&st=9am2td53&dl=1",
                "KimDog_Personal.ini",
            ),
            (
                "ac-drift-car-pack",
                "https://www.dropbox.com/scl/fi/emsk38q7melrbe459f0zy/KimDog-s-Car-Pack.rar?rlkey=27n4vz55me0ex9vt1gflz86g0&st=cgiocfs7&dl=1",
                "KimDog-Car-Pack.rar",
            ),
        ] {
            entries.insert(
                key.to_string(),
                DownloadDescriptor {
                    key: key.to_string(),
                    upstream_url: upstream_url.to_string(),
                    filename: filename.to_string(),
                },
            );
        }
        Self { entries }
    }

    /// Parses a TOML download table.
    ///
    /// ```toml
    /// [downloads.kimdog-preset]
    /// upstream_url = "https://files.example.com/KimDog_Personal.ini"
    /// filename = "KimDog_Personal.ini"
    /// ```
    ///
    /// # Errors
    /// - `DescriptorError::Parse` - Not valid TOML or missing fields
    /// - Any validation error from [`DescriptorTable::insert`]
    pub fn from_toml_str(raw: &str) -> Result<Self, DescriptorError> {
        let file: DescriptorFile = toml::from_str(raw)?;
        let mut table = Self::new();
        for (key, entry) in file.downloads {
            table.insert(&key, &entry.upstream_url, &entry.filename)?;
        }
        Ok(table)
    }

    /// Loads a TOML download table from disk.
    ///
    /// # Errors
    /// - `DescriptorError::Io` - File could not be read
    /// - Any error from [`DescriptorTable::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Validates and adds one descriptor, replacing any entry with the same key.
    ///
    /// # Errors
    /// - `DescriptorError::EmptyKey` - Key is blank
    /// - `DescriptorError::KeyLooksLikeUrl` - Key contains a scheme or equals the upstream
    /// - `DescriptorError::InvalidUpstream` - Upstream is not an absolute http(s) URL
    /// - `DescriptorError::InvalidFilename` - Filename empty, or contains control characters or path separators
    pub fn insert(
        &mut self,
        key: &str,
        upstream_url: &str,
        filename: &str,
    ) -> Result<(), DescriptorError> {
        validate_key(key, upstream_url)?;
        validate_upstream(key, upstream_url)?;
        validate_filename(key, filename)?;

        self.entries.insert(
            key.to_string(),
            DownloadDescriptor {
                key: key.to_string(),
                upstream_url: upstream_url.to_string(),
                filename: filename.to_string(),
            },
        );
        Ok(())
    }

    /// Re-runs validation over every entry.
    ///
    /// # Errors
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        for descriptor in self.entries.values() {
            validate_key(&descriptor.key, &descriptor.upstream_url)?;
            validate_upstream(&descriptor.key, &descriptor.upstream_url)?;
            validate_filename(&descriptor.key, &descriptor.filename)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&DownloadDescriptor> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Known keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Lists products whose download key has no descriptor.
    pub fn audit<'a>(
        &self,
        products: impl IntoIterator<Item = &'a Product>,
    ) -> Vec<UndownloadableProduct> {
        products
            .into_iter()
            .filter(|p| !self.contains(&p.download_key))
            .map(|p| UndownloadableProduct {
                product_id: p.product_id.clone(),
                download_key: p.download_key.clone(),
            })
            .collect()
    }
}

fn validate_key(key: &str, upstream_url: &str) -> Result<(), DescriptorError> {
    if key.trim().is_empty() {
        return Err(DescriptorError::EmptyKey);
    }
    if key.contains("://") || key == upstream_url {
        return Err(DescriptorError::KeyLooksLikeUrl {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn validate_upstream(key: &str, upstream_url: &str) -> Result<(), DescriptorError> {
    let invalid = |reason: &str| DescriptorError::InvalidUpstream {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(upstream_url).map_err(|_| invalid("not an absolute URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn validate_filename(key: &str, filename: &str) -> Result<(), DescriptorError> {
    let invalid = |reason: &str| DescriptorError::InvalidFilename {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if filename.trim().is_empty() || filename == "." || filename == ".." {
        return Err(invalid("empty"));
    }
    if filename.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }
    if filename.contains(['/', '\\']) {
        return Err(invalid("contains a path separator"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = DescriptorTable::builtin();
        table.validate().unwrap();
        assert_eq!(table.keys(), vec!["ac-drift-car-pack", "kimdog-preset"]);
        assert_eq!(
            table.get("kimdog-preset").unwrap().filename(),
            "KimDog_Personal.ini"
        );
    }

    #[test]
    fn test_debug_redacts_upstream() {
        let table = DescriptorTable::builtin();
        let rendered = format!("{:?}", table.get("kimdog-preset").unwrap());
        assert!(!rendered.contains("dropbox"));
        assert!(rendered.contains("KimDog_Personal.ini"));
    }

    #[test]
    fn test_content_disposition_keeps_filename_verbatim() {
        let mut table = DescriptorTable::new();
        table
            .insert("preset", "https://files.example.com/a", "KimDog_Personal.ini")
            .unwrap();
        table
            .insert("pack", "https://files.example.com/b", "KimDog's Päck \"v2\".rar")
            .unwrap();

        let simple = table.get("preset").unwrap().content_disposition();
        assert!(simple.starts_with("attachment; filename=\"KimDog_Personal.ini\";"));

        let fancy = table.get("pack").unwrap().content_disposition();
        assert!(fancy.contains("filename=\"KimDog's Päck \\\"v2\\\".rar\""));
        assert!(fancy.contains("filename*=UTF-8''KimDog%27s%20P%C3%A4ck%20%22v2%22.rar"));
    }

    #[test]
    fn test_toml_table_parses() {
        let table = DescriptorTable::from_toml_str(
            r#"
            [downloads.kimdog-preset]
            upstream_url = "https://files.example.com/KimDog_Personal.ini"
            filename = "KimDog_Personal.ini"

            [downloads.ats-kimdog-mega-map]
            upstream_url = "http://mirror.example.net/maps/mega.zip"
            filename = "KimDog Mega Map.zip"
            "#,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains("ats-kimdog-mega-map"));
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        let mut table = DescriptorTable::new();

        assert!(matches!(
            table.insert(" ", "https://files.example.com/a", "a.ini"),
            Err(DescriptorError::EmptyKey)
        ));
        assert!(matches!(
            table.insert("https://files.example.com/a", "https://files.example.com/a", "a.ini"),
            Err(DescriptorError::KeyLooksLikeUrl { .. })
        ));
        assert!(matches!(
            table.insert("a", "ftp://files.example.com/a", "a.ini"),
            Err(DescriptorError::InvalidUpstream { .. })
        ));
        assert!(matches!(
            table.insert("a", "files/a.ini", "a.ini"),
            Err(DescriptorError::InvalidUpstream { .. })
        ));
        assert!(matches!(
            table.insert("a", "https://files.example.com/a", "../a.ini"),
            Err(DescriptorError::InvalidFilename { .. })
        ));
        assert!(matches!(
            table.insert("a", "https://files.example.com/a", "a\r\nSet-Cookie: x"),
            Err(DescriptorError::InvalidFilename { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_audit_reports_products_without_descriptor() {
        let table = DescriptorTable::builtin();
        let products = vec![
            Product {
                product_id: ProductId::new("kimdog-preset"),
                name: "KimDog's Reshade Preset".to_string(),
                author: "KimDog Studios".to_string(),
                image: "/reshade.png".to_string(),
                game: Some("Reshade".to_string()),
                download_key: "kimdog-preset".to_string(),
                description: None,
                last_updated: None,
            },
            Product {
                product_id: ProductId::new("ats-kimdog-mega-map"),
                name: "KimDog's Mega Map".to_string(),
                author: "KimDog Studios".to_string(),
                image: "/kimdog.png".to_string(),
                game: Some("American Truck Simulator".to_string()),
                download_key: "ats-kimdog-mega-map".to_string(),
                description: None,
                last_updated: None,
            },
        ];

        let missing = table.audit(&products);

        assert_eq!(
            missing,
            vec![UndownloadableProduct {
                product_id: ProductId::new("ats-kimdog-mega-map"),
                download_key: "ats-kimdog-mega-map".to_string(),
            }]
        );
    }
}
