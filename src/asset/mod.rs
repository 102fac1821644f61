//! Assets and asset collections.
//!
//! An asset is a named file-like payload, either referenced by path or held
//! inline. Collections keep `(relative_path, filename)` unique and reject
//! duplicates when they are added, not when the owner is submitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entity::{impl_content_eq, Entity, EntityMeta, ItemType};
use crate::error::ValidationError;

/// A single file-like payload.
///
/// # Examples
///
/// ```
/// use idmtools::Asset;
///
/// let asset = Asset::from_content("config.json", b"{}".to_vec())
///     .unwrap()
///     .with_relative_path("/inputs/");
/// assert_eq!(asset.relative_path(), "inputs");
/// assert_eq!(asset.extension(), "json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    absolute_path: Option<PathBuf>,

    #[serde(default)]
    relative_path: String,

    filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Vec<u8>>,
}

impl Asset {
    /// References a file on disk. The filename defaults to the path's last
    /// component.
    ///
    /// # Errors
    /// Returns [`ValidationError::AssetWithoutSource`] if the path has no
    /// file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or(ValidationError::AssetWithoutSource)?
            .to_string();
        Ok(Self {
            absolute_path: Some(path),
            relative_path: String::new(),
            filename,
            content: None,
        })
    }

    /// Creates an inline asset.
    ///
    /// # Errors
    /// Returns [`ValidationError::AssetWithoutSource`] if the filename is empty.
    pub fn from_content(
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Self, ValidationError> {
        let filename = filename.into();
        if filename.trim().is_empty() {
            return Err(ValidationError::AssetWithoutSource);
        }
        Ok(Self {
            absolute_path: None,
            relative_path: String::new(),
            filename,
            content: Some(content.into()),
        })
    }

    /// Sets the path relative to the item's working directory.
    ///
    /// Surrounding spaces and slashes are stripped.
    #[must_use]
    pub fn with_relative_path(mut self, relative_path: impl AsRef<str>) -> Self {
        self.relative_path = normalize_relative(relative_path.as_ref());
        self
    }

    #[must_use]
    pub fn absolute_path(&self) -> Option<&Path> {
        self.absolute_path.as_deref()
    }

    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Lowercased extension without the dot; empty if there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// Hex blake3 digest of inline content. `None` for path-only assets.
    #[must_use]
    pub fn checksum(&self) -> Option<String> {
        self.content
            .as_deref()
            .map(|bytes| blake3::hash(bytes).to_hex().to_string())
    }

    /// Uniqueness key within a collection.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.relative_path, &self.filename)
    }
}

fn normalize_relative(path: &str) -> String {
    path.trim_matches(|c: char| c == ' ' || c == '/' || c == '\\')
        .to_string()
}

/// Ordered collection of uniquely keyed assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetCollection {
    #[serde(default)]
    meta: EntityMeta,

    #[serde(default)]
    assets: Vec<Asset>,

    #[serde(default)]
    locked: bool,
}

impl_content_eq!(AssetCollection);

impl Entity for AssetCollection {
    const ITEM_TYPE: ItemType = ItemType::AssetCollection;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl AssetCollection {
    /// Creates an empty, unlocked collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection, rejecting duplicate keys.
    ///
    /// # Errors
    /// Returns [`ValidationError::DuplicateAsset`] on the first repeated key.
    pub fn from_assets(assets: impl IntoIterator<Item = Asset>) -> Result<Self, ValidationError> {
        let mut collection = Self::new();
        collection.add_assets(assets, true)?;
        Ok(collection)
    }

    /// Adds an asset.
    ///
    /// With `fail_on_duplicate` a repeated `(relative_path, filename)` is an
    /// error; otherwise the asset already present is kept. Returns whether the
    /// asset was inserted.
    ///
    /// # Errors
    /// - [`ValidationError::AssetCollectionLocked`] once the collection is locked
    /// - [`ValidationError::DuplicateAsset`] on a repeated key when `fail_on_duplicate`
    pub fn add_asset(&mut self, asset: Asset, fail_on_duplicate: bool) -> Result<bool, ValidationError> {
        self.ensure_unlocked()?;
        if self.contains(asset.relative_path(), asset.filename()) {
            if fail_on_duplicate {
                return Err(ValidationError::DuplicateAsset {
                    relative_path: asset.relative_path.clone(),
                    filename: asset.filename.clone(),
                });
            }
            log::debug!(
                "skipping duplicate asset {}/{}",
                asset.relative_path(),
                asset.filename()
            );
            return Ok(false);
        }
        self.assets.push(asset);
        Ok(true)
    }

    /// Adds many assets with the same duplicate policy.
    ///
    /// With `fail_on_duplicate` the collection is left untouched on error.
    ///
    /// # Errors
    /// See [`AssetCollection::add_asset`].
    pub fn add_assets(
        &mut self,
        assets: impl IntoIterator<Item = Asset>,
        fail_on_duplicate: bool,
    ) -> Result<(), ValidationError> {
        self.ensure_unlocked()?;
        let mut staged = self.clone();
        for asset in assets {
            staged.add_asset(asset, fail_on_duplicate)?;
        }
        self.assets = staged.assets;
        Ok(())
    }

    /// Returns a new unlocked collection holding `self` then every asset of
    /// `other` whose key is not already present.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = Self {
            meta: EntityMeta::default(),
            assets: self.assets.clone(),
            locked: false,
        };
        for asset in &other.assets {
            if !merged.contains(asset.relative_path(), asset.filename()) {
                merged.assets.push(asset.clone());
            }
        }
        merged
    }

    /// Removes and returns the asset with the given key.
    ///
    /// # Errors
    /// Returns [`ValidationError::AssetCollectionLocked`] once locked.
    pub fn remove(
        &mut self,
        relative_path: &str,
        filename: &str,
    ) -> Result<Option<Asset>, ValidationError> {
        self.ensure_unlocked()?;
        let relative_path = normalize_relative(relative_path);
        let position = self
            .assets
            .iter()
            .position(|a| a.relative_path == relative_path && a.filename == filename);
        Ok(position.map(|idx| self.assets.remove(idx)))
    }

    #[must_use]
    pub fn get(&self, relative_path: &str, filename: &str) -> Option<&Asset> {
        let relative_path = normalize_relative(relative_path);
        self.assets
            .iter()
            .find(|a| a.relative_path == relative_path && a.filename == filename)
    }

    #[must_use]
    pub fn contains(&self, relative_path: &str, filename: &str) -> bool {
        self.get(relative_path, filename).is_some()
    }

    /// Forbids further changes. Called when the owner is submitted.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Asset> {
        self.assets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn ensure_unlocked(&self) -> Result<(), ValidationError> {
        if self.locked {
            return Err(ValidationError::AssetCollectionLocked);
        }
        Ok(())
    }
}

impl IntoIterator for AssetCollection {
    type Item = Asset;
    type IntoIter = std::vec::IntoIter<Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.assets.into_iter()
    }
}

impl<'a> IntoIterator for &'a AssetCollection {
    type Item = &'a Asset;
    type IntoIter = std::slice::Iter<'a, Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.assets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(name: &str, body: &str) -> Asset {
        Asset::from_content(name, body.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_asset_from_path_uses_file_name() {
        let asset = Asset::from_path("/models/run/model.py").unwrap();
        assert_eq!(asset.filename(), "model.py");
        assert_eq!(asset.extension(), "py");
        assert!(asset.checksum().is_none());
    }

    #[test]
    fn test_asset_requires_source() {
        assert!(matches!(
            Asset::from_content("  ", Vec::<u8>::new()),
            Err(ValidationError::AssetWithoutSource)
        ));
    }

    #[test]
    fn test_relative_path_is_trimmed() {
        let asset = inline("a.txt", "x").with_relative_path(" \\inputs/data/ ");
        assert_eq!(asset.relative_path(), "inputs/data");
    }

    #[test]
    fn test_duplicate_rejected_at_add_time() {
        let mut collection = AssetCollection::new();
        collection.add_asset(inline("a.txt", "1"), true).unwrap();
        let err = collection.add_asset(inline("a.txt", "2"), true).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateAsset { .. }));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_same_name_different_directory_allowed() {
        let mut collection = AssetCollection::new();
        collection.add_asset(inline("a.txt", "1"), true).unwrap();
        collection
            .add_asset(inline("a.txt", "2").with_relative_path("sub"), true)
            .unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_duplicate_kept_first_when_tolerated() {
        let mut collection = AssetCollection::new();
        collection.add_asset(inline("a.txt", "1"), false).unwrap();
        let inserted = collection.add_asset(inline("a.txt", "2"), false).unwrap();
        assert!(!inserted);
        assert_eq!(collection.get("", "a.txt").unwrap().content(), Some(&b"1"[..]));
    }

    #[test]
    fn test_add_assets_is_all_or_nothing() {
        let mut collection = AssetCollection::new();
        let result = collection.add_assets(
            vec![inline("a.txt", "1"), inline("b.txt", "2"), inline("a.txt", "3")],
            true,
        );
        assert!(result.is_err());
        assert!(collection.is_empty());
    }

    #[test]
    fn test_union_is_left_biased() {
        let left = AssetCollection::from_assets(vec![inline("a.txt", "left")]).unwrap();
        let right =
            AssetCollection::from_assets(vec![inline("a.txt", "right"), inline("b.txt", "b")])
                .unwrap();
        let merged = left.union(&right);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("", "a.txt").unwrap().content(), Some(&b"left"[..]));
        assert_eq!(left.len(), 1);
    }

    #[test]
    fn test_locked_collection_rejects_changes() {
        let mut collection = AssetCollection::from_assets(vec![inline("a.txt", "1")]).unwrap();
        collection.lock();
        assert!(matches!(
            collection.add_asset(inline("b.txt", "2"), true),
            Err(ValidationError::AssetCollectionLocked)
        ));
        assert!(collection.remove("", "a.txt").is_err());
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut collection = AssetCollection::from_assets(vec![inline("a.txt", "1")]).unwrap();
        let removed = collection.remove("/", "a.txt").unwrap();
        assert!(removed.is_some());
        assert!(collection.is_empty());
    }

    #[test]
    fn test_checksum_of_inline_content() {
        let a = inline("a.txt", "same");
        let b = inline("b.txt", "same");
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_collection_moves_into_another() {
        let source =
            AssetCollection::from_assets(vec![inline("a.txt", "1"), inline("b.txt", "2")]).unwrap();
        let mut target = AssetCollection::from_assets(vec![inline("c.txt", "3")]).unwrap();
        target.add_assets(source, true).unwrap();
        let names: Vec<&str> = target.iter().map(Asset::filename).collect();
        assert_eq!(names, ["c.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_collection_content_equality() {
        let a = AssetCollection::from_assets(vec![inline("a.txt", "1")]).unwrap();
        let b = AssetCollection::from_assets(vec![inline("a.txt", "1")]).unwrap();
        assert_eq!(a, b);
    }
}
