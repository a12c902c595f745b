//! Navigation providers for many areas

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use navi_common::{Error, Result};

use crate::config::NaviConfig;
use crate::provider::NaviProvider;

/// Keeps one loaded provider per area
#[derive(Debug, Default)]
pub struct NaviRegistry {
    config: NaviConfig,
    providers: HashMap<String, Arc<NaviProvider>>,
}

impl NaviRegistry {
    pub fn new(config: NaviConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NaviConfig {
        &self.config
    }

    /// Loads the mesh of one area and registers its provider
    pub fn load_area(&mut self, area: &str) -> Result<Arc<NaviProvider>> {
        let mut provider = NaviProvider::new(area, self.config.clone());
        provider.init()?;
        let provider = Arc::new(provider);
        self.providers.insert(area.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Loads every listed area, skipping those whose mesh is missing or
    /// broken. Returns how many areas were loaded.
    pub fn load_areas<I, S>(&mut self, areas: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut loaded = 0;
        for area in areas {
            let area = area.as_ref();
            match self.load_area(area) {
                Ok(_) => loaded += 1,
                Err(Error::MissingAsset(path)) => {
                    log::warn!("No navigation mesh for {} at {}", area, path);
                }
                Err(e) => {
                    log::warn!("Skipping area {}: {}", area, e);
                }
            }
        }
        loaded
    }

    /// Loads every area folder found under the mesh root
    pub fn discover(&mut self) -> Result<usize> {
        let mut areas = Vec::new();
        for entry in fs::read_dir(&self.config.mesh_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.config.asset_path(name).is_file() {
                    areas.push(name.to_string());
                }
            }
        }
        areas.sort();
        Ok(self.load_areas(areas))
    }

    /// Provider of an area, if it loaded
    pub fn get(&self, area: &str) -> Option<Arc<NaviProvider>> {
        self.providers.get(area).cloned()
    }

    /// Names of the loaded areas, sorted
    pub fn areas(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_mesh::test_mesh_helpers::{build_mesh_set, open_field, two_tile_strip, write_area_file};

    #[test]
    fn test_bad_areas_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_area_file(dir.path(), "field", &build_mesh_set(&[open_field(3)])?)?;
        write_area_file(dir.path(), "strip", &build_mesh_set(&two_tile_strip())?)?;
        let mut broken = build_mesh_set(&[open_field(3)])?;
        broken.truncate(broken.len() / 2);
        write_area_file(dir.path(), "broken", &broken)?;

        let mut registry = NaviRegistry::new(NaviConfig::with_mesh_path(dir.path()));
        let loaded = registry.load_areas(["field", "broken", "missing", "strip"]);
        assert_eq!(loaded, 2);
        assert_eq!(registry.areas(), vec!["field", "strip"]);
        assert!(registry.get("broken").is_none());
        assert!(registry.get("missing").is_none());

        let strip = registry.get("strip").ok_or(Error::MissingAsset("strip".into()))?;
        assert!(strip.has_navi_mesh());
        Ok(())
    }

    #[test]
    fn test_discover_area_folders() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_area_file(dir.path(), "a", &build_mesh_set(&[open_field(2)])?)?;
        write_area_file(dir.path(), "b", &build_mesh_set(&[open_field(2)])?)?;
        fs::create_dir(dir.path().join("empty"))?;
        fs::write(dir.path().join("notes.txt"), "not an area")?;

        let mut registry = NaviRegistry::new(NaviConfig::with_mesh_path(dir.path()));
        assert_eq!(registry.discover()?, 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.areas(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_shared_provider() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_area_file(dir.path(), "field", &build_mesh_set(&[open_field(2)])?)?;
        let mut registry = NaviRegistry::new(NaviConfig::with_mesh_path(dir.path()));
        let loaded = registry.load_area("field")?;
        let looked_up = registry.get("field").ok_or(Error::MissingAsset("field".into()))?;
        assert!(Arc::ptr_eq(&loaded, &looked_up));
        assert!(registry.load_area("other").is_err());
        assert_eq!(registry.len(), 1);
        Ok(())
    }
}
