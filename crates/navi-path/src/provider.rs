//! Per-area navigation service

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use navi_common::{Error, Result};
use navi_mesh::{load_nav_mesh_set, NavMesh, NavMeshQuery};

use crate::config::NaviConfig;
use crate::corridor::Corridor;
use crate::off_mesh::OffMeshConnectionHandler;
use crate::smoother::PathSmoother;

/// Answers follow-path requests for one area
///
/// The mesh is loaded once and shared read-only; every request builds its
/// own query context, so a provider can serve concurrent callers.
#[derive(Debug)]
pub struct NaviProvider {
    area: String,
    config: NaviConfig,
    nav_mesh: Option<Arc<NavMesh>>,
}

impl NaviProvider {
    /// Creates a provider without a mesh
    pub fn new<S: Into<String>>(area: S, config: NaviConfig) -> Self {
        Self {
            area: area.into(),
            config,
            nav_mesh: None,
        }
    }

    /// Creates a provider serving an already built mesh
    pub fn with_nav_mesh<S: Into<String>>(area: S, config: NaviConfig, nav_mesh: NavMesh) -> Self {
        Self {
            area: area.into(),
            config,
            nav_mesh: Some(Arc::new(nav_mesh)),
        }
    }

    /// Loads the area's mesh from `{mesh_path}/{area}/{area}.nav`
    pub fn init(&mut self) -> Result<()> {
        let folder = self.config.mesh_path.join(&self.area);
        if !folder.is_dir() {
            return Err(Error::MissingAsset(folder.display().to_string()));
        }
        let path = self.config.asset_path(&self.area);
        self.load_mesh(path)
    }

    /// Loads a mesh set file, replacing any mesh already held.
    ///
    /// On failure the provider is left without a mesh.
    pub fn load_mesh<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.nav_mesh = None;
        let path = path.as_ref();
        match load_nav_mesh_set(path) {
            Ok(nav_mesh) => {
                log::info!(
                    "Loaded navigation mesh for {}: {} tiles, {} polygons",
                    self.area,
                    nav_mesh.tile_count(),
                    nav_mesh.poly_count()
                );
                self.nav_mesh = Some(Arc::new(nav_mesh));
                Ok(())
            }
            Err(e) => {
                if !matches!(e, Error::MissingAsset(_)) {
                    log::error!("Failed to load {}: {}", path.display(), e);
                }
                Err(e)
            }
        }
    }

    pub fn has_navi_mesh(&self) -> bool {
        self.nav_mesh.is_some()
    }

    pub fn nav_mesh(&self) -> Option<&Arc<NavMesh>> {
        self.nav_mesh.as_ref()
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn config(&self) -> &NaviConfig {
        &self.config
    }

    /// Computes points an agent can follow from `start` to `end`.
    ///
    /// The first point is `start` moved onto the mesh. The result is empty
    /// when either point is too far from the mesh or no corridor connects
    /// them. Fails with [`Error::QueryMisuse`] when no mesh is loaded.
    pub fn find_follow_path(&self, start: Vec3, end: Vec3) -> Result<Vec<Vec3>> {
        let nav_mesh = self
            .nav_mesh
            .as_deref()
            .ok_or_else(|| Error::QueryMisuse(format!("no navigation mesh loaded for {}", self.area)))?;
        let config = &self.config;
        let filter = config.query_filter();
        let mut query = NavMeshQuery::new(nav_mesh, config.max_nodes)?;

        let spos = start.to_array();
        let epos = end.to_array();
        let start_ref = query.find_nearest_poly(&spos, &config.poly_find_range, &filter)?;
        let end_ref = query.find_nearest_poly(&epos, &config.poly_find_range, &filter)?;
        let (Some((start_ref, _)), Some((end_ref, _))) = (start_ref, end_ref) else {
            log::debug!("{}: no polygon near {} or {}", self.area, start, end);
            return Ok(Vec::new());
        };

        let path = query.find_path(start_ref, end_ref, &spos, &epos, &filter, config.max_polys)?;
        let Some(&last) = path.last() else {
            log::debug!("{}: no corridor from {} to {}", self.area, start, end);
            return Ok(Vec::new());
        };

        let (cursor, _) = query.closest_point_on_poly(start_ref, &spos)?;
        let (target, _) = query.closest_point_on_poly(last, &epos)?;
        let cursor = Vec3::from(cursor);
        let target = Vec3::from(target);
        log::debug!(
            "{}: cursor {} target {} over {} polygons",
            self.area,
            cursor,
            target,
            path.len()
        );

        let mut smoother = PathSmoother::new(
            &mut query,
            &filter,
            config.steering,
            config.max_smooth,
            OffMeshConnectionHandler::new(config.off_mesh_direction),
        );
        smoother.smooth(Corridor::new(path, config.max_polys), cursor, target)
    }
}
