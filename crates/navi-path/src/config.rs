//! Navigation service configuration
//!
//! Every field has a default, so a JSON file only needs to name what it
//! changes.

use std::fs;
use std::path::{Path, PathBuf};

use navi_common::{Error, Result};
use navi_mesh::{PolyFlags, QueryFilter};
use serde::{Deserialize, Serialize};

/// Which off-mesh connection orders the smoother may traverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffMeshDirection {
    /// Unidirectional connections only run from their authored start
    #[default]
    AsAuthored,
    /// Every connection may be taken in either direction, both by the
    /// corridor search and by the smoother
    Bidirectional,
}

/// Step and tolerance values of the follow-path walk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteerParams {
    /// Distance covered by one step
    pub step_size: f32,
    /// Horizontal radius within which a point counts as reached
    pub slop: f32,
    /// Vertical tolerance when checking arrival at the end or a connection
    pub arrival_height: f32,
    /// Vertical tolerance when skipping straight-path points near the cursor
    pub steer_height: f32,
}

impl Default for SteerParams {
    fn default() -> Self {
        Self {
            step_size: 1.2,
            slop: 0.15,
            arrival_height: 1.0,
            steer_height: 1000.0,
        }
    }
}

/// Polygon flag masks of the query filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include_flags: u16,
    pub exclude_flags: u16,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include_flags: 0xffff,
            exclude_flags: 0,
        }
    }
}

impl FilterConfig {
    /// Builds the query filter, every area at unit cost
    pub fn to_query_filter(&self) -> QueryFilter {
        QueryFilter::new(
            PolyFlags::from_bits_retain(self.include_flags),
            PolyFlags::from_bits_retain(self.exclude_flags),
        )
    }
}

/// Settings of the navigation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaviConfig {
    /// Root folder holding one `{area}/{area}.nav` file per area
    pub mesh_path: PathBuf,
    /// Half extents of the box searched for the nearest polygon
    pub poly_find_range: [f32; 3],
    /// A* node pool size
    pub max_nodes: usize,
    /// Corridor capacity
    pub max_polys: usize,
    /// Output point capacity
    pub max_smooth: usize,
    pub steering: SteerParams,
    pub filter: FilterConfig,
    pub off_mesh_direction: OffMeshDirection,
}

impl Default for NaviConfig {
    fn default() -> Self {
        Self {
            mesh_path: PathBuf::from("navi"),
            poly_find_range: navi_mesh::nav_mesh_query::DEFAULT_HALF_EXTENTS,
            max_nodes: navi_mesh::nav_mesh_query::DEFAULT_MAX_NODES,
            max_polys: 256,
            max_smooth: 2048,
            steering: SteerParams::default(),
            filter: FilterConfig::default(),
            off_mesh_direction: OffMeshDirection::default(),
        }
    }
}

impl NaviConfig {
    /// Default settings with the given asset root
    pub fn with_mesh_path<P: Into<PathBuf>>(mesh_path: P) -> Self {
        Self {
            mesh_path: mesh_path.into(),
            ..Self::default()
        }
    }

    /// Parses settings from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Serialises the settings as pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Query filter for the configured flags and off-mesh direction
    pub fn query_filter(&self) -> QueryFilter {
        let mut filter = self.filter.to_query_filter();
        filter.reverse_one_way = self.off_mesh_direction == OffMeshDirection::Bidirectional;
        filter
    }

    /// Location of an area's mesh set file
    pub fn asset_path(&self, area: &str) -> PathBuf {
        self.mesh_path.join(area).join(format!("{}.nav", area))
    }

    /// Rejects values the search and the walk cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InvalidConfig(what.to_string()));

        if self.max_nodes == 0 || self.max_nodes >= u16::MAX as usize {
            return invalid("max_nodes must be between 1 and 65534");
        }
        if self.max_polys == 0 {
            return invalid("max_polys must be positive");
        }
        if self.max_smooth == 0 {
            return invalid("max_smooth must be positive");
        }
        if self
            .poly_find_range
            .iter()
            .any(|&h| !h.is_finite() || h < 0.0)
        {
            return invalid("poly_find_range must be finite and non-negative");
        }
        let steer = &self.steering;
        if !(steer.step_size > 0.0 && steer.step_size.is_finite()) {
            return invalid("steering.step_size must be positive");
        }
        if [steer.slop, steer.arrival_height, steer.steer_height]
            .iter()
            .any(|&v| !(v > 0.0))
        {
            return invalid("steering tolerances must be positive");
        }
        Ok(())
    }
}
