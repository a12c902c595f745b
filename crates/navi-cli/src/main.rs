//! CLI utility to inspect navigation meshes and query follow paths

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use serde_json::json;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use navi_path::{NaviConfig, NaviProvider};

/// A CLI utility for per-area navigation meshes and follow paths
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Log debug output
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the parameters and contents of an area's mesh
    Info {
        /// Folder holding one sub-folder per area
        #[clap(long, value_parser)]
        mesh_path: Option<PathBuf>,

        /// Area name
        #[clap(long)]
        area: String,

        /// Navigation config file (JSON)
        #[clap(long, value_parser)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },

    /// Compute a follow path inside an area
    Path {
        /// Folder holding one sub-folder per area
        #[clap(long, value_parser)]
        mesh_path: Option<PathBuf>,

        /// Area name
        #[clap(long)]
        area: String,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        /// Navigation config file (JSON)
        #[clap(long, value_parser)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,

        /// Output path file
        #[clap(long, value_parser)]
        output: Option<PathBuf>,
    },
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 3 {
        return Err(format!(
            "Vector must have 3 components, got {}",
            parts.len()
        ));
    }

    let x = parts[0].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let z = parts[2].trim().parse::<f32>().map_err(|e| e.to_string())?;

    Ok(Vec3::new(x, y, z))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Commands::Info {
            mesh_path,
            area,
            config,
            json,
        } => {
            let config = load_config(config.as_deref(), mesh_path)?;
            show_info(&area, config, json)
        }
        Commands::Path {
            mesh_path,
            area,
            start,
            end,
            config,
            json,
            output,
        } => {
            let config = load_config(config.as_deref(), mesh_path)?;
            find_path(&area, config, start, end, json, output.as_deref())
        }
    }
}

/// Reads the config file if given, then applies the command-line mesh root
fn load_config(path: Option<&Path>, mesh_path: Option<PathBuf>) -> Result<NaviConfig> {
    let mut config = match path {
        Some(path) => NaviConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => NaviConfig::default(),
    };
    if let Some(mesh_path) = mesh_path {
        config.mesh_path = mesh_path;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_area(area: &str, config: NaviConfig) -> Result<NaviProvider> {
    let mut provider = NaviProvider::new(area, config);
    provider
        .init()
        .with_context(|| format!("Failed to load navigation mesh for area {}", area))?;
    Ok(provider)
}

/// Print the mesh parameters and tile contents of an area
fn show_info(area: &str, config: NaviConfig, as_json: bool) -> Result<()> {
    let asset = config.asset_path(area);
    let provider = open_area(area, config)?;
    let nav_mesh = provider
        .nav_mesh()
        .ok_or_else(|| anyhow!("No navigation mesh loaded for area {}", area))?;

    let params = nav_mesh.get_params();
    let tiles: Vec<_> = nav_mesh
        .tiles()
        .filter_map(|tile| {
            let header = tile.header.as_ref()?;
            Some(json!({
                "x": header.x,
                "y": header.y,
                "layer": header.layer,
                "polys": tile.polys.len(),
                "off_mesh_connections": tile.off_mesh_cons.len(),
            }))
        })
        .collect();
    let off_mesh: usize = nav_mesh.tiles().map(|t| t.off_mesh_cons.len()).sum();

    if as_json {
        let report = json!({
            "area": area,
            "file": asset.display().to_string(),
            "origin": params.origin,
            "tile_width": params.tile_width,
            "tile_height": params.tile_height,
            "max_tiles": params.max_tiles,
            "max_polys_per_tile": params.max_polys_per_tile,
            "tile_count": nav_mesh.tile_count(),
            "poly_count": nav_mesh.poly_count(),
            "off_mesh_connection_count": off_mesh,
            "tiles": tiles,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Area {} ({})", area, asset.display());
    println!("  Origin: {:?}", params.origin);
    println!("  Tile size: {} x {}", params.tile_width, params.tile_height);
    println!(
        "  Capacity: {} tiles, {} polygons per tile",
        params.max_tiles, params.max_polys_per_tile
    );
    println!(
        "  Loaded: {} tiles, {} polygons, {} off-mesh connections",
        nav_mesh.tile_count(),
        nav_mesh.poly_count(),
        off_mesh
    );
    for tile in &tiles {
        println!(
            "    tile ({}, {}) layer {}: {} polygons, {} connections",
            tile["x"], tile["y"], tile["layer"], tile["polys"], tile["off_mesh_connections"]
        );
    }
    Ok(())
}

/// Compute a follow path and print or save it
fn find_path(
    area: &str,
    config: NaviConfig,
    start: Vec3,
    end: Vec3,
    as_json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let provider = open_area(area, config)?;

    log::info!("Finding follow path from {} to {} in {}", start, end, area);
    let points = provider
        .find_follow_path(start, end)
        .with_context(|| format!("Path query failed in area {}", area))?;

    if points.is_empty() {
        log::warn!("No path between {} and {}", start, end);
    }

    let text = if as_json {
        let coords: Vec<[f32; 3]> = points.iter().map(|p| p.to_array()).collect();
        serde_json::to_string_pretty(&json!({
            "area": area,
            "start": start.to_array(),
            "end": end.to_array(),
            "points": coords,
        }))?
    } else {
        points
            .iter()
            .map(|p| format!("{} {} {}", p.x, p.y, p.z))
            .collect::<Vec<_>>()
            .join("\n")
    };

    match output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            writeln!(file, "{}", text)?;
            println!("Saved {} points to {}", points.len(), path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
