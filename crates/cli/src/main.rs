//! swn CLI - Surface water network analysis

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use swn_algorithms::modflow::{IboundAction, ModelGrid, SegmentDataParams, SfrNetwork, SfrParams};
use swn_algorithms::network::{AggregateFollow, ProfileParams, SegmentValues, SurfaceWaterNetwork};
use swn_algorithms::spatial::interp_2d_to_3d;
use swn_core::io::{read_ascii_grid, read_geojson, write_geojson};
use swn_core::package::{Distribution, PackageDescriptor};
use swn_core::vector::{AttributeValue, Feature, FeatureCollection, Geometry};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "swn")]
#[command(author, version, about = "Surface water network analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show package metadata
    Info {
        /// Validate the package descriptor
        #[arg(long)]
        check: bool,
        /// List modules that would ship from this source directory
        #[arg(long)]
        src: Option<PathBuf>,
    },
    /// Build a network from stream lines and print a summary
    Network {
        /// Input GeoJSON of LineString features
        lines: PathBuf,
        /// Catchment polygons GeoJSON, matched to lines by id
        #[arg(long)]
        polygons: Option<PathBuf>,
        /// Property holding segment numbers (feature id or position if unset)
        #[arg(long)]
        id_field: Option<String>,
        /// Write per-segment attributes as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// List segments upstream or downstream of a segment
    Query {
        /// Input GeoJSON of LineString features
        lines: PathBuf,
        /// Segments to walk upstream from
        #[arg(long, value_delimiter = ',', required_unless_present = "downstream")]
        upstream: Vec<i64>,
        /// Segment to walk downstream from
        #[arg(long, conflicts_with = "upstream")]
        downstream: Option<i64>,
        /// Also gather branches joining the downstream path
        #[arg(long, requires = "downstream")]
        gather: bool,
        /// Segments that stop the walk
        #[arg(long, value_delimiter = ',')]
        barrier: Vec<i64>,
        #[arg(long)]
        id_field: Option<String>,
    },
    /// Merge segments upstream of each selected segment
    Aggregate {
        /// Input GeoJSON of LineString features
        lines: PathBuf,
        /// Segments that remain after aggregation
        #[arg(long, value_delimiter = ',', required = true)]
        segnums: Vec<i64>,
        /// Attribute for the main path: upstream_length or upstream_area
        #[arg(long, default_value = "upstream_length")]
        follow: String,
        #[arg(long)]
        polygons: Option<PathBuf>,
        #[arg(long)]
        id_field: Option<String>,
        /// Write aggregated lines as GeoJSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Lower vertex elevations so each segment drops downstream
    Profile {
        /// Input GeoJSON of LineString features with Z
        lines: PathBuf,
        /// Minimum slope along each segment
        #[arg(long, default_value = "0.001")]
        min_slope: f64,
        #[arg(long)]
        id_field: Option<String>,
        /// Write adjusted lines as GeoJSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Add Z to lines from an ESRI ASCII grid
    Drape {
        /// Input GeoJSON of LineString features
        lines: PathBuf,
        /// Elevation grid (.asc)
        dem: PathBuf,
        /// Output GeoJSON
        output: PathBuf,
    },
    /// Intersect a network with a MODFLOW grid to make SFR reaches
    Sfr {
        /// Input GeoJSON of LineString features
        lines: PathBuf,
        #[arg(long)]
        nrow: usize,
        #[arg(long)]
        ncol: usize,
        /// Cell width along rows
        #[arg(long)]
        delr: f64,
        /// Cell height along columns
        #[arg(long)]
        delc: f64,
        /// Lower-left x of the grid
        #[arg(long, default_value = "0")]
        xoff: f64,
        /// Lower-left y of the grid
        #[arg(long, default_value = "0")]
        yoff: f64,
        /// Top elevation of every cell
        #[arg(long)]
        top: Option<f64>,
        /// freeze or modify
        #[arg(long, default_value = "freeze")]
        ibound_action: String,
        /// Keep pieces in inactive cells within this fraction of the cell
        /// size of a neighbouring reach
        #[arg(long, default_value = "0.2")]
        reach_include_fraction: f64,
        /// Lower segment ends to this incision below the top, then make
        /// them fall downstream
        #[arg(long)]
        min_incise: Option<f64>,
        #[arg(long)]
        id_field: Option<String>,
        /// Write reaches as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging was already initialized");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_lines(path: &Path) -> Result<FeatureCollection> {
    let pb = spinner("Reading lines...");
    let fc = read_geojson(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} features", fc.len());
    Ok(fc)
}

fn read_network(
    lines: &Path,
    polygons: Option<&Path>,
    id_field: Option<&str>,
) -> Result<SurfaceWaterNetwork> {
    let lines = read_lines(lines)?;
    let polygons = polygons
        .map(|p| read_geojson(p).with_context(|| format!("Failed to read {}", p.display())))
        .transpose()?;
    let pb = spinner("Building network...");
    let n = SurfaceWaterNetwork::from_features(&lines, id_field, polygons.as_ref())
        .context("Failed to build network")?;
    pb.finish_and_clear();
    for msg in &n.warnings {
        warn!("{}", msg);
    }
    for msg in &n.errors {
        warn!("topology error: {}", msg);
    }
    Ok(n)
}

/// Segment lines as features, with the main attributes as properties
fn network_features(n: &SurfaceWaterNetwork) -> FeatureCollection {
    let mut fc = FeatureCollection::new();
    fc.crs = n.crs().cloned();
    for seg in n.segments() {
        let mut f = Feature::new(Geometry::LineString(seg.geometry.clone()));
        f.id = Some(seg.segnum.to_string());
        f.set_property("segnum", AttributeValue::Int(seg.segnum));
        f.set_property("to_segnum", AttributeValue::Int(seg.to_segnum));
        f.set_property("sequence", AttributeValue::Int(i64::from(seg.sequence)));
        f.set_property("stream_order", AttributeValue::Int(i64::from(seg.stream_order)));
        f.set_property("upstream_length", AttributeValue::Float(seg.upstream_length));
        if let Some(area) = seg.upstream_area {
            f.set_property("upstream_area", AttributeValue::Float(area));
        }
        if let Some(width) = seg.width {
            f.set_property("width", AttributeValue::Float(width));
        }
        fc.push(f);
    }
    fc
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn join(segnums: &[i64]) -> String {
    segnums.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { check, src } => {
            let descriptor = PackageDescriptor::current();
            print!("{}", descriptor.metadata());
            if check {
                descriptor.validate().context("Package check failed")?;
                println!("\nPackage check passed");
            }
            if let Some(src) = src {
                let dist = Distribution::build(&descriptor, &src)
                    .with_context(|| format!("Failed to collect modules in {}", src.display()))?;
                println!("\n{} modules:", dist.modules.len());
                for module in &dist.modules {
                    println!("  {}", module);
                }
            }
        }

        // ── Network ──────────────────────────────────────────────────
        Commands::Network { lines, polygons, id_field, json } => {
            let start = Instant::now();
            let n = read_network(&lines, polygons.as_deref(), id_field.as_deref())?;
            println!("{}", n);
            if !n.errors.is_empty() {
                println!("{} topology errors", n.errors.len());
            }
            if let Some(out) = json {
                write_json(n.segments(), &out)?;
                done("Segments", &out, start.elapsed());
            }
        }

        // ── Query ────────────────────────────────────────────────────
        Commands::Query { lines, upstream, downstream, gather, barrier, id_field } => {
            let n = read_network(&lines, None, id_field.as_deref())?;
            let found = match downstream {
                Some(segnum) => n.query_downstream(segnum, gather, &barrier)?,
                None => n.query_upstream(&upstream, &barrier)?,
            };
            println!("{} segments: [{}]", found.len(), join(&found));
        }

        // ── Aggregate ────────────────────────────────────────────────
        Commands::Aggregate { lines, segnums, follow, polygons, id_field, output } => {
            let start = Instant::now();
            let follow: AggregateFollow = follow.parse()?;
            let n = read_network(&lines, polygons.as_deref(), id_field.as_deref())?;
            let pb = spinner("Aggregating...");
            let agg = n.aggregate(&segnums, follow)?;
            pb.finish_and_clear();
            println!("{}", agg);
            for seg in agg.segments() {
                let patch = seg.agg_patch.as_deref().unwrap_or_default();
                println!("  {}: {} segments [{}]", seg.segnum, patch.len(), join(patch));
            }
            if let Some(out) = output {
                write_geojson(&network_features(&agg), &out)?;
                done("Aggregated lines", &out, start.elapsed());
            }
        }

        // ── Profile ──────────────────────────────────────────────────
        Commands::Profile { lines, min_slope, id_field, output } => {
            let start = Instant::now();
            let mut n = read_network(&lines, None, id_field.as_deref())?;
            let params = ProfileParams { min_slope: SegmentValues::Scalar(min_slope) };
            n.adjust_elevation_profile(&params)?;
            if n.messages.is_empty() {
                println!("No elevations adjusted");
            }
            for msg in &n.messages {
                println!("{}", msg);
            }
            if let Some(out) = output {
                write_geojson(&network_features(&n), &out)?;
                done("Adjusted lines", &out, start.elapsed());
            }
        }

        // ── Drape ────────────────────────────────────────────────────
        Commands::Drape { lines, dem, output } => {
            let start = Instant::now();
            let mut fc = read_lines(&lines)?;
            let grid = read_ascii_grid(&dem)
                .with_context(|| format!("Failed to read {}", dem.display()))?;
            let (rows, cols) = grid.shape();
            match grid.value_range() {
                Some((lo, hi)) => info!("Grid: {} x {}, elevations {:.3} to {:.3}", cols, rows, lo, hi),
                None => warn!("Grid: {} x {} has no valid cells", cols, rows),
            }

            let mut idx = Vec::new();
            let mut flat = Vec::new();
            for (i, f) in fc.features.iter().enumerate() {
                if let Some(Geometry::LineString(l)) = &f.geometry {
                    idx.push(i);
                    flat.push(l.clone());
                }
            }
            if idx.len() < fc.len() {
                warn!("{} features are not LineString and were left as-is", fc.len() - idx.len());
            }
            let pb = spinner("Interpolating elevations...");
            let draped = interp_2d_to_3d(&flat, &grid)?;
            pb.finish_and_clear();
            for (i, line) in idx.into_iter().zip(draped) {
                fc.features[i].geometry = Some(Geometry::LineString(line));
            }
            write_geojson(&fc, &output)?;
            done("Draped lines", &output, start.elapsed());
        }

        // ── SFR ──────────────────────────────────────────────────────
        Commands::Sfr {
            lines,
            nrow,
            ncol,
            delr,
            delc,
            xoff,
            yoff,
            top,
            ibound_action,
            reach_include_fraction,
            min_incise,
            id_field,
            json,
        } => {
            let start = Instant::now();
            let params = SfrParams {
                ibound_action: ibound_action.parse::<IboundAction>()?,
                reach_include_fraction,
                ..SfrParams::default()
            };
            let n = read_network(&lines, None, id_field.as_deref())?;
            let mut grid = ModelGrid::new(nrow, ncol, delr, delc, xoff, yoff)?;
            if let Some(top) = top {
                grid.top.fill(top);
            }
            let pb = spinner("Intersecting grid cells...");
            let mut sfr = SfrNetwork::from_network(&n, grid, &params)?;
            sfr.default_segment_data(&SegmentDataParams::default())?;
            if let Some(min_incise) = min_incise {
                sfr.fix_segment_elevs(min_incise, params.min_slope, None)?;
                sfr.reconcile_reach_strtop()?;
            }
            pb.finish_and_clear();
            println!("{}", sfr);
            if let Some(out) = json {
                write_json(sfr.reaches(), &out)?;
                done("Reaches", &out, start.elapsed());
            }
        }
    }

    Ok(())
}
