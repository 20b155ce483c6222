//! Placement simulation command.
//!
//! Starts a [`PlacementApp`] over a procedural world, submits placements
//! from distinct requesters at spread-out centers, and reports outcomes and
//! phase timings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{info, warn};

use safeport::options::{DEFAULT_MAX_RADIUS, DEFAULT_MIN_RADIUS};
use safeport::world::synthetic::SyntheticWorld;
use safeport::world::WorldProvider;
use safeport::{
    BlockPos, PlacementApp, PlacementConfig, PlacementOutcome, PlacementResult, RequesterId,
};

use crate::error::CliError;

/// Spread of simulated request centers around the origin.
const CENTER_SPREAD: f64 = 4_000.0;

/// Feet height of simulated request centers.
const CENTER_Y: i32 = 64;

/// Golden angle in radians, used to spread centers evenly.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Grace period for in-flight placements at the end of the run.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments for `safeport simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of placements to run
    #[arg(long, default_value_t = 100)]
    pub placements: usize,

    /// Concurrent placement operations
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Inner radius of the destination band
    #[arg(long, default_value_t = DEFAULT_MIN_RADIUS)]
    pub min_radius: i32,

    /// Outer radius of the destination band
    #[arg(long, default_value_t = DEFAULT_MAX_RADIUS)]
    pub max_radius: i32,

    /// Seed for the world and the search
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Fraction of regions containing a lava pool (0.0-1.0)
    #[arg(long, default_value_t = 0.15)]
    pub hazard_density: f64,

    /// Simulated host latency per region load, in milliseconds
    #[arg(long, default_value_t = 2)]
    pub load_latency_ms: u64,

    /// Biomes destinations must avoid (repeatable)
    #[arg(long = "block-biome", default_values_t = vec!["ocean".to_string()])]
    pub block_biomes: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Runs the simulation.
pub async fn run(args: SimulateArgs) -> Result<(), CliError> {
    if args.placements == 0 {
        return Err(CliError::Config(
            "--placements must be greater than zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&args.hazard_density) {
        return Err(CliError::Config(format!(
            "--hazard-density must be between 0.0 and 1.0 (got {})",
            args.hazard_density
        )));
    }

    let config = placement_config(&args);
    let world = Arc::new(
        SyntheticWorld::procedural(args.seed, args.hazard_density)
            .with_load_latency(Duration::from_millis(args.load_latency_ms)),
    );
    let app = PlacementApp::start(config, Arc::clone(&world) as Arc<dyn WorldProvider>).await?;

    info!(
        placements = args.placements,
        concurrency = args.concurrency,
        seed = args.seed,
        "Simulation starting"
    );

    let bar = progress_bar(args.placements as u64, args.json);
    let started = Instant::now();
    let mut tally = Tally::default();

    let mut handles = Vec::with_capacity(args.placements);
    for index in 0..args.placements {
        let center = spread_center(index, args.placements);
        match app.submit(RequesterId::random(), center) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!(error = %e, "Submission refused");
                tally.refused += 1;
                bar.inc(1);
            }
        }
    }

    for handle in handles {
        let result = handle.await;
        tally.add(&result);
        bar.set_message(format!("{} placed", tally.placed));
        bar.inc(1);
    }
    bar.finish_and_clear();
    let wall_time = started.elapsed();

    let report = app.shutdown(SHUTDOWN_TIMEOUT).await;
    let manager = app.manager().stats();
    let loader = app.loader().stats();
    let search = app.search().stats();
    let validator = app.validator().stats();

    if args.json {
        let document = json!({
            "placements": args.placements,
            "wall_time_ms": wall_time.as_millis() as u64,
            "outcomes": {
                "placed": tally.placed,
                "failed": tally.failed,
                "cancelled": tally.cancelled,
                "refused": tally.refused,
                "expanded": tally.expanded,
                "failure_reasons": tally.failure_reasons,
            },
            "manager": serde_json::to_value(&manager)?,
            "loader": serde_json::to_value(&loader)?,
            "search": serde_json::to_value(&search)?,
            "validator": serde_json::to_value(&validator)?,
            "shutdown": serde_json::to_value(report)?,
            "host_loads": world.load_count(),
            "host_releases": world.release_count(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let perf = &manager.performance;
    println!();
    println!("{}", style("Simulation Summary").bold().underlined());
    println!();
    println!(
        "  Placements:     {} placed, {} failed, {} cancelled, {} refused",
        style(tally.placed).green(),
        style(tally.failed).red(),
        tally.cancelled,
        tally.refused
    );
    println!("  Success rate:   {:.1}%", perf.success_rate * 100.0);
    println!("  Expanded band:  {} requests", tally.expanded);
    println!(
        "  Avg attempts:   {:.2}",
        tally.attempts as f64 / tally.finished().max(1) as f64
    );
    println!("  Wall time:      {:.2}s", wall_time.as_secs_f64());
    println!();
    println!("{}", style("Phase timings (avg)").bold());
    println!("  Resource load:  {:.2} ms", perf.avg_resource_load_ms);
    println!("  Search:         {:.2} ms", perf.avg_search_ms);
    println!("  Validation:     {:.2} ms", perf.avg_validation_ms);
    println!("  Placement:      {:.2} ms", perf.avg_main_thread_ms);
    println!("  Total:          {:.2} ms", perf.avg_total_ms);
    println!("  Trend:          {}", perf.trend);
    println!();
    println!("{}", style("Engines").bold());
    println!(
        "  Loader:         {} requests, {} host loads, {} coalesced, {} failures, {} active tickets",
        loader.requests, loader.host_loads, loader.coalesced, loader.failures, loader.active_tickets
    );
    println!(
        "  Search:         {} passes, {} regions, {} skipped by biome",
        search.searches, search.regions_examined, search.regions_skipped
    );
    println!(
        "  Validator:      {} validations, {:.1}% cache hits, {} hazard scans",
        validator.validations,
        validator.cache.hit_rate() * 100.0,
        validator.hazard_scans
    );
    if perf.threshold_violations > 0 {
        println!(
            "  {} {} threshold violations",
            style("!").yellow().bold(),
            perf.threshold_violations
        );
    }
    if !tally.failure_reasons.is_empty() {
        println!();
        println!("{}", style("Failure reasons").bold());
        for (reason, count) in &tally.failure_reasons {
            println!("  {:>5}  {}", count, reason);
        }
    }
    if !report.drained {
        println!();
        println!(
            "{} {} placement workers were aborted at shutdown",
            style("!").yellow().bold(),
            report.aborted
        );
    }

    Ok(())
}

/// Maps command-line flags onto the placement settings.
fn placement_config(args: &SimulateArgs) -> PlacementConfig {
    let mut config = PlacementConfig::default()
        .with_max_concurrent(args.concurrency)
        .with_radius(args.min_radius, args.max_radius)
        .with_seed(args.seed);
    config.defaults.blocked_biomes = args.block_biomes.iter().cloned().collect();
    config
}

fn progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar
}

/// Deterministic center for the `index`-th of `total` placements.
///
/// Centers follow a sunflower pattern so they cover the spread evenly.
fn spread_center(index: usize, total: usize) -> BlockPos {
    let fraction = (index as f64 + 0.5) / total.max(1) as f64;
    let distance = CENTER_SPREAD * fraction.sqrt();
    let angle = index as f64 * GOLDEN_ANGLE;
    BlockPos::new(
        (distance * angle.cos()).round() as i32,
        CENTER_Y,
        (distance * angle.sin()).round() as i32,
    )
}

/// Outcome counts of a simulation run.
#[derive(Debug, Default)]
struct Tally {
    placed: u64,
    failed: u64,
    cancelled: u64,
    refused: u64,
    expanded: u64,
    attempts: u64,
    failure_reasons: BTreeMap<String, u64>,
}

impl Tally {
    fn add(&mut self, result: &PlacementResult) {
        self.attempts += result.attempts_used as u64;
        if result.search_phases > 1 {
            self.expanded += 1;
        }
        match &result.outcome {
            PlacementOutcome::Placed { .. } => self.placed += 1,
            PlacementOutcome::Cancelled => self.cancelled += 1,
            PlacementOutcome::Failed(error) => {
                self.failed += 1;
                *self.failure_reasons.entry(error.to_string()).or_default() += 1;
            }
        }
    }

    fn finished(&self) -> u64 {
        self.placed + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use safeport::manager::{PlacementError, RequestStatus};
    use safeport::RequestId;

    fn args(min_radius: i32, max_radius: i32, concurrency: usize, seed: u64) -> SimulateArgs {
        SimulateArgs {
            placements: 1,
            concurrency,
            min_radius,
            max_radius,
            seed,
            hazard_density: 0.1,
            load_latency_ms: 0,
            block_biomes: vec!["ocean".to_string()],
            json: true,
            log_file: None,
            verbose: false,
        }
    }

    fn result(outcome: PlacementOutcome, phases: u32) -> PlacementResult {
        PlacementResult {
            request_id: RequestId::new(),
            requester: RequesterId::random(),
            status: RequestStatus::Failed,
            outcome,
            elapsed: Duration::from_millis(5),
            attempts_used: 3,
            search_phases: phases,
        }
    }

    #[test]
    fn test_spread_center_stays_within_spread() {
        for index in 0..200 {
            let center = spread_center(index, 200);
            let distance = ((center.x as f64).powi(2) + (center.z as f64).powi(2)).sqrt();
            assert!(distance <= CENTER_SPREAD + 1.0);
            assert_eq!(center.y, CENTER_Y);
        }
    }

    #[test]
    fn test_spread_centers_are_distinct() {
        let a = spread_center(1, 100);
        let b = spread_center(2, 100);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = Tally::default();
        tally.add(&result(
            PlacementOutcome::Failed(PlacementError::NoSafeLocation { expansions: 3 }),
            4,
        ));
        tally.add(&result(PlacementOutcome::Cancelled, 1));

        assert_eq!(tally.failed, 1);
        assert_eq!(tally.cancelled, 1);
        assert_eq!(tally.expanded, 1);
        assert_eq!(tally.attempts, 6);
        assert_eq!(tally.finished(), 2);
        assert_eq!(tally.failure_reasons.len(), 1);
    }

    #[test]
    fn test_zero_placements_rejected() {
        let args = SimulateArgs {
            placements: 0,
            ..args(10, 20, 1, 1)
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime.block_on(run(args)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    proptest! {
        #[test]
        fn prop_flags_map_onto_config(
            min in 0i32..5_000,
            width in 1i32..5_000,
            concurrency in 1usize..64,
            seed in any::<u64>(),
        ) {
            let config = placement_config(&args(min, min + width, concurrency, seed));

            prop_assert!(config.validate().is_ok());
            let options = config.defaults.to_options().unwrap();
            prop_assert_eq!(options.min_radius(), min);
            prop_assert_eq!(options.max_radius(), min + width);
            prop_assert!(options.biome_allowed(&"plains".into()));
            prop_assert!(!options.biome_allowed(&"ocean".into()));
            prop_assert_eq!(config.manager.max_concurrent, concurrency);
            prop_assert_eq!(config.search.seed, Some(seed));
        }

        #[test]
        fn prop_inverted_band_is_rejected(min in 1i32..5_000, below in 0i32..5_000) {
            let config = placement_config(&args(min, min - below.min(min), 4, 1));
            prop_assert!(config.validate().is_err());
        }
    }
}
