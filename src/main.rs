//! WattCluster: residence segmentation CLI using K-Means on load-curve statistics
//!
//! This is the main entrypoint that orchestrates data loading, model fitting,
//! residence typing, visualization, and prediction.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};
use wattcluster::{
    export_segmentation, fit_kmeans, load_and_process_data, predict_cluster, segment_households,
    viz, Args, HouseholdFeatures, KMeansModel, KMeansSettings, LoadOptions,
};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    args.validate()?;

    if args.verbose {
        println!("WattCluster - Residence segmentation using K-Means");
        println!("==================================================\n");
    }

    // Check if in prediction mode
    if let Some(profile) = args.parse_profile_values()? {
        run_prediction_mode(&args, profile)?;
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

/// Diagnostics go to stderr; RUST_LOG overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_options(args: &Args) -> Result<LoadOptions> {
    Ok(LoadOptions {
        id_column: args.id_column.clone(),
        value_column: args.value_column.clone(),
        separator: args.delimiter_byte()?,
    })
}

fn kmeans_settings(args: &Args) -> KMeansSettings {
    KMeansSettings {
        n_clusters: args.clusters,
        seed: args.seed,
        n_runs: args.n_runs,
        max_iters: args.max_iters,
        tolerance: args.tolerance,
    }
}

/// Load the input and fit the model shared by both modes
fn load_and_fit(args: &Args) -> Result<(HouseholdFeatures, KMeansModel)> {
    if args.verbose {
        println!("Step 1: Loading and processing data");
        println!("  Input file: {}", args.input);
    }

    let data_start = Instant::now();
    let households = load_and_process_data(&args.input, &load_options(args)?)?;

    println!("✓ Data loaded: {} households", households.len());
    if args.verbose {
        println!("  Processing time: {:.2}s", data_start.elapsed().as_secs_f64());
        println!("  Features shape: {:?}", households.features.shape());
        println!("\nStep 2: Fitting K-Means model");
        println!("  Number of clusters: {}", args.clusters);
        println!("  Seed: {}", args.seed);
        println!("  Runs: {}", args.n_runs);
        println!("  Max iterations: {}", args.max_iters);
        println!("  Tolerance: {}", args.tolerance);
    }

    let model_start = Instant::now();
    let model = fit_kmeans(&households, &kmeans_settings(args))?;

    println!("✓ Model fitted successfully");
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_start.elapsed().as_secs_f64());
        println!("  Inertia: {:.2}", model.inertia);
    }

    Ok((households, model))
}

/// Classify a single household from its summary statistics
fn run_prediction_mode(args: &Args, profile: [f64; 4]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input profile: mean={}, std={}, max={}, min={}",
        profile[0], profile[1], profile[2], profile[3]
    );

    let start_time = Instant::now();
    let (households, model) = load_and_fit(args)?;
    let segmentation = segment_households(&households, &model)?;

    let cluster = predict_cluster(&model, &households, &profile)?;
    let residence = segmentation
        .residence_of_cluster(cluster)
        .ok_or_else(|| anyhow::anyhow!("Cluster {} has no training household", cluster))?;

    println!("\n✓ Predicted Cluster: {} ({})", cluster, residence);
    println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    let cluster_sizes = model.cluster_sizes();
    let cluster_percentage = (cluster_sizes[cluster] as f64 / households.len() as f64) * 100.0;

    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} households ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    let centroid = model.centroids.row(cluster);
    println!(
        "  Centroid (standardized): mean={:.2}, std={:.2}, max={:.2}, min={:.2}",
        centroid[0], centroid[1], centroid[2], centroid[3]
    );

    Ok(())
}

/// Run full segmentation pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Residence Segmentation Pipeline ===\n");

    let start_time = Instant::now();
    let (households, model) = load_and_fit(args)?;

    // Step 3: Name clusters and show the result table
    let segmentation = segment_households(&households, &model)?;
    println!();
    viz::print_segmentation_preview(&segmentation, args.head);

    if let Some(ref export_path) = args.export {
        export_segmentation(&segmentation, export_path)?;
        println!("\n✓ Segmentation exported to '{}'", export_path);
    }

    // Step 4: Statistics and plots
    if args.verbose {
        println!("\nStep 3: Generating visualizations");
        println!("  Output file: {}", args.output);
    }

    let viz_start = Instant::now();
    viz::generate_visualization_report(&households, &model, &segmentation, &args.output)?;
    if args.verbose {
        println!("  Visualization time: {:.2}s", viz_start.elapsed().as_secs_f64());
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Plot saved to '{}'", args.output);
    println!(
        "Household counts saved to '{}'",
        viz::size_chart_path(&args.output)
    );

    Ok(())
}
