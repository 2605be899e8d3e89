//! Visualization functions using Plotters for residence segmentation

use crate::data::HouseholdFeatures;
use crate::model::KMeansModel;
use crate::segment::{ResidenceType, Segmentation};
use plotters::prelude::*;
use std::path::Path;

/// Two-step viridis palette, Main then Secondary
const MAIN_COLOR: RGBColor = RGBColor(49, 104, 142);
const SECONDARY_COLOR: RGBColor = RGBColor(53, 183, 121);

const POINT_ALPHA: f64 = 0.7;

const DEFAULT_TITLE: &str = "Residence segmentation: mean vs variability";

fn residence_color(kind: ResidenceType) -> RGBColor {
    match kind {
        ResidenceType::Main => MAIN_COLOR,
        ResidenceType::Secondary => SECONDARY_COLOR,
    }
}

/// Axis range with 5% padding, widened when all values coincide
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let span = max - min;
    let pad = if span > 0.0 { span * 0.05 } else { min.abs().max(1.0) * 0.5 };
    (min - pad, max + pad)
}

/// Create scatter plot of mean consumption against variability
///
/// # Arguments
/// * `segmentation` - Households tagged with residence type
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
///
/// # Returns
/// * Result indicating success or failure
pub fn create_cluster_visualization(
    segmentation: &Segmentation,
    output_path: &str,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    let title = plot_title.unwrap_or(DEFAULT_TITLE);
    let rows = &segmentation.households;

    let (x_min, x_max) = padded_range(rows.iter().map(|h| h.mean));
    let (y_min, y_max) = padded_range(rows.iter().map(|h| h.std));

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Mean consumption (W)")
        .y_desc("Standard deviation / variability (W)")
        .axis_desc_style(("sans-serif", 15))
        .bold_line_style(BLACK.mix(0.15))
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    for kind in ResidenceType::ALL {
        let color = residence_color(kind);
        let points: Vec<(f64, f64)> = rows
            .iter()
            .filter(|h| h.residence == kind)
            .map(|h| (h.mean, h.std))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(
                points
                    .into_iter()
                    .map(|point| Circle::new(point, 4, color.mix(POINT_ALPHA).filled())),
            )?
            .label(kind.label())
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.mix(POINT_ALPHA).filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.3))
        .draw()?;

    root.present()?;
    tracing::debug!(path = output_path, "scatter plot written");

    Ok(())
}

/// Create a bar chart of households per residence type
pub fn create_cluster_size_chart(segmentation: &Segmentation, output_path: &str) -> crate::Result<()> {
    let counts = segmentation.counts_by_type();
    let max_size = counts.iter().map(|&(_, c)| c).max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Households per residence type", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(counts.len() as f64), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .x_desc("Residence type")
        .y_desc("Number of households")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (slot, &(kind, size)) in counts.iter().enumerate() {
        let color = residence_color(kind);
        let left = slot as f64 + 0.1;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(left, 0.0), (slot as f64 + 0.9, size as f64)],
            color.filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{}: {}", kind.label(), size),
            (left, size as f64 + max_size * 0.03),
            ("sans-serif", 14).into_font(),
        )))?;
    }

    root.present()?;
    tracing::debug!(path = output_path, "size chart written");

    Ok(())
}

/// Print the first rows of the segmentation table
pub fn print_segmentation_preview(segmentation: &Segmentation, n: usize) {
    println!(
        "{:>12} | {:>10} | {:>10} | {:>10} | {:>10} | {:>7} | {}",
        "ID", "mean", "std", "max", "min", "Cluster", "Type_Residence"
    );
    for h in segmentation.head(n) {
        println!(
            "{:>12} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>7} | {}",
            h.id, h.mean, h.std, h.max, h.min, h.cluster, h.residence
        );
    }
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(
    households: &HouseholdFeatures,
    model: &KMeansModel,
    segmentation: &Segmentation,
) {
    let total = households.len();

    println!("\n=== Cluster Statistics ===");
    println!("Number of clusters: {}", model.n_clusters);
    println!("Total households: {}", total);
    println!("Within-cluster sum of squares (Inertia): {:.2}", model.inertia);

    let silhouette_score = model.compute_silhouette_sample(&households.features, 100);
    println!("Silhouette score (sample): {:.3}", silhouette_score);

    println!("\nCluster sizes:");
    for (i, &size) in model.cluster_sizes().iter().enumerate() {
        let percentage = (size as f64 / total as f64) * 100.0;
        let kind = segmentation
            .residence_of_cluster(i)
            .map(|k| k.label())
            .unwrap_or("empty");
        println!("  Cluster {}: {} households ({:.1}%) - {}", i, size, percentage, kind);
    }

    println!("\nCluster centroids (standardized):");
    println!("  Cluster |    Mean |     Std |     Max |     Min");
    println!("  --------|---------|---------|---------|--------");
    for (i, centroid_row) in model.centroids.outer_iter().enumerate() {
        println!(
            "  {:7} | {:7.2} | {:7.2} | {:7.2} | {:7.2}",
            i, centroid_row[0], centroid_row[1], centroid_row[2], centroid_row[3]
        );
    }

    println!("\nGroup analysis (mean consumption):");
    for (kind, mean) in segmentation.mean_consumption_by_type() {
        println!("  {:<20} {:.2}", kind.label(), mean);
    }
}

/// Path of the size chart that accompanies a scatter plot
pub fn size_chart_path(base_output_path: &str) -> String {
    let path = Path::new(base_output_path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segmentation".to_string());
    path.with_file_name(format!("{}_sizes.png", stem))
        .to_string_lossy()
        .into_owned()
}

/// Generate the scatter plot, the size chart and the console statistics
pub fn generate_visualization_report(
    households: &HouseholdFeatures,
    model: &KMeansModel,
    segmentation: &Segmentation,
    base_output_path: &str,
) -> crate::Result<()> {
    create_cluster_visualization(segmentation, base_output_path, None)?;
    create_cluster_size_chart(segmentation, &size_chart_path(base_output_path))?;
    print_cluster_statistics(households, model, segmentation);

    Ok(())
}
