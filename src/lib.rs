//! WattCluster: residence segmentation from household load curves
//!
//! This library derives per-household consumption statistics from raw
//! load-curve measurements, clusters households with K-Means and tells
//! main residences apart from secondary residences.

pub mod cli;
pub mod data;
pub mod model;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_and_process_data, FeatureColumn, HouseholdFeatures, LoadOptions, StandardScaler};
pub use model::{fit_kmeans, predict_cluster, KMeansModel, KMeansSettings};
pub use segment::{export_segmentation, segment_households, ResidenceType, Segmentation};
pub use viz::create_cluster_visualization;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
