//! K-Means clustering model implementation

use crate::data::{HouseholdFeatures, N_FEATURES};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Hyper-parameters for a K-Means fit
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansSettings {
    pub n_clusters: usize,
    pub seed: u64,
    pub n_runs: usize,
    pub max_iters: usize,
    pub tolerance: f64,
}

impl Default for KMeansSettings {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            seed: 42,
            n_runs: 1,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// Fitted K-Means parameters and training assignments
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Predict cluster for a standardized feature vector
    pub fn predict(&self, features: &Array1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            anyhow::bail!(
                "Feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            );
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Compute basic silhouette coefficient for a subset of points (for efficiency)
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            // a(i): mean distance to points in same cluster
            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.n_clusters {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = if same_cluster_distances.is_empty() {
                0.0
            } else {
                same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
            };

            // b(i): min mean distance to points in other clusters
            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means on standardized household features
///
/// # Arguments
/// * `households` - Household statistics with standardized features
/// * `settings` - Cluster count, seed, restarts and convergence criteria
///
/// # Returns
/// * Fitted `KMeansModel` with assignments and inertia
pub fn fit_kmeans(
    households: &HouseholdFeatures,
    settings: &KMeansSettings,
) -> crate::Result<KMeansModel> {
    let n_clusters = settings.n_clusters;
    if n_clusters < 2 {
        anyhow::bail!("Number of clusters must be at least 2, got {}", n_clusters);
    }

    if households.features.nrows() < n_clusters {
        anyhow::bail!(
            "Number of households ({}) must be at least equal to number of clusters ({})",
            households.features.nrows(),
            n_clusters
        );
    }

    let n_samples = households.features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples); // Unsupervised, targets unused
    let dataset = Dataset::new(households.features.clone(), targets);

    let rng = StdRng::seed_from_u64(settings.seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(settings.n_runs.max(1))
        .max_n_iterations(settings.max_iters as u64)
        .tolerance(settings.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&households.features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&households.features, &labels, &centroids);

    debug!(n_clusters, seed = settings.seed, inertia, "k-means fitted");

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Predict cluster for raw household statistics
///
/// # Arguments
/// * `model` - Fitted K-Means model
/// * `households` - Training households (for the scaler)
/// * `profile` - New household statistics [mean, std, max, min]
///
/// # Returns
/// * Predicted cluster index
pub fn predict_cluster(
    model: &KMeansModel,
    households: &HouseholdFeatures,
    profile: &[f64; N_FEATURES],
) -> crate::Result<usize> {
    let scaled_features = households.scale_new_data(profile)?;
    model.predict(&scaled_features)
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
