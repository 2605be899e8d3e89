//! Residence typing: naming K-Means clusters by consumption level

use crate::data::{FeatureColumn, HouseholdFeatures};
use crate::model::KMeansModel;
use anyhow::Context;
use polars::prelude::*;
use std::fmt;
use std::fs::File;
use tracing::{debug, warn};

/// Consumption profile assigned to each household
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResidenceType {
    /// Occupied year-round
    Main,
    /// Lowest average consumption, occupied occasionally
    Secondary,
}

impl ResidenceType {
    pub const ALL: [ResidenceType; 2] = [ResidenceType::Main, ResidenceType::Secondary];

    pub fn label(self) -> &'static str {
        match self {
            ResidenceType::Main => "Main residence",
            ResidenceType::Secondary => "Secondary residence",
        }
    }
}

impl fmt::Display for ResidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One household with its statistics, cluster and residence type
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedHousehold {
    pub id: String,
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub readings: u64,
    pub cluster: usize,
    pub residence: ResidenceType,
}

/// Households tagged with cluster and residence type
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// One entry per household, same order as the feature table
    pub households: Vec<SegmentedHousehold>,
    /// Residence type of every cluster index, `None` for empty clusters
    pub cluster_types: Vec<Option<ResidenceType>>,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.households.len()
    }

    pub fn is_empty(&self) -> bool {
        self.households.is_empty()
    }

    pub fn residence_of_cluster(&self, cluster: usize) -> Option<ResidenceType> {
        self.cluster_types.get(cluster).copied().flatten()
    }

    pub fn head(&self, n: usize) -> &[SegmentedHousehold] {
        &self.households[..n.min(self.households.len())]
    }

    /// Households per residence type, Main first
    pub fn counts_by_type(&self) -> Vec<(ResidenceType, usize)> {
        ResidenceType::ALL
            .iter()
            .map(|&kind| {
                let count = self.households.iter().filter(|h| h.residence == kind).count();
                (kind, count)
            })
            .collect()
    }

    /// Average mean consumption per residence type, Main first; absent types omitted
    pub fn mean_consumption_by_type(&self) -> Vec<(ResidenceType, f64)> {
        ResidenceType::ALL
            .iter()
            .filter_map(|&kind| {
                let means: Vec<f64> = self
                    .households
                    .iter()
                    .filter(|h| h.residence == kind)
                    .map(|h| h.mean)
                    .collect();
                if means.is_empty() {
                    None
                } else {
                    Some((kind, means.iter().sum::<f64>() / means.len() as f64))
                }
            })
            .collect()
    }
}

/// Tag every household with its cluster and residence type
///
/// Clusters are ranked by the average of the raw `mean` statistic of their
/// members. The lowest one is the secondary-residence cluster; all others
/// are main residences. Ties go to the lowest cluster index.
pub fn segment_households(
    households: &HouseholdFeatures,
    model: &KMeansModel,
) -> crate::Result<Segmentation> {
    if model.labels.len() != households.len() {
        anyhow::bail!(
            "Model has {} assignments for {} households",
            model.labels.len(),
            households.len()
        );
    }

    let cluster_types = rank_clusters(households, model);
    let means = households.column(FeatureColumn::Mean);
    let stds = households.column(FeatureColumn::Std);
    let maxs = households.column(FeatureColumn::Max);
    let mins = households.column(FeatureColumn::Min);

    let mut segmented = Vec::with_capacity(households.len());
    for (i, &cluster) in model.labels.iter().enumerate() {
        let residence = cluster_types
            .get(cluster)
            .copied()
            .flatten()
            .with_context(|| format!("Household assigned to unknown cluster {}", cluster))?;

        segmented.push(SegmentedHousehold {
            id: households.household_ids[i].clone(),
            mean: means[i],
            std: stds[i],
            max: maxs[i],
            min: mins[i],
            readings: households.readings[i],
            cluster,
            residence,
        });
    }

    Ok(Segmentation {
        households: segmented,
        cluster_types,
    })
}

fn rank_clusters(households: &HouseholdFeatures, model: &KMeansModel) -> Vec<Option<ResidenceType>> {
    let means = households.column(FeatureColumn::Mean);
    let mut sums = vec![0.0; model.n_clusters];
    let mut counts = vec![0usize; model.n_clusters];

    for (&cluster, &mean) in model.labels.iter().zip(means.iter()) {
        if cluster < model.n_clusters {
            sums[cluster] += mean;
            counts[cluster] += 1;
        }
    }

    let mut averages: Vec<(usize, f64)> = (0..model.n_clusters)
        .filter(|&cluster| counts[cluster] > 0)
        .map(|cluster| (cluster, sums[cluster] / counts[cluster] as f64))
        .collect();
    // Stable sort keeps the lowest index first on ties
    averages.sort_by(|a, b| a.1.total_cmp(&b.1));

    let empty = model.n_clusters - averages.len();
    if empty > 0 {
        warn!(empty, "some clusters received no household");
    }

    let mut types = vec![None; model.n_clusters];
    for (rank, &(cluster, average)) in averages.iter().enumerate() {
        let kind = if rank == 0 {
            ResidenceType::Secondary
        } else {
            ResidenceType::Main
        };
        debug!(cluster, average, residence = %kind, "cluster ranked");
        types[cluster] = Some(kind);
    }
    types
}

/// Write the segmentation table as CSV
pub fn export_segmentation(segmentation: &Segmentation, output_path: &str) -> crate::Result<()> {
    let rows = &segmentation.households;
    let mut df = DataFrame::new(vec![
        Series::new("ID", rows.iter().map(|h| h.id.as_str()).collect::<Vec<_>>()),
        Series::new("mean", rows.iter().map(|h| h.mean).collect::<Vec<_>>()),
        Series::new("std", rows.iter().map(|h| h.std).collect::<Vec<_>>()),
        Series::new("max", rows.iter().map(|h| h.max).collect::<Vec<_>>()),
        Series::new("min", rows.iter().map(|h| h.min).collect::<Vec<_>>()),
        Series::new("count", rows.iter().map(|h| h.readings).collect::<Vec<_>>()),
        Series::new("Cluster", rows.iter().map(|h| h.cluster as u32).collect::<Vec<_>>()),
        Series::new(
            "Type_Residence",
            rows.iter().map(|h| h.residence.label()).collect::<Vec<_>>(),
        ),
    ])?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create export file {}", output_path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fit_kmeans, KMeansSettings};
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    fn create_test_households() -> HouseholdFeatures {
        let raw_features = Array2::from_shape_vec(
            (5, 4),
            vec![
                1200.0, 300.0, 4000.0, 400.0, //
                90.0, 400.0, 3500.0, 0.0, //
                1100.0, 280.0, 3800.0, 380.0, //
                80.0, 380.0, 3300.0, 0.0, //
                1250.0, 310.0, 4100.0, 420.0,
            ],
        )
        .unwrap();
        let ids = vec!["a", "b", "c", "d", "e"]
            .into_iter()
            .map(String::from)
            .collect();
        HouseholdFeatures::from_raw(ids, raw_features, vec![10, 10, 10, 10, 10]).unwrap()
    }

    fn segment(households: &HouseholdFeatures) -> Segmentation {
        let model = fit_kmeans(households, &KMeansSettings::default()).unwrap();
        segment_households(households, &model).unwrap()
    }

    #[test]
    fn test_lowest_mean_cluster_is_secondary() {
        let households = create_test_households();
        let segmentation = segment(&households);

        let types: Vec<ResidenceType> = segmentation.households.iter().map(|h| h.residence).collect();
        assert_eq!(
            types,
            vec![
                ResidenceType::Main,
                ResidenceType::Secondary,
                ResidenceType::Main,
                ResidenceType::Secondary,
                ResidenceType::Main,
            ]
        );
    }

    #[test]
    fn test_summaries_by_type() {
        let households = create_test_households();
        let segmentation = segment(&households);

        assert_eq!(
            segmentation.counts_by_type(),
            vec![(ResidenceType::Main, 3), (ResidenceType::Secondary, 2)]
        );

        let means = segmentation.mean_consumption_by_type();
        assert_eq!(means.len(), 2);
        assert_eq!(means[0].0, ResidenceType::Main);
        assert!((means[0].1 - 1183.333333).abs() < 1e-3);
        assert!((means[1].1 - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_clusters_keep_single_secondary() {
        let households = create_test_households();
        let settings = KMeansSettings {
            n_clusters: 3,
            ..KMeansSettings::default()
        };
        let model = fit_kmeans(&households, &settings).unwrap();
        let segmentation = segment_households(&households, &model).unwrap();

        let secondary_clusters = segmentation
            .cluster_types
            .iter()
            .filter(|t| **t == Some(ResidenceType::Secondary))
            .count();
        assert_eq!(secondary_clusters, 1);
        assert_eq!(segmentation.len(), 5);
    }

    #[test]
    fn test_tied_clusters_and_empty_cluster() {
        let raw_features = Array2::from_shape_vec(
            (4, 4),
            vec![
                40.0, 10.0, 90.0, 5.0, //
                60.0, 12.0, 95.0, 6.0, //
                60.0, 11.0, 92.0, 5.0, //
                40.0, 13.0, 97.0, 4.0,
            ],
        )
        .unwrap();
        let ids = (1..=4).map(|i| i.to_string()).collect();
        let households = HouseholdFeatures::from_raw(ids, raw_features, vec![8; 4]).unwrap();

        // Clusters 0 and 2 both average 50; cluster 1 has no member
        let model = KMeansModel {
            n_clusters: 3,
            labels: Array1::from(vec![2, 0, 2, 0]),
            centroids: Array2::zeros((3, 4)),
            inertia: 0.0,
        };
        let segmentation = segment_households(&households, &model).unwrap();

        assert_eq!(
            segmentation.cluster_types,
            vec![Some(ResidenceType::Secondary), None, Some(ResidenceType::Main)]
        );
        assert_eq!(segmentation.residence_of_cluster(1), None);
        assert_eq!(segmentation.residence_of_cluster(0), Some(ResidenceType::Secondary));
        assert_eq!(segmentation.households[0].residence, ResidenceType::Main);
        assert_eq!(segmentation.households[1].residence, ResidenceType::Secondary);
    }

    #[test]
    fn test_head_is_bounded() {
        let households = create_test_households();
        let segmentation = segment(&households);

        assert_eq!(segmentation.head(2).len(), 2);
        assert_eq!(segmentation.head(2)[0].id, "a");
        assert_eq!(segmentation.head(50).len(), 5);
    }

    #[test]
    fn test_export_segmentation() {
        let households = create_test_households();
        let segmentation = segment(&households);
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("segmentation.csv");

        export_segmentation(&segmentation, path.to_str().unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ID,mean,std,max,min,count,Cluster,Type_Residence"
        );
        assert_eq!(lines.count(), 5);
        assert!(content.contains("Secondary residence"));
    }
}
