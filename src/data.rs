//! Data loading and per-household feature computation using Polars

use anyhow::Context;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Number of summary statistics computed per household
pub const N_FEATURES: usize = 4;

/// Column layout of the feature matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureColumn {
    /// Average consumption
    Mean,
    /// Variability, very high for secondary residences
    Std,
    /// Peak power
    Max,
    /// Base load
    Min,
}

impl FeatureColumn {
    pub fn index(self) -> usize {
        match self {
            FeatureColumn::Mean => 0,
            FeatureColumn::Std => 1,
            FeatureColumn::Max => 2,
            FeatureColumn::Min => 3,
        }
    }
}

/// Column-wise standardization to zero mean and unit variance
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    /// Per-column mean of the fitted data
    pub mean: Array1<f64>,
    /// Per-column population standard deviation, 1.0 for constant columns
    pub scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit the scaler on a (n_samples, n_features) matrix
    pub fn fit(data: &Array2<f64>) -> Self {
        let n_features = data.ncols();
        if data.nrows() == 0 {
            return Self {
                mean: Array1::zeros(n_features),
                scale: Array1::ones(n_features),
            };
        }

        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        Self { mean, scale }
    }

    /// Standardize every row with the fitted parameters
    pub fn transform(&self, data: Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }
}

/// Field values read as missing, matching the pandas defaults
const MISSING_VALUE_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Options controlling how the load-curve CSV is read
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub id_column: String,
    pub value_column: String,
    pub separator: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            id_column: "ID".to_string(),
            value_column: "valeur".to_string(),
            separator: b',',
        }
    }
}

/// Per-household statistics and their standardized form
#[derive(Debug, Clone)]
pub struct HouseholdFeatures {
    /// Household identifiers, one per row, ascending
    pub household_ids: Vec<String>,
    /// Standardized features (n_households, 4)
    pub features: Array2<f64>,
    /// Raw [mean, std, max, min] per household
    pub raw_features: Array2<f64>,
    /// Number of measurements behind each row
    pub readings: Vec<u64>,
    /// Scaler fitted on `raw_features`
    pub scaler: StandardScaler,
}

impl HouseholdFeatures {
    /// Build the table from already aggregated statistics and fit the scaler
    pub fn from_raw(
        household_ids: Vec<String>,
        raw_features: Array2<f64>,
        readings: Vec<u64>,
    ) -> crate::Result<Self> {
        if raw_features.ncols() != N_FEATURES {
            anyhow::bail!(
                "Feature matrix must have exactly {} columns, got {}",
                N_FEATURES,
                raw_features.ncols()
            );
        }
        if household_ids.len() != raw_features.nrows() || readings.len() != raw_features.nrows() {
            anyhow::bail!(
                "Row count mismatch: {} ids, {} feature rows, {} reading counts",
                household_ids.len(),
                raw_features.nrows(),
                readings.len()
            );
        }
        if household_ids.is_empty() {
            anyhow::bail!("No households found after aggregation");
        }

        let scaler = StandardScaler::fit(&raw_features);
        let features = scaler.transform(raw_features.clone());

        Ok(Self {
            household_ids,
            features,
            raw_features,
            readings,
            scaler,
        })
    }

    pub fn len(&self) -> usize {
        self.household_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.household_ids.is_empty()
    }

    /// Raw values of one statistic across all households
    pub fn column(&self, column: FeatureColumn) -> Vec<f64> {
        self.raw_features.column(column.index()).to_vec()
    }

    /// Scale new household statistics using the fitted scaler
    pub fn scale_new_data(&self, profile: &[f64; N_FEATURES]) -> crate::Result<Array1<f64>> {
        let input = Array2::from_shape_vec((1, N_FEATURES), profile.to_vec())?;
        let scaled = self.scaler.transform(input);
        Ok(scaled.row(0).to_owned())
    }
}

/// Load the load-curve CSV and compute per-household statistics
///
/// # Arguments
/// * `file_path` - Path to the CSV file, one measurement per row
/// * `options` - Column names and separator
///
/// # Returns
/// * `HouseholdFeatures` with one row per distinct household identifier
pub fn load_and_process_data(
    file_path: &str,
    options: &LoadOptions,
) -> crate::Result<HouseholdFeatures> {
    if !Path::new(file_path).is_file() {
        anyhow::bail!("Input file not found: {}", file_path);
    }

    let measurements = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_separator(options.separator)
        .with_null_values(Some(NullValues::AllColumns(
            MISSING_VALUE_TOKENS.iter().map(|token| (*token).into()).collect(),
        )))
        .finish()
        .with_context(|| format!("Failed to read CSV file {}", file_path))?;

    let aggregated = compute_household_statistics(measurements, options)
        .with_context(|| {
            format!(
                "Failed to aggregate column '{}' by '{}' in {}",
                options.value_column, options.id_column, file_path
            )
        })?;

    if aggregated.height() == 0 {
        anyhow::bail!("No valid measurements found in {}", file_path);
    }

    prepare_features(aggregated)
}

/// Group measurements by household and compute mean, std, max, min
fn compute_household_statistics(
    measurements: LazyFrame,
    options: &LoadOptions,
) -> crate::Result<DataFrame> {
    let df = measurements
        .select([
            col(options.id_column.as_str()).alias("ID"),
            col(options.value_column.as_str())
                .cast(DataType::Float64)
                .alias("valeur"),
        ])
        .filter(
            col("ID")
                .is_not_null()
                .and(col("valeur").is_not_null())
                .and(col("valeur").is_not_nan()),
        )
        .group_by([col("ID")])
        .agg([
            col("valeur").mean().alias("mean"),
            col("valeur").std(1).alias("std"),
            col("valeur").max().alias("max"),
            col("valeur").min().alias("min"),
            col("valeur").count().cast(DataType::UInt64).alias("count"),
        ])
        // Sort on the native id type so numeric ids keep numeric order
        .sort(["ID"], SortMultipleOptions::default())
        .with_columns([col("ID").cast(DataType::String)])
        .collect()?;

    Ok(df)
}

/// Convert the aggregated DataFrame to ndarray and fit the scaler
fn prepare_features(df: DataFrame) -> crate::Result<HouseholdFeatures> {
    let household_ids: Vec<String> = df
        .column("ID")?
        .str()?
        .into_iter()
        .map(|id| id.unwrap_or_default().to_string())
        .collect();

    let mean = float_column(&df, "mean")?;
    let max = float_column(&df, "max")?;
    let min = float_column(&df, "min")?;

    let readings: Vec<u64> = df.column("count")?.u64()?.into_no_null_iter().collect();

    // Sample std is undefined for a single measurement; it has no spread
    let mut std = Vec::with_capacity(household_ids.len());
    for ((value, id), &count) in df
        .column("std")?
        .f64()?
        .into_iter()
        .zip(household_ids.iter())
        .zip(readings.iter())
    {
        match value {
            Some(s) if s.is_finite() => std.push(s),
            _ if count == 1 => {
                debug!(household = %id, "single measurement, std set to 0");
                std.push(0.0);
            }
            _ => anyhow::bail!(
                "Non-finite standard deviation for household {} ({} measurements)",
                id,
                count
            ),
        }
    }

    let n_samples = household_ids.len();
    let mut raw_data = Vec::with_capacity(n_samples * N_FEATURES);
    for i in 0..n_samples {
        raw_data.extend_from_slice(&[mean[i], std[i], max[i], min[i]]);
    }
    let raw_features = Array2::from_shape_vec((n_samples, N_FEATURES), raw_data)?;

    debug!(households = n_samples, "computed household statistics");

    HouseholdFeatures::from_raw(household_ids, raw_features, readings)
}

fn float_column(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    let values = df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ID,horodate,valeur").unwrap();
        writeln!(file, "2,2023-01-01T00:00:00Z,100.0").unwrap();
        writeln!(file, "1,2023-01-01T00:00:00Z,10.0").unwrap();
        writeln!(file, "2,2023-01-01T00:30:00Z,300.0").unwrap();
        writeln!(file, "1,2023-01-01T00:30:00Z,20.0").unwrap();
        writeln!(file, "1,2023-01-01T01:00:00Z,30.0").unwrap();
        writeln!(file, "10,2023-01-01T00:00:00Z,50.0").unwrap();
        file
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_load_and_process_data() {
        let test_file = create_test_csv();
        let file_path = test_file.path().to_str().unwrap();

        let households = load_and_process_data(file_path, &LoadOptions::default()).unwrap();
        assert_eq!(households.features.shape(), &[3, 4]);
        assert_eq!(households.household_ids, vec!["1", "2", "10"]);
        assert_eq!(households.readings, vec![3, 2, 1]);
    }

    #[test]
    fn test_household_statistics() {
        let test_file = create_test_csv();
        let file_path = test_file.path().to_str().unwrap();

        let households = load_and_process_data(file_path, &LoadOptions::default()).unwrap();
        let first = households.raw_features.row(0);
        assert!(approx(first[0], 20.0));
        assert!(approx(first[1], 10.0)); // sample std of 10, 20, 30
        assert!(approx(first[2], 30.0));
        assert!(approx(first[3], 10.0));

        let second = households.raw_features.row(1);
        assert!(approx(second[0], 200.0));
        assert!(approx(second[1], 200f64.sqrt() * 10.0));

        // Single measurement household
        let third = households.raw_features.row(2);
        assert!(approx(third[1], 0.0));
        assert!(approx(third[2], 50.0));
        assert!(approx(third[3], 50.0));
    }

    #[test]
    fn test_custom_columns_and_separator() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "compteur;puissance").unwrap();
        writeln!(file, "A;1.5").unwrap();
        writeln!(file, "B;2.5").unwrap();
        writeln!(file, "A;3.5").unwrap();

        let options = LoadOptions {
            id_column: "compteur".to_string(),
            value_column: "puissance".to_string(),
            separator: b';',
        };
        let households = load_and_process_data(file.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(households.household_ids, vec!["A", "B"]);
        assert!(approx(households.column(FeatureColumn::Mean)[0], 2.5));
    }

    #[test]
    fn test_nan_reading_is_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ID,valeur").unwrap();
        writeln!(file, "1,10.0").unwrap();
        writeln!(file, "1,NaN").unwrap();
        writeln!(file, "1,30.0").unwrap();
        writeln!(file, "2,5.0").unwrap();
        writeln!(file, "2,7.0").unwrap();

        let households =
            load_and_process_data(file.path().to_str().unwrap(), &LoadOptions::default())
                .unwrap();
        assert_eq!(households.readings, vec![2, 2]);

        let first = households.raw_features.row(0);
        assert!(approx(first[0], 20.0));
        assert!(approx(first[1], 200f64.sqrt()));
        assert!(approx(first[2], 30.0));
        assert!(approx(first[3], 10.0));
        assert!(households.features.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_na_token_after_inference_window() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ID,valeur").unwrap();
        for i in 0..300 {
            writeln!(file, "{},{}.5", i % 3 + 1, 100 + i).unwrap();
        }
        writeln!(file, "1,NA").unwrap();

        let households =
            load_and_process_data(file.path().to_str().unwrap(), &LoadOptions::default())
                .unwrap();
        assert_eq!(households.household_ids, vec!["1", "2", "3"]);
        assert_eq!(households.readings, vec![100, 100, 100]);
    }

    #[test]
    fn test_rows_with_null_id_or_value_are_dropped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ID,valeur").unwrap();
        writeln!(file, "1,5.0").unwrap();
        writeln!(file, "2,").unwrap();
        writeln!(file, ",4.0").unwrap();
        writeln!(file, "2,7.0").unwrap();
        writeln!(file, "3,").unwrap();

        let households =
            load_and_process_data(file.path().to_str().unwrap(), &LoadOptions::default())
                .unwrap();
        assert_eq!(households.household_ids, vec!["1", "2"]);
        assert_eq!(households.readings, vec![1, 1]);
        assert!(approx(households.column(FeatureColumn::Mean)[1], 7.0));
    }

    #[test]
    fn test_missing_column_is_error() {
        let test_file = create_test_csv();
        let options = LoadOptions {
            value_column: "kwh".to_string(),
            ..LoadOptions::default()
        };
        let result = load_and_process_data(test_file.path().to_str().unwrap(), &options);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_and_process_data("/nonexistent/load_curves.csv", &LoadOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let raw = Array2::from_shape_vec(
            (3, 2),
            vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0],
        )
        .unwrap();
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(raw);

        let column = scaled.column(0);
        assert!(approx(column.sum(), 0.0));
        let variance = column.iter().map(|v| v * v).sum::<f64>() / column.len() as f64;
        assert!(approx(variance, 1.0));

        // Constant column maps to zero
        assert!(scaled.column(1).iter().all(|&v| approx(v, 0.0)));
    }

    #[test]
    fn test_scale_new_data() {
        let test_file = create_test_csv();
        let households =
            load_and_process_data(test_file.path().to_str().unwrap(), &LoadOptions::default())
                .unwrap();

        let scaled = households.scale_new_data(&[20.0, 10.0, 30.0, 10.0]).unwrap();
        assert_eq!(scaled.len(), 4);
        for (a, b) in scaled.iter().zip(households.features.row(0).iter()) {
            assert!(approx(*a, *b));
        }
    }

    #[test]
    fn test_from_raw_rejects_mismatched_rows() {
        let raw = Array2::zeros((2, 4));
        let result = HouseholdFeatures::from_raw(vec!["a".to_string()], raw, vec![1, 1]);
        assert!(result.is_err());
    }
}
