//! Command-line interface definitions and argument parsing

use clap::Parser;

/// Residence segmentation CLI using K-Means clustering on load-curve statistics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file with one measurement per row
    #[arg(short, long, default_value = "data/courbes-de-charges-fictives-res2-6-9.csv")]
    pub input: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "2")]
    pub clusters: usize,

    /// Output path for the scatter plot
    #[arg(short, long, default_value = "segmentation_residences.png")]
    pub output: String,

    /// Prediction mode: provide mean,std,max,min of a household as comma-separated string
    /// Example: --predict "850.0,420.5,3200.0,150.0"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Random seed for K-Means initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means restarts; the run with the lowest inertia is kept
    #[arg(long, default_value = "1")]
    pub n_runs: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Name of the household identifier column
    #[arg(long, default_value = "ID")]
    pub id_column: String,

    /// Name of the measurement column
    #[arg(long, default_value = "valeur")]
    pub value_column: String,

    /// CSV field separator
    #[arg(short, long, default_value = ",")]
    pub delimiter: String,

    /// Number of households shown in the preview table
    #[arg(long, default_value = "5")]
    pub head: usize,

    /// Optional path to export the segmentation table as CSV
    #[arg(long)]
    pub export: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Check numeric settings that clap cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.clusters < 2 {
            anyhow::bail!("At least 2 clusters are needed to separate residence types");
        }
        if self.n_runs == 0 {
            anyhow::bail!("--n-runs must be at least 1");
        }
        if self.max_iters == 0 {
            anyhow::bail!("--max-iters must be at least 1");
        }
        if !(self.tolerance > 0.0) {
            anyhow::bail!("--tolerance must be strictly positive, got {}", self.tolerance);
        }
        Ok(())
    }

    /// The delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> crate::Result<u8> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => anyhow::bail!(
                "Delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            ),
        }
    }

    /// Parse household statistics from the predict string
    /// Expected format: "mean,std,max,min"
    pub fn parse_profile_values(&self) -> crate::Result<Option<[f64; 4]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 4 {
            anyhow::bail!("Predict values must be in format 'mean,std,max,min'");
        }

        let names = ["mean", "std", "max", "min"];
        let mut values = [0.0; 4];
        for (slot, (name, raw)) in values.iter_mut().zip(names.iter().zip(parts.iter())) {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw))?;
            if !value.is_finite() {
                anyhow::bail!("Invalid {} value: {}", name, raw);
            }
            *slot = value;
        }

        Ok(Some(values))
    }
}
