//! permivar - Permutational variance partitioning CLI
//!
//! Command-line interface for distance-based PERMANOVA analyses.

use clap::{Parser, Subcommand};
use permivar::adonis::adonis;
use permivar::aggregate::{aggregate, flatten};
use permivar::config::AnalysisConfig;
use permivar::data::{
    AxisLoadings, DesignFormula, DistanceMatrix, MetadataTable, OrdinationAxes, PermanovaResult,
    SampleAttributes,
};
use permivar::error::Result;
use std::path::PathBuf;

/// Permutational variance partitioning for community distance matrices
#[derive(Parser)]
#[command(name = "permivar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a PERMANOVA from an analysis configuration YAML
    Adonis {
        /// Path to lower-triangular distance file
        #[arg(short, long)]
        dist: PathBuf,

        /// Path to metadata TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Path to analysis configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Output path for the effects TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Drop distance-matrix samples without metadata instead of failing
        #[arg(long)]
        inner: bool,

        /// Also write the full per-run tables as JSON next to the output
        #[arg(long)]
        json: bool,
    },

    /// Join PCoA coordinates with factors for plotting
    Axes {
        /// Path to PCoA axes TSV (group + axis1..axisK)
        #[arg(short, long)]
        axes: PathBuf,

        /// Path to metadata TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Path to analysis configuration YAML (for factor levels)
        #[arg(short, long)]
        config: PathBuf,

        /// Output path for the joined TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Optional axis loadings TSV (axis + loading)
        #[arg(short, long)]
        loadings: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Adonis {
            dist,
            metadata,
            config,
            output,
            inner,
            json,
        } => cmd_adonis(&dist, &metadata, &config, &output, inner, json),

        Commands::Axes {
            axes,
            metadata,
            config,
            output,
            loadings,
        } => cmd_axes(&axes, &metadata, &config, &output, loadings.as_ref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the configured PERMANOVA, optionally once per subset level.
fn cmd_adonis(
    dist_path: &PathBuf,
    metadata_path: &PathBuf,
    config_path: &PathBuf,
    output_path: &PathBuf,
    inner: bool,
    json: bool,
) -> Result<()> {
    eprintln!("Loading analysis configuration from {:?}...", config_path);
    let config = AnalysisConfig::from_yaml_path(config_path)?;
    let formula = DesignFormula::parse(&config.formula)?;

    eprintln!("Loading data...");
    let mut dist = DistanceMatrix::from_path(dist_path)?;
    let metadata = MetadataTable::from_tsv(metadata_path, &config.id_column)?;
    eprintln!("Loaded {} samples", dist.n_samples());

    let attrs = if inner {
        let (attrs, kept) =
            SampleAttributes::join_inner(dist.labels(), &metadata, &config.factors)?;
        if kept.len() < dist.n_samples() {
            eprintln!(
                "  dropped {} samples without metadata",
                dist.n_samples() - kept.len()
            );
        }
        dist = dist.subset(&kept)?;
        attrs
    } else {
        SampleAttributes::join(dist.labels(), &metadata, &config.factors)?
    };

    eprintln!("Design: {}", formula);

    match &config.subset_by {
        Some(subset_col) => {
            let levels: Vec<String> = attrs.column(subset_col)?.levels.clone();
            let mut results: Vec<(String, PermanovaResult)> = Vec::new();
            for level in &levels {
                let (sub_attrs, kept) = attrs.subset_where(subset_col, level)?;
                if kept.is_empty() {
                    log::info!("subset {}={} has no samples, skipping", subset_col, level);
                    continue;
                }
                eprintln!("Analyzing {}={} ({} samples)...", subset_col, level, kept.len());
                let sub_dist = dist.subset(&kept)?;
                let strata = match &config.strata {
                    Some(col) => Some(sub_attrs.strata(col)?),
                    None => None,
                };
                let result = adonis(
                    &sub_dist,
                    &sub_attrs,
                    &formula,
                    strata.as_ref(),
                    config.permutations,
                    config.seed,
                )?;
                report(&result);
                results.push((level.clone(), result));
            }
            eprintln!("Writing results to {:?}...", output_path);
            let table = aggregate(&results, subset_col);
            table.to_tsv(output_path)?;
            if json {
                write_json(output_path, &results)?;
            }
            eprintln!("Done! {} subset analyses", results.len());
        }
        None => {
            let strata = match &config.strata {
                Some(col) => Some(attrs.strata(col)?),
                None => None,
            };
            eprintln!(
                "Running {} permutations (seed {})...",
                config.permutations, config.seed
            );
            let result = adonis(
                &dist,
                &attrs,
                &formula,
                strata.as_ref(),
                config.permutations,
                config.seed,
            )?;
            report(&result);
            eprintln!("Writing results to {:?}...", output_path);
            flatten(&result).to_tsv(output_path)?;
            if json {
                write_json(output_path, &[(String::new(), result)])?;
            }
            eprintln!("Done!");
        }
    }

    Ok(())
}

/// Print one result table to stderr.
fn report(result: &PermanovaResult) {
    if result.exhaustive {
        eprintln!(
            "  exact test over {} distinct arrangements",
            result.permutations
        );
    }
    for row in result.term_rows() {
        eprintln!(
            "  {}\tR2={:.4}\tp={:.4}",
            row.term,
            row.r_squared,
            row.p_value.unwrap_or(f64::NAN)
        );
    }
}

fn write_json(output_path: &PathBuf, results: &[(String, PermanovaResult)]) -> Result<()> {
    let json_path = output_path.with_extension("json");
    let payload: Vec<_> = results.iter().collect();
    std::fs::write(&json_path, serde_json::to_string_pretty(&payload)?)?;
    eprintln!("Wrote full tables to {:?}", json_path);
    Ok(())
}

/// Join ordination coordinates with factors for external plotting.
fn cmd_axes(
    axes_path: &PathBuf,
    metadata_path: &PathBuf,
    config_path: &PathBuf,
    output_path: &PathBuf,
    loadings_path: Option<&PathBuf>,
) -> Result<()> {
    let config = AnalysisConfig::from_yaml_path(config_path)?;

    eprintln!("Loading coordinates from {:?}...", axes_path);
    let axes = OrdinationAxes::from_tsv(axes_path)?;
    let metadata = MetadataTable::from_tsv(metadata_path, &config.id_column)?;
    eprintln!("Loaded {} samples x {} axes", axes.n_samples(), axes.n_axes());

    if let Some(path) = loadings_path {
        let loadings = AxisLoadings::from_tsv(path)?;
        for axis in 1..=axes.n_axes() {
            if let Some(pct) = loadings.percent(axis) {
                eprintln!("  axis{}: {:.1}% of variance", axis, pct);
            }
        }
    }

    let (attrs, kept) =
        SampleAttributes::join_inner(axes.labels(), &metadata, &config.factors)?;
    if kept.len() < axes.n_samples() {
        eprintln!(
            "  dropped {} samples without metadata",
            axes.n_samples() - kept.len()
        );
    }
    let table = axes.join(&attrs)?;

    eprintln!("Writing joined table to {:?}...", output_path);
    let factor_columns: Vec<String> = config
        .factors
        .columns()
        .map(str::to_string)
        .collect();
    table.to_tsv(output_path, &factor_columns)?;
    eprintln!("Done! {} rows", table.n_rows());

    Ok(())
}
