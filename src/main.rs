//! mammoscan CLI
//!
//! Entry point for the partition / train / evaluate pipeline and its
//! supporting commands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use mammoscan::backend::backend_name;
use mammoscan::config::{validate_threshold, PipelineConfig};
use mammoscan::dataset::{
    DatasetPartitioner, ImageCatalog, ImageLoader, PartitionWriter, ProcessedDataset, SplitConfig,
    SplitName,
};
use mammoscan::evaluation::{
    select_champion, EvaluationHarness, EvaluationReport, EvaluationRequest,
};
use mammoscan::model::{CancellationToken, ModelKind, ModelRegistry};
use mammoscan::training::{EpochProgress, TrainingOrchestrator, TrainingRun};
use mammoscan::utils::logging::{init_logging, LogConfig};
use mammoscan::PipelineError;

/// Leakage-free partitioning, class-balanced training and threshold-calibrated
/// evaluation for binary image classifiers
#[derive(Parser, Debug)]
#[command(name = "mammoscan")]
#[command(version)]
#[command(about = "Binary image classification pipeline with Burn", long_about = None)]
struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split the raw dataset and write the processed train/val/test layout
    Partition {
        /// Raw dataset root holding the original and augmented subtrees
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Output directory for the processed layout
        #[arg(long)]
        processed_dir: Option<PathBuf>,

        /// Fraction of original samples held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Fraction of original samples held out for validation
        #[arg(long)]
        val_fraction: Option<f64>,

        /// Random seed for the split
        #[arg(long)]
        seed: Option<u64>,

        /// Side length of the written images
        #[arg(long)]
        image_size: Option<u32>,
    },

    /// Train one architecture on the processed train/val partitions
    ///
    /// The checkpoint is staged and renamed into place only once training
    /// finishes. Interrupting the process leaves any previous checkpoint at
    /// --checkpoint untouched.
    Train {
        /// Architecture to train (baseline, transfer)
        #[arg(short, long)]
        model_name: String,

        /// Where to write the checkpoint
        #[arg(long)]
        checkpoint: PathBuf,

        #[arg(long)]
        processed_dir: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Epochs without validation-loss improvement before stopping
        #[arg(long)]
        patience: Option<usize>,

        /// Randomly flip training images
        #[arg(long)]
        augment: bool,
    },

    /// Evaluate a checkpoint on the processed test partition
    Evaluate {
        /// Architecture the checkpoint was trained as
        #[arg(short, long)]
        model_name: String,

        #[arg(long)]
        checkpoint: PathBuf,

        /// Output path of the JSON report
        #[arg(short, long)]
        report: PathBuf,

        #[arg(long)]
        processed_dir: Option<PathBuf>,

        /// Decision threshold in (0, 1)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Show raw dataset statistics
    Analyze {
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Also write the statistics as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a single image
    Predict {
        #[arg(short, long)]
        model_name: String,

        #[arg(long)]
        checkpoint: PathBuf,

        #[arg(short, long)]
        image: PathBuf,

        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Select the champion among evaluation reports
    Promote {
        /// Evaluation report files
        #[arg(long, num_args = 1.., required = true)]
        reports: Vec<PathBuf>,

        /// Output path of champion.json
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum positive-class precision a candidate must reach
        #[arg(long)]
        min_precision: Option<f64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Partition {
            raw_dir,
            processed_dir,
            test_fraction,
            val_fraction,
            seed,
            image_size,
        } => {
            let mut config = config;
            if let Some(dir) = raw_dir {
                config.paths.raw_dir = dir;
            }
            if let Some(dir) = processed_dir {
                config.paths.processed_dir = dir;
            }
            if let Some(f) = test_fraction {
                config.split.test_fraction = f;
            }
            if let Some(f) = val_fraction {
                config.split.val_fraction = f;
            }
            if let Some(s) = seed {
                config.split.seed = s;
            }
            if let Some(size) = image_size {
                config.image.height = size as usize;
                config.image.width = size as usize;
            }
            config.validate()?;
            cmd_partition(&config)
        }

        Commands::Train {
            model_name,
            checkpoint,
            processed_dir,
            epochs,
            batch_size,
            learning_rate,
            patience,
            augment,
        } => {
            let model: ModelKind = model_name.parse()?;
            let mut config = config;
            if let Some(dir) = processed_dir {
                config.paths.processed_dir = dir;
            }
            if let Some(e) = epochs {
                config.training.epochs = e;
            }
            if let Some(b) = batch_size {
                config.training.batch_size = b;
            }
            if let Some(lr) = learning_rate {
                config.training.learning_rate = lr;
            }
            if let Some(p) = patience {
                config.training.early_stopping_patience = p;
            }
            if augment {
                config.training.augment = true;
            }
            config.validate()?;
            cmd_train(&config, model, &checkpoint)
        }

        Commands::Evaluate {
            model_name,
            checkpoint,
            report,
            processed_dir,
            threshold,
        } => {
            let model: ModelKind = model_name.parse()?;
            let mut config = config;
            if let Some(dir) = processed_dir {
                config.paths.processed_dir = dir;
            }
            if let Some(t) = threshold {
                config.evaluation.threshold = t;
            }
            config.validate()?;
            cmd_evaluate(&config, model, &checkpoint, &report)
        }

        Commands::Analyze { raw_dir, output } => {
            let mut config = config;
            if let Some(dir) = raw_dir {
                config.paths.raw_dir = dir;
            }
            config.validate()?;
            cmd_analyze(&config, output.as_deref())
        }

        Commands::Predict {
            model_name,
            checkpoint,
            image,
            threshold,
        } => {
            let model: ModelKind = model_name.parse()?;
            let threshold = threshold.unwrap_or(config.evaluation.threshold);
            validate_threshold(threshold)?;
            config.validate()?;
            cmd_predict(&config, model, &checkpoint, &image, threshold)
        }

        Commands::Promote {
            reports,
            output,
            min_precision,
        } => cmd_promote(&reports, &output, min_precision),
    }
}

fn print_banner() {
    println!(
        "{}",
        format!(
            "mammoscan v{} | binary image classification with Burn ({})",
            mammoscan::VERSION,
            backend_name()
        )
        .green()
        .bold()
    );
}

fn cmd_partition(config: &PipelineConfig) -> Result<()> {
    info!(
        "Partitioning {:?} into {:?}",
        config.paths.raw_dir, config.paths.processed_dir
    );

    let catalog = ImageCatalog::new(config.labels.clone())
        .scan(&config.paths.raw_dir)
        .with_context(|| format!("scanning {}", config.paths.raw_dir.display()))?;
    println!("{}", catalog.stats());

    let split = SplitConfig::new(
        config.split.test_fraction,
        config.split.val_fraction,
        config.split.seed,
    )?;
    let partitions = DatasetPartitioner::new(split)?.partition(&catalog)?;

    let manifest = PartitionWriter::new(config.labels.clone(), config.image.height as u32)?
        .write(&partitions, split, &config.paths.processed_dir)
        .context("writing processed partitions")?;

    println!("{}", "Partitions written".green().bold());
    println!("{}", manifest.stats);
    if manifest.skipped > 0 {
        println!(
            "{} {} source image(s) could not be read and were skipped",
            "Warning:".yellow(),
            manifest.skipped
        );
    }
    Ok(())
}

fn cmd_train(config: &PipelineConfig, model: ModelKind, checkpoint: &Path) -> Result<()> {
    let partitions = ProcessedDataset::open(&config.paths.processed_dir, &config.labels)?;
    let registry = ModelRegistry::standard(&config.transfer);
    let orchestrator = TrainingOrchestrator::new(&registry, ImageLoader::new(config.image));

    let mut observer = EpochProgress::new();
    let result = orchestrator.run(
        TrainingRun {
            model,
            train: partitions.get(SplitName::Train),
            val: partitions.get(SplitName::Val),
            config: &config.training,
            checkpoint_path: checkpoint,
        },
        &mut observer,
        CancellationToken::new(),
    )?;

    println!("{}", "Training complete".green().bold());
    println!("  Checkpoint:    {}", result.weights_path.display());
    println!("  Metadata:      {}", result.metadata_path.display());
    println!(
        "  Best epoch:    {} of {} (val loss {:.4})",
        result.metadata.best_epoch, result.metadata.epochs_run, result.metadata.best_val_loss
    );
    if result.metadata.stopped_early {
        println!("  {}", "Stopped early".yellow());
    }
    Ok(())
}

fn cmd_evaluate(
    config: &PipelineConfig,
    model: ModelKind,
    checkpoint: &Path,
    report_path: &Path,
) -> Result<()> {
    let partitions = ProcessedDataset::open(&config.paths.processed_dir, &config.labels)?;
    let registry = ModelRegistry::standard(&config.transfer);
    let harness = EvaluationHarness::new(&registry, ImageLoader::new(config.image))
        .with_labels(config.labels.clone());

    let report = harness.evaluate(&EvaluationRequest {
        model,
        checkpoint_path: checkpoint,
        test: partitions.get(SplitName::Test),
        threshold: config.evaluation.threshold,
    })?;
    report.save(report_path)?;

    report.print_summary();
    println!(
        "{} {}",
        "Report written to".green().bold(),
        report_path.display()
    );
    Ok(())
}

fn cmd_analyze(config: &PipelineConfig, output: Option<&Path>) -> Result<()> {
    let catalog = ImageCatalog::new(config.labels.clone())
        .scan(&config.paths.raw_dir)
        .with_context(|| format!("scanning {}", config.paths.raw_dir.display()))?;
    let stats = catalog.stats();
    println!("{}", stats);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&stats)?;
        mammoscan::utils::write_atomic(path, json.as_bytes())?;
        println!("{} {}", "Statistics written to".green(), path.display());
    }
    Ok(())
}

fn cmd_predict(
    config: &PipelineConfig,
    model: ModelKind,
    checkpoint: &Path,
    image: &Path,
    threshold: f64,
) -> Result<()> {
    let registry = ModelRegistry::standard(&config.transfer);
    let prediction = EvaluationHarness::new(&registry, ImageLoader::new(config.image))
        .with_labels(config.labels.clone())
        .predict_image(model, checkpoint, image, threshold)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn cmd_promote(reports: &[PathBuf], output: &Path, min_precision: Option<f64>) -> Result<()> {
    let loaded = reports
        .iter()
        .map(|path| EvaluationReport::load(path).map(|report| (path.clone(), report)))
        .collect::<mammoscan::Result<Vec<_>>>()?;

    let record = select_champion(&loaded, min_precision)?;
    record.save(output)?;

    println!(
        "{} {} ({}) at threshold {:.3}",
        "Champion:".green().bold(),
        record.champion.model_path,
        record.champion.model_name,
        record.champion.threshold
    );
    println!(
        "  recall {:.4}, precision {:.4}, f1 {:.4}",
        record.champion.recall, record.champion.precision, record.champion.f1
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_train_help_describes_interruption() {
        let cmd = Cli::command();
        let train = cmd.find_subcommand("train").unwrap();
        let help = train.get_long_about().unwrap().to_string();
        assert!(help.contains("previous checkpoint"));
    }

    #[test]
    fn test_train_augment_flag() {
        let cli = Cli::try_parse_from([
            "mammoscan", "train", "-m", "baseline", "--checkpoint", "m.mpk", "--augment",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Train { augment: true, .. }));
    }

    #[test]
    fn test_promote_requires_reports() {
        assert!(Cli::try_parse_from(["mammoscan", "promote", "--output", "c.json"]).is_err());
    }
}
