//! Synheart Activity CLI
//!
//! Train and evaluate the activity classifier on merged sensor recordings.

use anyhow::{Context, Result};
use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::AutodiffBackend;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synheart_activity::{
    config::{Config, DeviceKind},
    dataset::LabelSource,
    Pipeline, PreparedData, RunReport, VERSION,
};
use tracing_subscriber::EnvFilter;

type CpuBackend = Autodiff<NdArray>;

#[cfg(feature = "wgpu")]
type GpuBackend = Autodiff<burn::backend::Wgpu>;

#[derive(Parser)]
#[command(name = "synheart-activity")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Human activity recognition from phone motion sensors", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge, window, train and evaluate
    Train {
        #[command(flatten)]
        run: RunArgs,

        /// Number of training epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Mini-batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Adam learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Compute device (cpu or gpu)
        #[arg(long)]
        device: Option<String>,

        /// Directory for the JSON run report
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Merge and window the data without training
    Inspect {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the default config file
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Overrides shared by every subcommand that touches the data.
#[derive(Args)]
struct RunArgs {
    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device-motion modality root
    #[arg(long)]
    device_motion: Option<PathBuf>,

    /// Accelerometer modality root
    #[arg(long)]
    accelerometer: Option<PathBuf>,

    /// Gyroscope modality root
    #[arg(long)]
    gyroscope: Option<PathBuf>,

    /// Strip a trailing `_<number>` from activity folder names to form labels
    #[arg(long)]
    label_prefix: bool,

    /// Rows per window
    #[arg(long)]
    window: Option<usize>,

    /// Rows between window starts
    #[arg(long)]
    stride: Option<usize>,

    /// Fraction of windows held out for evaluation
    #[arg(long)]
    test_ratio: Option<f64>,

    /// Seed for initialization, split and shuffling
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    /// Load the base configuration and apply command-line overrides.
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::load().context("failed to load config")?,
        };

        if let Some(p) = &self.device_motion {
            config.sources.device_motion = p.clone();
        }
        if let Some(p) = &self.accelerometer {
            config.sources.accelerometer = p.clone();
        }
        if let Some(p) = &self.gyroscope {
            config.sources.gyroscope = p.clone();
        }
        if self.label_prefix {
            config.sources.label_source = LabelSource::FolderPrefix;
        }
        if let Some(w) = self.window {
            config.window_size = w;
        }
        if let Some(s) = self.stride {
            config.stride = s;
        }
        if let Some(r) = self.test_ratio {
            config.test_ratio = r;
        }
        if let Some(s) = self.seed {
            config.seed = s;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Train {
            run,
            epochs,
            batch_size,
            learning_rate,
            device,
            output,
        } => run.resolve().and_then(|mut config| {
            if let Some(e) = epochs {
                config.epochs = e;
            }
            if let Some(b) = batch_size {
                config.batch_size = b;
            }
            if let Some(lr) = learning_rate {
                config.learning_rate = lr;
            }
            if let Some(d) = device {
                config.device = DeviceKind::parse(&d)
                    .with_context(|| format!("unknown device '{d}' (expected cpu or gpu)"))?;
            }
            if let Some(o) = output {
                config.output_path = o;
            }
            cmd_train(config)
        }),
        Commands::Inspect { run } => run.resolve().and_then(cmd_inspect),
        Commands::Config { save, run } => run.resolve().and_then(|c| cmd_config(c, save)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_train(config: Config) -> Result<()> {
    println!("Synheart Activity v{VERSION}");
    println!();

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let config = pipeline.config();
    config
        .ensure_directories()
        .context("failed to create output directory")?;

    let data = prepare(&pipeline)?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    println!();
    println!(
        "Training for {} epochs (batch {}, lr {}, device {})",
        config.epochs, config.batch_size, config.learning_rate, config.device
    );
    println!("Press Ctrl+C to stop after the current epoch");
    println!();

    let report = match config.device {
        DeviceKind::Cpu => train_on::<CpuBackend>(&pipeline, &data, Default::default(), stop)?,
        #[cfg(feature = "wgpu")]
        DeviceKind::Gpu => train_on::<GpuBackend>(&pipeline, &data, Default::default(), stop)?,
        #[cfg(not(feature = "wgpu"))]
        DeviceKind::Gpu => anyhow::bail!("gpu device requested but the wgpu feature is not enabled"),
    };

    if report.history.interrupted {
        println!();
        println!(
            "Training stopped after {} epoch(s)",
            report.history.epochs.len()
        );
    }

    println!();
    println!("Training curves");
    println!("===============");
    print!("{}", report.history.render_curves());
    if let Some(best) = report.history.best_test_epoch() {
        println!(
            "Best test accuracy {:.4} at epoch {}",
            best.test.accuracy, best.epoch
        );
    }

    println!();
    println!("Classification report");
    println!("=====================");
    print!("{}", report.report.render());

    println!();
    println!("Confusion matrix");
    println!("================");
    print!("{}", report.confusion.render());

    println!();
    println!("Sample predictions");
    println!("==================");
    print!("{}", report.render_samples());

    let path = report
        .save(&config.output_path)
        .context("failed to write run report")?;
    println!();
    println!("Run report written to {path:?}");
    Ok(())
}

fn train_on<B: AutodiffBackend>(
    pipeline: &Pipeline,
    data: &PreparedData,
    device: B::Device,
    stop: Arc<AtomicBool>,
) -> Result<RunReport> {
    let report = pipeline
        .train::<B, _>(data, device, Some(stop), |metrics| println!("{metrics}"))
        .context("training failed")?;
    Ok(report)
}

fn cmd_inspect(config: Config) -> Result<()> {
    println!("Synheart Activity v{VERSION}");
    println!();

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let data = prepare(&pipeline)?;

    println!();
    println!("Features ({}):", data.feature_names.len());
    for name in &data.feature_names {
        println!("  {name}");
    }

    println!();
    println!("Windows per activity:");
    for (class, count) in &data.class_counts {
        println!("  {class:<20} {count}");
    }
    Ok(())
}

/// Run the data stages, printing a line per stage.
fn prepare(pipeline: &Pipeline) -> Result<PreparedData> {
    let config = pipeline.config();
    let sources = &config.sources;
    println!("Loading trials...");
    println!("  Device motion: {:?}", sources.device_motion);
    println!("  Accelerometer: {:?}", sources.accelerometer);
    println!("  Gyroscope:     {:?}", sources.gyroscope);

    let (table, merge) = pipeline.load().context("failed to merge modalities")?;
    println!(
        "  Merged {} trials ({} skipped), {} rows x {} columns",
        merge.accepted_trials, merge.skipped_trials, merge.rows, merge.columns
    );

    println!(
        "Windowing (size {}, stride {})...",
        config.window_size, config.stride
    );
    let set = pipeline.window(&table).context("failed to window data")?;
    let short = table.trials().len() - set.trials_covered();
    if short > 0 {
        println!(
            "  {} windows ({short} trial(s) shorter than one window)",
            set.len()
        );
    } else {
        println!("  {} windows", set.len());
    }

    let feature_names = table.columns().to_vec();
    drop(table);

    println!("Normalizing, encoding and splitting...");
    let data = pipeline
        .prepare_windows(set, merge, feature_names)
        .context("failed to prepare datasets")?;
    println!(
        "  {} classes: {}",
        data.encoder.len(),
        data.encoder.classes().join(", ")
    );
    println!(
        "  Train: {} windows, Test: {} windows",
        data.train.len(),
        data.test.len()
    );
    Ok(data)
}

fn cmd_config(config: Config, save: bool) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("failed to serialize config")?
    );

    if save {
        config.validate().context("invalid configuration")?;
        config.save().context("failed to save config")?;
        println!();
        println!("Saved to {:?}", Config::config_path());
    }
    Ok(())
}
