//! rchurn Command Line Interface
//!
//! Preprocess raw customer data, train churn models, and serve or evaluate
//! predictions from the persisted artifact pairs.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info};
use rchurn::audit::{AuditEntry, AuditLog};
use rchurn::core::{ChurnError, ModelFamily, Result};
use rchurn::data::preprocess;
use rchurn::schema::{self, Domain};
use rchurn::{trainer, CustomerRecord, InferenceService, PipelineConfig, Trainer};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "rchurn")]
#[command(about = "Customer churn prediction: preprocessing, training and inference")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "rchurn contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean, encode and split a raw customer CSV
    Preprocess(PreprocessArgs),
    /// Train a churn model on processed splits
    Train(TrainArgs),
    /// Predict churn for a single customer record
    Predict(PredictArgs),
    /// Evaluate a trained model on the processed test split
    Evaluate(EvaluateArgs),
    /// Display artifact information
    Info(InfoArgs),
    /// Print the feature schema and category encodings
    Schema,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliModelFamily {
    /// L2-regularized logistic regression
    #[value(name = "logistic")]
    Logistic,
    /// Gradient-boosted trees
    #[value(name = "gradient-boosted", alias = "xgb")]
    GradientBoosted,
}

impl From<CliModelFamily> for ModelFamily {
    fn from(cli_family: CliModelFamily) -> Self {
        match cli_family {
            CliModelFamily::Logistic => ModelFamily::Logistic,
            CliModelFamily::GradientBoosted => ModelFamily::GradientBoosted,
        }
    }
}

#[derive(Args)]
struct PreprocessArgs {
    /// Raw customer CSV
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for X_train.csv, X_test.csv, y_train.csv, y_test.csv
    #[arg(short, long, default_value = "data/processed")]
    output_dir: PathBuf,

    /// Fraction of rows held out for testing
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Split seed
    #[arg(long)]
    seed: Option<u64>,

    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct TrainArgs {
    /// Directory holding the processed splits
    #[arg(long, default_value = "data/processed")]
    data_dir: PathBuf,

    /// Output directory for the artifact pair
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Model family
    #[arg(short, long, default_value = "logistic")]
    family: CliModelFamily,

    /// Skip SMOTE oversampling of the training split
    #[arg(long)]
    no_smote: bool,

    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inverse regularization strength (logistic)
    #[arg(short = 'C', long)]
    c: Option<f64>,

    /// Maximum Newton iterations (logistic)
    #[arg(short, long)]
    max_iterations: Option<usize>,

    /// Number of boosting rounds (gradient-boosted)
    #[arg(long)]
    n_estimators: Option<usize>,

    /// Shrinkage per boosting round (gradient-boosted)
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Seed for oversampling and row subsampling
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct PredictArgs {
    /// Directory holding the artifact pair
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Model family
    #[arg(short, long, default_value = "logistic")]
    family: CliModelFamily,

    /// JSON file with one customer record ("-" reads stdin)
    #[arg(short, long, conflicts_with = "sample", required_unless_present = "sample")]
    record: Option<PathBuf>,

    /// Score the built-in sample customer
    #[arg(long)]
    sample: bool,

    /// Record values are raw category labels instead of numeric codes
    #[arg(long)]
    categories: bool,

    /// Append the prediction to this CSV audit log
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Directory holding the artifact pair
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Model family
    #[arg(short, long, default_value = "logistic")]
    family: CliModelFamily,

    /// Directory holding the processed splits
    #[arg(long, default_value = "data/processed")]
    data_dir: PathBuf,
}

#[derive(Args)]
struct InfoArgs {
    /// Directory holding the artifact pair
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Model family
    #[arg(short, long, default_value = "logistic")]
    family: CliModelFamily,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Preprocess(args) => preprocess_command(args),
        Commands::Train(args) => train_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Evaluate(args) => evaluate_command(args),
        Commands::Info(args) => info_command(args),
        Commands::Schema => schema_command(),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {path:?}");
            PipelineConfig::from_file(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn preprocess_command(args: PreprocessArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?.preprocess;
    if let Some(test_fraction) = args.test_fraction {
        config.test_fraction = test_fraction;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    info!("Preprocessing {:?} into {:?}", args.input, args.output_dir);
    let report = preprocess::run(&args.input, &args.output_dir, &config)?;

    println!("=== Preprocessing Results ===");
    println!("Rows read:    {}", report.rows_read);
    println!("Rows dropped: {}", report.rows_dropped);
    println!(
        "Train rows:   {} (churn rate {:.2}%)",
        report.train_rows,
        report.train_churn_rate * 100.0
    );
    println!(
        "Test rows:    {} (churn rate {:.2}%)",
        report.test_rows,
        report.test_churn_rate * 100.0
    );
    println!("Output:       {}", report.output_dir.display());
    Ok(())
}

fn train_command(args: TrainArgs) -> Result<()> {
    let family = ModelFamily::from(args.family);
    let mut config = load_config(args.config.as_deref())?;

    if args.no_smote {
        config.balance.enabled = false;
    }
    if let Some(c) = args.c {
        config.logistic.c = c;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.logistic.max_iterations = max_iterations;
    }
    if let Some(n_estimators) = args.n_estimators {
        config.gradient_boosting.n_estimators = n_estimators;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.gradient_boosting.learning_rate = learning_rate;
    }
    if let Some(seed) = args.seed {
        config.balance.seed = seed;
        config.gradient_boosting.seed = seed;
    }

    info!("Training {family} model...");
    let trainer = Trainer::new(family, config)?;
    let report = trainer.run(&args.data_dir, &args.artifact_dir)?;

    println!("=== Training Results ===");
    println!("Family:         {}", report.family);
    println!("Pair ID:        {}", report.pair_id);
    println!(
        "Training rows:  {} (+{} synthetic)",
        report.training_rows, report.synthetic_rows
    );
    println!("Test rows:      {}", report.test_rows);
    println!("Scaler:         {}", report.scaler_path.display());
    println!("Model:          {}", report.model_path.display());
    println!("\nClassification report (test split):");
    println!("{}", report.evaluation);
    Ok(())
}

fn read_record_json(path: &Path) -> Result<Value> {
    let mut text = String::new();
    if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut text)?;
    } else {
        text = std::fs::read_to_string(path)?;
    }
    serde_json::from_str(&text).map_err(|e| ChurnError::SerializationError(e.to_string()))
}

/// Raw category labels; numbers are accepted and rendered as text
fn categories_from_json(value: &Value) -> Result<HashMap<String, String>> {
    let object = value.as_object().ok_or_else(|| {
        ChurnError::SerializationError("record must be a JSON object".to_string())
    })?;
    Ok(object
        .iter()
        .map(|(name, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect())
}

fn predict_command(args: PredictArgs) -> Result<()> {
    let family = ModelFamily::from(args.family);
    let service = InferenceService::load(&args.artifact_dir, family)?;

    let record = match &args.record {
        Some(path) => {
            let value = read_record_json(path)?;
            if args.categories {
                CustomerRecord::from_categories(&categories_from_json(&value)?)?
            } else {
                CustomerRecord::from_json(&value)?
            }
        }
        None => CustomerRecord::sample(),
    };

    let prediction = service.predict(&record)?;
    let response = prediction.to_response();
    let body = serde_json::to_string(&response)
        .map_err(|e| ChurnError::SerializationError(e.to_string()))?;
    println!("{body}");

    if let Some(path) = &args.audit_log {
        AuditLog::new(path).append(&AuditEntry::new(family, prediction, record))?;
        info!("Prediction appended to audit log {path:?}");
    }
    Ok(())
}

fn evaluate_command(args: EvaluateArgs) -> Result<()> {
    let family = ModelFamily::from(args.family);
    let service = InferenceService::load(&args.artifact_dir, family)?;
    let pair = service.current();

    info!("Loading test data from: {:?}", args.data_dir);
    let (_, test) = preprocess::load_split(&args.data_dir)?;
    let report = trainer::evaluate(&pair, &test)?;

    println!("=== Model Evaluation ===");
    pair.print_summary();
    println!("\nTest Results ({} rows):", test.len());
    println!("{report}");
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    let family = ModelFamily::from(args.family);
    info!("Loading artifacts from: {:?}", args.artifact_dir);
    let service = InferenceService::load(&args.artifact_dir, family)?;
    service.current().print_summary();
    Ok(())
}

fn schema_command() -> Result<()> {
    println!("Feature schema v{} ({} fields)", schema::SCHEMA_VERSION, schema::FEATURE_COUNT);
    for (i, field) in schema::fields().iter().enumerate() {
        let domain = match field.domain {
            Domain::Categorical(labels) => labels
                .iter()
                .enumerate()
                .map(|(code, label)| format!("{code}={label}"))
                .collect::<Vec<_>>()
                .join(", "),
            _ => field.domain.describe(),
        };
        println!("{i:>2} {:<17} {domain}", field.name);
    }
    Ok(())
}
