#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ispc_reduce::artifact::{ModelArtifact, estimates_to_tsv};
use ispc_reduce::audit::AuditReport;
use ispc_reduce::audit::correlation::CorrelationMethod;
use ispc_reduce::config::{TrainerConfig, parse_alpha_list, parse_tag_list};
use ispc_reduce::records::{
    DEPTH_COLUMN, FeatureSet, YEAR_COLUMN, depth_for_tag, load_records, load_table,
};
use ispc_reduce::trainer::Trainer;

#[derive(Clone, Copy, ValueEnum)]
pub enum MethodCli {
    Pearson,
    Spearman,
}

impl From<MethodCli> for CorrelationMethod {
    fn from(method: MethodCli) -> Self {
        match method {
            MethodCli::Pearson => CorrelationMethod::Pearson,
            MethodCli::Spearman => CorrelationMethod::Spearman,
        }
    }
}

#[derive(Args)]
pub struct TrainArgs {
    /// Directory holding one ispc_records_<tag>.csv per partition tag
    #[arg(long, default_value = "data/ispc")]
    pub data_dir: PathBuf,

    /// Optional TOML file with alphas, folds, seed and tags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated partition tags (overrides the config file)
    #[arg(long)]
    pub tags: Option<String>,

    /// Comma-separated regularization grid (overrides the config file)
    #[arg(long)]
    pub alphas: Option<String>,

    /// Number of cross-validation folds (overrides the config file)
    #[arg(long = "k", alias = "folds", value_name = "K")]
    pub folds: Option<usize>,

    /// Seed of the fold shuffle (overrides the config file)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output JSON artifact
    #[arg(long, default_value = "data/ispc/ispc_reduced_ml_models.json")]
    pub out: PathBuf,

    /// Optional UMD JavaScript bundle of the same artifact
    #[arg(long)]
    pub out_js: Option<PathBuf>,
}

#[derive(Args)]
pub struct InferArgs {
    /// Record table with the input columns (CSV, or TSV by extension)
    pub records: PathBuf,

    /// Trained model artifact (.json)
    #[arg(long)]
    pub model: PathBuf,

    /// Partition tag whose models are applied
    #[arg(long)]
    pub tag: String,

    /// Output TSV with one estimate column per target
    #[arg(long, default_value = "estimates.tsv")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Record table to audit: a standardized file or a spreadsheet export
    pub records: PathBuf,

    /// Output directory for the audit files
    #[arg(long, default_value = "data/ispc")]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = MethodCli::Pearson)]
    pub method: MethodCli,

    /// Minimum |r| for two variables to count as redundant
    #[arg(long, default_value = "0.85")]
    pub threshold: f64,

    /// Year written into blank or missing `ano` cells
    #[arg(long)]
    pub ano: Option<u32>,

    /// Depth band (e.g. 0-10) written into blank or missing `profundidade_cm`
    /// cells and shown in the report title
    #[arg(long, alias = "depth")]
    pub profundidade: Option<String>,

    /// Sheet name the export came from; dados_010 and dados_1020 imply a depth
    /// band (defaults to the file name without its ispc_records_ prefix)
    #[arg(long)]
    pub sheet: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "ispc-reduce",
    about = "Ridge estimators for the reduced ISPC variable set",
    long_about = "Trains per-target ridge models that estimate the expensive ISPC soil and crop \
                 measurements from the inexpensive ones, applies them to new records, and \
                 audits variable redundancy."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train ridge models for every partition tag
    #[command(about = "Train reduced-mode models (outputs: models JSON, optional JS bundle)")]
    Train(TrainArgs),

    /// Apply a trained artifact to new records
    #[command(about = "Estimate targets for new records (outputs: estimates.tsv)")]
    Infer(InferArgs),

    /// Correlation audit of the fifteen variables
    #[command(
        about = "Standardize and audit records (outputs: records, minmax, correlations, pairs, report)"
    )]
    Audit(AuditArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Infer(args)) => infer(args),
        Some(Commands::Audit(args)) => audit(args),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// File defaults first, then any flag given on the command line.
fn resolve_config(args: &TrainArgs) -> Result<TrainerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(tags) = &args.tags {
        config.tags = parse_tag_list(tags);
    }
    if let Some(alphas) = &args.alphas {
        config.alphas = parse_alpha_list(alphas)?;
    }
    if let Some(folds) = args.folds {
        config.folds = folds;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn records_path(data_dir: &Path, tag: &str) -> PathBuf {
    data_dir.join(format!("ispc_records_{tag}.csv"))
}

fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let trainer = Trainer::new(FeatureSet::ispc(), config)?;

    let mut tables = BTreeMap::new();
    for tag in &trainer.config().tags {
        let path = records_path(&args.data_dir, tag);
        if !path.exists() {
            return Err(format!("Record table not found: {}", path.display()).into());
        }
        let table = load_records(&path)?;
        trainer.check_columns(tag, &table)?;
        tables.insert(tag.clone(), table);
    }

    let artifact = trainer.train_artifact(&tables)?;
    for (tag, part) in &artifact.by_tag {
        let trained = part.models.values().filter(|m| m.is_trained()).count();
        log::info!("Partition '{tag}': {trained}/{} targets trained", part.models.len());
    }

    artifact.save_json(&args.out)?;
    if let Some(js_path) = &args.out_js {
        artifact.save_umd_js(js_path)?;
    }

    let summary = serde_json::json!({
        "ok": true,
        "out": args.out.display().to_string(),
        "outJs": args.out_js.as_ref().map(|p| p.display().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = ModelArtifact::load_json(&args.model)?;
    let part = artifact.partition(&args.tag)?;
    let table = load_table(&args.records)?;

    let missing = part.missing_inputs(&table)?;
    if !missing.is_empty() {
        log::warn!("Input lacks {}; affected rows get NA", missing.join(", "));
    }

    let rows = part.estimate_table(&table);
    let estimated = rows.iter().filter(|r| !r.is_empty()).count();
    fs::write(&args.out, estimates_to_tsv(&part.targets, &rows)?)?;
    println!(
        "Estimates for {estimated} of {} rows saved to: {}",
        rows.len(),
        args.out.display()
    );
    Ok(())
}

fn audit(args: AuditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = load_table(&args.records)?;

    let stem = args
        .records
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("records");
    let suffix = stem.strip_prefix("ispc_records_").unwrap_or(stem);
    let sheet = args.sheet.as_deref().unwrap_or(suffix);
    let depth = args
        .profundidade
        .or_else(|| depth_for_tag(sheet).map(str::to_string));

    let year = args.ano.map(|y| y.to_string()).unwrap_or_default();
    table.fill_meta(YEAR_COLUMN, &year)?;
    table.fill_meta(DEPTH_COLUMN, depth.as_deref().unwrap_or(""))?;

    let report = AuditReport::run(&table, args.method.into(), args.threshold, depth)?;
    let records = records_path(&args.out, suffix);
    table.save_csv(&records)?;
    let outputs = report.write_to(&args.out, suffix)?;

    for path in [
        &records,
        &outputs.ranges,
        &outputs.correlations,
        &outputs.pairs,
        &outputs.report,
    ] {
        println!("OK: {}", path.display());
    }
    Ok(())
}
