use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use image::ImageReader;
use tracing::{Level, info, warn};

use planmark::PlanmarkConfig;
use planmark::core::db::{BatchRecord, BatchRepository, LedgerDb, OcrRepository, PartitionRepository};
use planmark::corpus::{
    AggregationContext, CancelToken, CorpusWriter, Partitioner, ReadinessGate, find_markup_files, statistics,
};
use planmark::detection::contours::ContourProposalDetector;
use planmark::detection::geometry::GeometryAnalyzer;
use planmark::detection::ocr::{OcrsPageReader, read_page};
use planmark::detection::{
    HybridDetector, ObjectDetector, PrecomputedDetections, candidate_file_name, candidates_to_record,
};
use planmark::models::{ObjectKind, PageKey, Partition};

#[derive(Parser)]
#[command(name = "planmark")]
#[command(about = "Turn floor-plan annotations into a wall-detection training corpus")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file; flags below override its values
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate raw annotation files, split them and write the corpus
    Build(BuildArgs),
    /// Run hybrid wall detection on one page and emit candidate markup
    Detect(DetectArgs),
    /// Print line statistics of a page image
    Geometry {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Read page text and extract measurements and keywords
    Ocr(OcrArgs),
    /// Print corpus statistics without writing anything
    Stats(SourceArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Directory searched recursively for raw annotation JSON files
    #[arg(long, value_name = "DIR")]
    markup: PathBuf,

    /// Root of the page images, one folder per project
    #[arg(long, value_name = "DIR")]
    images: PathBuf,

    /// Ingest identical files again instead of skipping them
    #[arg(long)]
    no_dedup: bool,

    /// Ledger database for persisted partitions, batch history and OCR reports
    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output corpus directory (must be empty)
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    #[arg(long)]
    val_fraction: Option<f64>,

    /// Seed for a reproducible validation sample
    #[arg(long)]
    seed: Option<u64>,

    /// Clear a non-empty output directory
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct DetectArgs {
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    #[arg(long)]
    project: String,

    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Replay detector output from a JSON file instead of contour proposals
    #[arg(long, value_name = "FILE")]
    detections: Option<PathBuf>,

    /// Directory receiving the candidate markup file
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct OcrArgs {
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Store the report for this page in the ledger
    #[arg(long, requires_all = ["page", "ledger"])]
    project: Option<String>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PlanmarkConfig::load(path)?,
        None => PlanmarkConfig::default(),
    };

    match cli.command {
        Command::Build(args) => build(config, args).await,
        Command::Detect(args) => detect(config, args),
        Command::Geometry { image } => {
            let stats = GeometryAnalyzer::with_params(config.lines).analyze_path(&image);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Ocr(args) => ocr(args).await,
        Command::Stats(args) => stats(config, args).await,
    }
}

fn aggregate(config: &PlanmarkConfig, source: &SourceArgs) -> anyhow::Result<planmark::FinalizedBatch> {
    let files = find_markup_files(&source.markup)
        .with_context(|| format!("Failed to list markup files in {:?}", source.markup))?;
    info!("Found {} raw annotation files", files.len());

    let mut config = config.clone();
    if source.no_dedup {
        config.track_sources = false;
    }
    let context = AggregationContext::new(&source.images, config);
    context.ingest_all(&files, &CancelToken::new());
    let batch = context.finalize();

    let summary = batch.summary();
    for error in &summary.errors {
        warn!("{}", error);
    }
    println!(
        "Ingested {}/{} files ({} duplicates, {} errors, {} objects skipped, {} boxes)",
        summary.files_ingested,
        summary.files_seen,
        summary.duplicates,
        summary.error_count(),
        summary.objects_skipped,
        summary.boxes_added
    );
    Ok(batch)
}

async fn build(mut config: PlanmarkConfig, args: BuildArgs) -> anyhow::Result<()> {
    if let Some(val_fraction) = args.val_fraction {
        config.val_fraction = val_fraction;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    let mut batch = aggregate(&config, &args.source)?;
    let dropped = batch.retain_trainable();
    if dropped > 0 {
        info!("Dropped {} pages without boxes", dropped);
    }
    if batch.is_empty() {
        anyhow::bail!("No trainable pages found under {}", args.source.markup.display());
    }

    let partitioner = Partitioner::from_config(&config);
    let ledger = match &args.source.ledger {
        Some(path) => Some(LedgerDb::open(path).await?),
        None => None,
    };
    let outcome = match &ledger {
        Some(ledger) => {
            let persisted = ledger.load_partitions().await?;
            let outcome = partitioner.restore_or_partition(&mut batch, &persisted);
            if !outcome.restored {
                let assignments: Vec<(PageKey, Partition)> = batch
                    .examples()
                    .iter()
                    .filter_map(|e| e.partition.map(|p| (e.key.clone(), p)))
                    .collect();
                ledger.save_partitions(&assignments).await?;
            }
            outcome
        }
        None => partitioner.partition_batch(&mut batch),
    };

    let writer = CorpusWriter::create(&args.out, &config.classes, args.force)?;
    let report = writer.write_all(batch.examples())?;
    for (key, error) in &report.failed {
        warn!("{}: {}", key, error);
    }

    if let Some(ledger) = &ledger {
        ledger.record_batch(&BatchRecord::new(&batch, outcome)).await?;
        ledger.close().await?;
    }

    println!(
        "Wrote {} pages ({} train / {} val, {} boxes) to {}",
        report.written,
        outcome.train,
        outcome.val,
        report.boxes,
        args.out.display()
    );
    print_readiness(&config, &statistics(batch.examples(), &config.classes));
    Ok(())
}

fn print_readiness(config: &PlanmarkConfig, stats: &planmark::corpus::CorpusStatistics) {
    let Some(primary) = config.classes.first() else {
        return;
    };
    let readiness = stats.readiness(&ReadinessGate::new(primary.clone(), config.min_training_boxes));
    println!("Readiness for '{}': {:?}", primary, readiness);
}

fn detect(config: PlanmarkConfig, args: DetectArgs) -> anyhow::Result<()> {
    let image = ImageReader::open(&args.image)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    let detector: Box<dyn ObjectDetector> = match &args.detections {
        Some(path) => Box::new(PrecomputedDetections::load(path)?),
        None => Box::new(ContourProposalDetector::default()),
    };
    let hybrid = HybridDetector::from_config(detector, &config);
    let detection = hybrid.detect_page(&image)?;

    println!("\n=== Wall Detection Results ===");
    println!(
        "Raw detections: {}, admitted: {}, lines: {} ({} horizontal, {} vertical)",
        detection.raw_count,
        detection.candidates.len(),
        detection.geometry.total_lines,
        detection.geometry.horizontal_lines,
        detection.geometry.vertical_lines
    );
    for candidate in &detection.candidates {
        println!(
            "  ({:.0}, {:.0})-({:.0}, {:.0}) confidence: {:.2} aspect: {:.2}",
            candidate.bbox.x1,
            candidate.bbox.y1,
            candidate.bbox.x2,
            candidate.bbox.y2,
            candidate.confidence,
            candidate.aspect_ratio
        );
    }

    if let Some(out) = &args.out {
        let key = PageKey::new(args.project, args.page);
        let kind = config
            .classes
            .first()
            .map(|name| ObjectKind::parse(name))
            .unwrap_or(ObjectKind::Wall);
        let record = candidates_to_record(&key, &kind, &detection);
        std::fs::create_dir_all(out).with_context(|| format!("Failed to create {:?}", out))?;
        let path = out.join(candidate_file_name(&key));
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)
            .with_context(|| format!("Failed to write candidates {:?}", path))?;
        println!("Candidate markup written to {}", path.display());
    }
    Ok(())
}

async fn ocr(args: OcrArgs) -> anyhow::Result<()> {
    let reader = match &args.models {
        Some(dir) => OcrsPageReader::from_models(
            &dir.join("text-detection.rten"),
            &dir.join("text-recognition.rten"),
        )?,
        None => OcrsPageReader::from_cache_dir()?,
    };
    let image = image::open(&args.image).with_context(|| format!("Failed to open image {:?}", args.image))?;
    let report = read_page(&reader, &image)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let (Some(project), Some(page), Some(ledger)) = (args.project, args.page, &args.ledger) {
        let ledger = LedgerDb::open(ledger).await?;
        ledger.save_page_report(&PageKey::new(project, page), &report).await?;
        ledger.close().await?;
    }
    Ok(())
}

async fn stats(config: PlanmarkConfig, args: SourceArgs) -> anyhow::Result<()> {
    let batch = aggregate(&config, &args)?;
    let mut stats = statistics(batch.examples(), &config.classes);

    if let Some(path) = &args.ledger {
        let ledger = open_existing_ledger(path).await?;
        let persisted = ledger.load_partitions().await?;
        let mut examples = batch.examples().to_vec();
        for example in &mut examples {
            example.partition = persisted.get(&example.key).copied();
        }
        let reports: Vec<_> = ledger.page_reports().await?.into_iter().map(|(_, r)| r).collect();
        stats = statistics(&examples, &config.classes).with_ocr(&reports);
        ledger.close().await?;
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    print_readiness(&config, &stats);
    Ok(())
}

async fn open_existing_ledger(path: &Path) -> anyhow::Result<LedgerDb> {
    if !path.is_file() {
        anyhow::bail!("Ledger not found: {}", path.display());
    }
    LedgerDb::open(path).await
}
