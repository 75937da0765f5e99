//! Command-line front end for building and checking hash indexes.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hashcheck::{
    primitives::pager::{StrategyKind, DEFAULT_BULK_READ_RING},
    storage::hash::{describe, HashIndex, HashIndexOptions, HashMeta, HeapTid, HASH_METAPAGE},
    types::PageId,
    verify::{CheckReport, CheckerRegistry},
    CheckOptions,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::{CliConfig, Profile};
use ui::{format_duration, Status, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "hashcheck",
    version,
    about = "Build and structurally check paged hash indexes",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "HASHCHECK_CONFIG",
        value_name = "FILE",
        help = "CLI config file with named profiles"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Profile from the config file to apply")]
    profile: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto)]
    theme: Theme,

    #[arg(long, short, global = true, help = "Plain output without spinners")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        help = "Page size (bytes) when creating an index, or when the metapage is unreadable"
    )]
    page_size: Option<u32>,

    #[arg(long, global = true, help = "Buffer pool size (pages)")]
    cache_pages: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty hash index file.
    Create {
        #[arg(value_name = "INDEX")]
        index_path: PathBuf,
        #[arg(long, default_value_t = 2, help = "Initial buckets, rounded up to a power of two")]
        buckets: u32,
        #[arg(long, help = "Entries per bucket before a split")]
        fill_factor: Option<u16>,
    },
    /// Insert pseudo-random keys into an existing index.
    Load {
        #[arg(value_name = "INDEX")]
        index_path: PathBuf,
        #[arg(long, help = "Number of entries to insert")]
        rows: u64,
        #[arg(long, default_value_t = 0x5eed, help = "Seed for key generation")]
        seed: u64,
    },
    /// Check the structure of an index.
    Check(CheckCmd),
    /// Decode one page of an index.
    Inspect {
        #[arg(value_name = "INDEX")]
        index_path: PathBuf,
        #[arg(long, default_value_t = 0)]
        page: u64,
    },
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_name = "INDEX")]
    index_path: PathBuf,

    #[arg(long, value_enum, help = "Buffer placement for the scan")]
    strategy: Option<StrategyArg>,

    #[arg(long, help = "Ring size (pages) for bulk-read scans")]
    ring_pages: Option<usize>,

    #[arg(
        long,
        help = "Also require each chain page and entry to belong to the bucket holding it"
    )]
    verify_ownership: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum StrategyArg {
    Normal,
    BulkRead,
}

impl From<StrategyArg> for StrategyKind {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Normal => StrategyKind::Normal,
            StrategyArg::BulkRead => StrategyKind::BulkRead,
        }
    }
}

#[derive(Serialize)]
struct CreateReport {
    index: String,
    path: PathBuf,
    page_size: usize,
    buckets: u64,
    pages: u64,
}

#[derive(Serialize)]
struct LoadReport {
    index: String,
    rows: u64,
    ntuples: u64,
    max_bucket: u32,
    pages: u64,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct PageReport {
    page: PageId,
    lower: u16,
    upper: u16,
    special: u16,
    crc32: u32,
    kind: String,
    bucket: u32,
    prev: Option<PageId>,
    next: Option<PageId>,
    items: u16,
    head_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaReport>,
}

#[derive(Serialize)]
struct MetaReport {
    magic: u32,
    version: u32,
    ntuples: u64,
    ffactor: u16,
    max_bucket: u32,
    high_mask: u32,
    low_mask: u32,
    ovfl_point: u32,
    spares: Vec<u32>,
}

impl From<&HashMeta> for MetaReport {
    fn from(meta: &HashMeta) -> Self {
        let used = meta.ovfl_point as usize + 1;
        Self {
            magic: meta.magic,
            version: meta.version,
            ntuples: meta.ntuples,
            ffactor: meta.ffactor,
            max_bucket: meta.max_bucket,
            high_mask: meta.high_mask,
            low_mask: meta.low_mask,
            ovfl_point: meta.ovfl_point,
            spares: meta.spares.iter().take(used).copied().collect(),
        }
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HASHCHECK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let profile = config.select(cli.profile.as_deref())?;
    if let Some(profile) = profile {
        tracing::debug!(
            profile = %profile.name,
            config = ?config.path(),
            "cli.profile"
        );
    }
    let ui = Ui::new(cli.theme, cli.quiet || cli.format == OutputFormat::Json);
    let index_opts = build_index_options(&cli.open, profile);

    match &cli.command {
        Command::Create {
            index_path,
            buckets,
            fill_factor,
        } => {
            let mut opts = index_opts;
            opts.initial_buckets = *buckets;
            if let Some(fill_factor) = fill_factor {
                opts.fill_factor = *fill_factor;
            }
            let index = HashIndex::create(index_path, opts)?;
            let meta = index.meta()?;
            let report = CreateReport {
                index: index.name().to_string(),
                path: index_path.clone(),
                page_size: index.pool().page_size(),
                buckets: meta.bucket_count(),
                pages: index.pool().page_count(),
            };
            emit(cli.format, &report, || {
                ui.status(Status::Pass, &format!(
                    "created {} with {} buckets ({} byte pages)",
                    report.path.display(),
                    report.buckets,
                    report.page_size
                ))
            })?;
        }
        Command::Load {
            index_path,
            rows,
            seed,
        } => {
            let index = open_index(index_path, &index_opts)?;
            let started = Instant::now();
            let step = ui.step(format!("loading {rows} entries"));
            let mut rng = ChaCha8Rng::seed_from_u64(*seed);
            for row in 0..*rows {
                let key: u64 = rng.gen();
                let tid = HeapTid {
                    page: (row / 256) as u32,
                    offset: (row % 256) as u16 + 1,
                };
                index.insert_key(&key.to_be_bytes(), tid)?;
            }
            index.flush()?;
            step.done();
            let meta = index.meta()?;
            let report = LoadReport {
                index: index.name().to_string(),
                rows: *rows,
                ntuples: meta.ntuples,
                max_bucket: meta.max_bucket,
                pages: index.pool().page_count(),
                elapsed_ms: started.elapsed().as_secs_f64() * 1_000.0,
            };
            emit(cli.format, &report, || {
                ui.status(Status::Pass, &format!(
                    "loaded {} entries into {} in {}",
                    report.rows,
                    report.index,
                    format_duration(started.elapsed())
                ));
                ui.rows(
                    "Index",
                    [
                        ("entries", report.ntuples.to_string()),
                        ("buckets", (report.max_bucket as u64 + 1).to_string()),
                        ("pages", report.pages.to_string()),
                    ],
                );
            })?;
        }
        Command::Check(cmd) => {
            let index = open_index(&cmd.index_path, &index_opts)?;
            let relation = index.relation();
            let options = build_check_options(cmd, profile);
            let step = ui.step(format!("checking {}", relation.name()));
            let outcome = CheckerRegistry::with_defaults().check_index(&relation, None, &options);
            let elapsed = step.done();
            let report = CheckReport::new(&relation, &outcome);
            emit(cli.format, &report, || print_check_text(&ui, &report, elapsed))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Inspect { index_path, page } => {
            let index = open_index(index_path, &index_opts)?;
            let report = inspect_page(&index, PageId(*page))?;
            emit(cli.format, &report, || print_page_text(&ui, &report))?;
        }
    }

    Ok(())
}

fn build_index_options(args: &OpenArgs, profile: Option<&Profile>) -> HashIndexOptions {
    let mut opts = HashIndexOptions::default();
    if let Some(page_size) = args.page_size.or(profile.and_then(|p| p.page_size)) {
        opts.page_size = page_size;
    }
    if let Some(cache_pages) = args.cache_pages.or(profile.and_then(|p| p.cache_pages)) {
        opts.cache_pages = cache_pages;
    }
    opts
}

fn build_check_options(cmd: &CheckCmd, profile: Option<&Profile>) -> CheckOptions {
    let strategy = cmd
        .strategy
        .or(profile.and_then(|p| p.strategy))
        .map(StrategyKind::from)
        .unwrap_or_default();
    let ring = cmd
        .ring_pages
        .or(profile.and_then(|p| p.ring_pages))
        .unwrap_or(DEFAULT_BULK_READ_RING);
    CheckOptions {
        strategy,
        bulk_read_ring_pages: ring,
        verify_bucket_ownership: cmd.verify_ownership
            || profile
                .and_then(|p| p.verify_bucket_ownership)
                .unwrap_or(false),
    }
}

fn open_index(path: &Path, opts: &HashIndexOptions) -> Result<HashIndex, Box<dyn Error>> {
    HashIndex::open(path, opts.clone())
        .map_err(|err| format!("failed to open {}: {err}", path.display()).into())
}

fn inspect_page(index: &HashIndex, id: PageId) -> Result<PageReport, Box<dyn Error>> {
    let page = index.pool().read_page(id)?;
    let data = page.data();
    let (header, opaque) = describe(data)?;
    let meta = if id == HASH_METAPAGE {
        Some(MetaReport::from(&HashMeta::decode(data)?))
    } else {
        None
    };
    Ok(PageReport {
        page: id,
        lower: header.lower,
        upper: header.upper,
        special: header.special,
        crc32: header.crc32,
        kind: opaque.kind().to_string(),
        bucket: opaque.bucket,
        prev: opaque.prev,
        next: opaque.next,
        items: if id == HASH_METAPAGE { 0 } else { header.max_offset() },
        head_hex: hex::encode(&data[..32.min(data.len())]),
        meta,
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_check_text(ui: &Ui, report: &CheckReport, elapsed: std::time::Duration) {
    match (&report.stats, &report.error) {
        (Some(stats), _) => {
            ui.status(Status::Pass, &format!(
                "index {} is consistent ({})",
                report.index,
                format_duration(elapsed)
            ));
            ui.rows(
                "Structure",
                [
                    ("max_bucket", stats.max_bucket as u64),
                    ("buckets", stats.buckets_checked),
                    ("primary_pages", stats.primary_pages),
                    ("overflow_pages", stats.overflow_pages),
                    ("entries", stats.entries_scanned),
                ],
            );
        }
        (None, error) => {
            ui.status(Status::Fail, error.as_deref().unwrap_or("check failed"));
        }
    }
    ui.rows(
        "Buffer pool",
        [
            ("hits", report.pool.hits),
            ("misses", report.pool.misses),
            ("evictions", report.pool.evictions),
            ("ring_reuses", report.pool.ring_reuses),
        ],
    );
}

fn print_page_text(ui: &Ui, report: &PageReport) {
    ui.rows(
        &format!("Page {}", report.page),
        [
            ("kind", report.kind.clone()),
            ("bucket", report.bucket.to_string()),
            ("prev", link(report.prev)),
            ("next", link(report.next)),
            ("items", report.items.to_string()),
            (
                "bounds",
                format!(
                    "lower={} upper={} special={}",
                    report.lower, report.upper, report.special
                ),
            ),
            ("crc32", format!("{:#010x}", report.crc32)),
            ("head", report.head_hex.clone()),
        ],
    );
    if let Some(meta) = &report.meta {
        ui.rows(
            "Metapage",
            [
                ("magic", format!("{:#010x}", meta.magic)),
                ("version", meta.version.to_string()),
                ("ntuples", meta.ntuples.to_string()),
                ("ffactor", meta.ffactor.to_string()),
                ("max_bucket", meta.max_bucket.to_string()),
                ("high_mask", format!("{:#x}", meta.high_mask)),
                ("low_mask", format!("{:#x}", meta.low_mask)),
                ("ovfl_point", meta.ovfl_point.to_string()),
                ("spares", format!("{:?}", meta.spares)),
            ],
        );
    } else {
        ui.status(Status::Note, "use --page 0 to decode the metapage");
    }
}

fn link(page: Option<PageId>) -> String {
    page.map_or_else(|| "-".to_string(), |p| p.to_string())
}
