use clap::{Parser, Subcommand};
use collage_fit::config::{self, CollageConfig, Overrides, Packaging};
use collage_fit::imaging::{OutputFormat, RustBackend};
use collage_fit::naming::NamingStyle;
use collage_fit::process::{self, MergeRequest, ProcessEvent, Settings, Upload};
use collage_fit::sink::{ArtifactSink, DirectorySink, ZipSink};
use collage_fit::{output, scan};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Archive name used when `packaging = "zip"` is set without `--zip`.
const DEFAULT_ARCHIVE: &str = "collages.zip";

/// Shared flags for commands that encode artifacts.
#[derive(clap::Args, Clone)]
struct EncodeArgs {
    /// Artifact format: jpeg, png or pdf
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Size budget in kilobytes for JPEG and PDF artifacts
    #[arg(long, conflicts_with = "no_budget")]
    budget_kb: Option<u64>,

    /// Encode once at the start quality, with no size ceiling
    #[arg(long)]
    no_budget: bool,

    /// Write all artifacts into one ZIP archive at this path
    #[arg(long)]
    zip: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "collage-fit")]
#[command(about = "Merge image pairs side by side and fit them under a size budget")]
#[command(long_about = "\
Merge image pairs side by side and fit them under a size budget

Folder mode pairs files by name. Files sharing a base name and ending in
_a and _b become one collage, a on the left and b on the right:

  input/
  ├── collage.toml      # Optional config (see gen-config)
  ├── beach_a.jpg       ┐ → beach_ab.jpg
  ├── beach_b.png       ┘
  ├── dunes_a.jpg       # No dunes_b: reported and skipped
  └── cover.jpg         # No _a/_b suffix: ignored

Upload mode takes files in the order given and merges them two at a time
into image_1_merged.jpg, image_2_merged.jpg, ...

JPEG and PDF artifacts are re-encoded at decreasing quality until they fit
the budget (100 KB by default). PNG is lossless and never reduced.

Run 'collage-fit gen-config' to generate a documented collage.toml.")]
#[command(version)]
struct Cli {
    /// Input folder (folder mode) and default config location
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Output folder for artifacts
    #[arg(long, default_value = "merged", global = true)]
    output: PathBuf,

    /// Config file to use instead of <source>/collage.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every encode attempt to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair images in the source folder by name, merge and fit each pair
    Merge {
        #[command(flatten)]
        encode: EncodeArgs,

        /// Artifact naming: ab (beach_ab.jpg) or merged (beach_merged.jpg)
        #[arg(long)]
        naming: Option<NamingStyle>,

        /// Write a JSON report of every pair to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Merge the given files two at a time, in order
    Upload {
        /// Images to merge; an even number is required
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Print a data-URI download link per artifact instead of writing files
        #[arg(long, conflicts_with = "zip")]
        data_uri: bool,
    },
    /// Show how the source folder pairs up, without merging
    Check,
    /// Print a stock collage.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Merge {
            encode,
            naming,
            report,
        } => {
            let config = load_config(&cli, encode, *naming)?;
            let pairing = scan::pair_folder(&cli.source)?;
            output::print_pairing_report(&pairing);
            println!();

            init_thread_pool(&config.processing);
            let settings = Settings {
                request: config.encode_request(),
                naming: config.output.naming,
            };
            let backend = RustBackend::new();
            let (tx, printer) = spawn_printer();

            let outcomes = match archive_path(&cli.output, encode, &config) {
                Some(path) => {
                    let sink = ZipSink::new();
                    let outcomes =
                        process::process_pairs(&backend, &pairing.pairs, &settings, &sink, Some(tx));
                    write_archive(&path, sink)?;
                    outcomes
                }
                None => {
                    let sink = DirectorySink::create(&cli.output)?;
                    process::process_pairs(&backend, &pairing.pairs, &settings, &sink, Some(tx))
                }
            };
            printer.join().map_err(|_| "progress printer panicked")?;

            let run_report = process::build_report(&settings.request, &pairing, &outcomes);
            println!();
            output::print_summary(&run_report);
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&run_report)?;
                std::fs::write(path, json)?;
            }
        }
        Command::Upload {
            files,
            encode,
            data_uri,
        } => {
            let config = load_config(&cli, encode, None)?;
            init_thread_pool(&config.processing);

            let uploads = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<std::io::Result<Vec<_>>>()?;
            let request = MergeRequest {
                uploads,
                encode: config.encode_request(),
            };

            let response = match process::merge_uploads(&RustBackend::new(), request) {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("warning: {e}");
                    return Ok(());
                }
            };

            if *data_uri {
                output::print_merge_response(&response, true);
                return Ok(());
            }

            match archive_path(&cli.output, encode, &config) {
                Some(path) => {
                    let sink = ZipSink::new();
                    response.store_all(&sink)?;
                    write_archive(&path, sink)?;
                }
                None => {
                    let sink = DirectorySink::create(&cli.output)?;
                    response.store_all(&sink)?;
                }
            }
            output::print_merge_response(&response, false);
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let pairing = scan::pair_folder(&cli.source)?;
            output::print_pairing_report(&pairing);
            println!("==> {} pairs ready", pairing.pairs.len());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Diagnostics go to stderr; stdout carries the formatted output.
fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve config layers: stock defaults ← collage.toml ← command-line flags.
fn load_config(
    cli: &Cli,
    encode: &EncodeArgs,
    naming: Option<NamingStyle>,
) -> Result<CollageConfig, config::ConfigError> {
    let overrides = Overrides {
        format: encode.format,
        naming,
        packaging: encode.zip.as_ref().map(|_| Packaging::Zip),
        max_kb: encode.budget_kb,
        budget_enabled: encode.no_budget.then_some(false),
    };
    config::load_layered(&cli.source, cli.config.as_deref(), &overrides)
}

/// Where the ZIP archive goes, or `None` for loose files.
fn archive_path(output: &Path, encode: &EncodeArgs, config: &CollageConfig) -> Option<PathBuf> {
    match (&encode.zip, config.output.packaging) {
        (Some(path), _) => Some(path.clone()),
        (None, Packaging::Zip) => Some(output.join(DEFAULT_ARCHIVE)),
        (None, Packaging::Files) => None,
    }
}

fn write_archive(path: &Path, sink: ZipSink) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = sink.finish()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("invalid archive path: {}", path.display()))?;
    let location = DirectorySink::create(dir)?.store(file_name, &bytes)?;
    println!("Archive: {location}");
    Ok(())
}

fn read_upload(path: &Path) -> std::io::Result<Upload> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Upload {
        name,
        bytes: std::fs::read(path)?,
    })
}

/// Print progress events on a dedicated thread while workers run.
fn spawn_printer() -> (Sender<ProcessEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
