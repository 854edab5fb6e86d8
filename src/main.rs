use clap::{Parser, Subcommand};
use image_fanout::config::{self, DEFAULT_CONFIG_FILE};
use image_fanout::handler::Handler;
use image_fanout::imaging::RustBackend;
use image_fanout::store::FileSystemStore;
use image_fanout::{naming, output, status};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image-fanout")]
#[command(version)]
#[command(about = "Fan a new image out into a fixed matrix of resolutions and formats")]
#[command(long_about = "\
Fan a new image out into a fixed matrix of resolutions and formats

Reads an object-created notification, decodes the source image once, resizes
it to every configured resolution (exactly, ignoring aspect ratio) and encodes
each rendering as JPEG and WebP. Artifacts are written to the output bucket as:

  {label}/{source name without extension}.{jpg|webp}

  1080p/photo.jpg   1080p/photo.webp
  720p/photo.jpg    720p/photo.webp
  480p/photo.jpg    480p/photo.webp

Buckets are directories under the store root. The output bucket comes from
`output_bucket` in the config file or the OUTPUT_BUCKET environment variable.

Run `image-fanout gen-config` for a documented config file.")]
struct Cli {
    /// Config file (optional; stock defaults apply when absent)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Store root directory (overrides `store.root`)
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one object-created notification
    Handle {
        /// Notification JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
        /// Print only the JSON invocation result
        #[arg(long)]
        json: bool,
    },
    /// Show which artifacts exist for a source object
    Status {
        /// Original object key
        key: String,
        /// Bucket holding the original
        #[arg(long)]
        input_bucket: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the artifact keys a source object maps to
    Keys {
        /// Original object key
        key: String,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Handle { event, json } => {
            let config = config::load_config(&cli.config, |k| std::env::var(k).ok())?;
            init_thread_pool(&config.processing);
            let store = FileSystemStore::new(store_root(&cli.store_root, &config));
            let notification = read_event(&event)?;
            let handler = Handler::new(config, RustBackend::new(), store);

            let result = if json {
                handler.invoke(&notification, None)
            } else {
                let (tx, rx) = std::sync::mpsc::channel();
                let printer = std::thread::spawn(move || {
                    for event in rx {
                        for line in output::format_process_event(&event) {
                            println!("{}", line);
                        }
                    }
                });
                let result = handler.invoke(&notification, Some(tx));
                printer
                    .join()
                    .map_err(|_| "progress printer thread panicked")?;
                output::print_invocation(&result);
                result
            };

            if json {
                println!("{}", serde_json::to_string(&result)?);
            }
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Command::Status {
            key,
            input_bucket,
            json,
        } => {
            let config = config::load_config(&cli.config, |k| std::env::var(k).ok())?;
            let output_bucket = config.require_output_bucket()?;
            let profiles = config.profiles()?;
            let store = FileSystemStore::new(store_root(&cli.store_root, &config));

            let report =
                status::check_status(&store, &profiles, &input_bucket, output_bucket, &key)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_status_report(&report);
            }
        }
        Command::Keys { key } => {
            let config = config::load_config(&cli.config, |k| std::env::var(k).ok())?;
            let profiles = config.profiles()?;
            let keys = naming::artifact_keys(naming::source_name(&key), &profiles);
            output::print_keys(&keys);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn store_root(cli_root: &Option<PathBuf>, config: &config::HandlerConfig) -> PathBuf {
    cli_root.clone().unwrap_or_else(|| config.store.root.clone())
}

fn read_event(source: &str) -> std::io::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source)
    }
}
