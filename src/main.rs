use clap::{Parser, Subcommand};
use filter_playground::config::{self, PlaygroundConfig};
use filter_playground::controller::DefaultImage;
use filter_playground::imaging::NativeLoader;
use filter_playground::session::{Playground, SessionError};
use filter_playground::types::Operation;
use filter_playground::{codec, output};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "filter-playground")]
#[command(about = "Run fixed image filters through an image module on a relay thread")]
#[command(long_about = "\
Run fixed image filters through an image module on a relay thread

The image is decoded to RGBA, handed to a background relay that copies it
into the module's own memory, calls the filter entry point, and copies the
result back. Results are written as PNG.

Filters:
  grayscale   Luma with fixed weights, RGBA out
  blur        Separable gaussian, radius from [filters] blur_radius
  sobel       Edge magnitude, single channel expanded to RGBA
  binary      Otsu threshold, optional second level

Run 'filter-playground gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load an image and apply every filter, writing <out>/<operation>.png
    Run {
        /// Image to load instead of the configured default
        #[arg(long)]
        image: Option<PathBuf>,
        /// Output directory
        #[arg(long, default_value = "playground-out")]
        out: PathBuf,
    },
    /// Apply one filter to one file
    Apply {
        /// grayscale, blur, sobel or binary
        operation: Operation,
        input: PathBuf,
        output: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { image, out } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let mut session = start_session(&config, &cli.config)?;
            if let Some(path) = &image {
                session.load_image(&std::fs::read(path)?)?;
            }
            let source = match image {
                Some(path) => DefaultImage::Path(path),
                None => config.default_image(&cli.config),
            };
            output::print_source(&source, session.controller().image());

            std::fs::create_dir_all(&out)?;
            let mut failures = 0;
            for op in Operation::ALL {
                match session.apply(op) {
                    Ok(outcome) => {
                        let path = out.join(format!("{}.png", op.name()));
                        codec::write_png(&outcome.image, &path)?;
                        output::print_outcome(&outcome, Some(&path));
                    }
                    Err(SessionError::Filter(message)) => {
                        output::print_failure(op.display_name(), &message);
                        failures += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            session.shutdown();
            if failures > 0 {
                return Err(format!("{failures} filter(s) failed").into());
            }
        }
        Command::Apply {
            operation,
            input,
            output: destination,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let mut session = start_session(&config, &cli.config)?;
            session.load_image(&std::fs::read(&input)?)?;
            let outcome = session.apply(operation)?;
            codec::write_png(&outcome.image, &destination)?;
            output::print_outcome(&outcome, Some(&destination));
            session.shutdown();
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Spawn the relay with a native module and wait for it to load.
fn start_session(config: &PlaygroundConfig, config_dir: &Path) -> Result<Playground, SessionError> {
    let loader = NativeLoader::new(config.memory_limit_bytes());
    let mut session = Playground::start(
        Box::new(loader),
        config.filter_params(),
        config.default_image(config_dir),
    )?;
    session.wait_ready()?;
    Ok(session)
}

/// Initialize the rayon thread pool used by the filter kernels.
///
/// Capped at the number of CPU cores; config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
