//! Plate Reader - print the license plate found in an image as JSON
//!
//! stdout carries exactly one JSON line; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use plate_reader::config::{self, AppConfig};
use plate_reader::reader::intercept;
use plate_reader::vision::{ModelManager, ModelType};
use plate_reader::{OcrEngine, PlateReader, PlateSelector, ReaderError, SelectionResult};

/// Exit status when the invocation itself is unusable
const EXIT_USAGE: u8 = 1;

/// Plate Reader - license plate extraction from vehicle photos
#[derive(Parser, Debug)]
#[command(name = "plate-reader")]
#[command(about = "Extract a license plate number from an image and print it as JSON")]
struct Args {
    /// Image to read
    image: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the models directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Enable the GPU execution provider when available
    #[arg(long)]
    gpu: bool,

    /// Download OCR models and exit
    #[arg(long)]
    download_models: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    init_config: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit(result: &SelectionResult) {
    match result.to_json_line() {
        Ok(line) => println!("{}", line),
        Err(e) => {
            error!("Failed to encode result: {}", e);
            println!("{{\"success\": false, \"error\": \"Failed to encode result\"}}");
        }
    }
}

/// Failure result for arguments clap rejected, `None` for help output
fn rejection(err: &clap::Error) -> Option<SelectionResult> {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        _ => {
            let message = err.to_string();
            let first_line = message.lines().next().unwrap_or_default();
            let reason = first_line.trim_start_matches("error: ").trim();
            Some(SelectionResult::failure(format!("Invalid arguments: {}", reason)))
        }
    }
}

/// Apply command-line overrides on top of the file settings
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(dir) = &args.models_dir {
        config.ocr.models_dir = Some(dir.clone());
    }
    if args.gpu {
        config.ocr.use_gpu = true;
    }
}

fn load_config(args: &Args) -> Result<AppConfig, ReaderError> {
    let mut config = config::load_or_default(args.config.as_deref()).map_err(ReaderError::Config)?;
    apply_overrides(&mut config, args);
    Ok(config)
}

fn failure(err: ReaderError) -> (SelectionResult, u8) {
    error!("{}", err);
    (SelectionResult::failure(err.to_string()), EXIT_USAGE)
}

/// Read the plate from the image named by `args`
///
/// Unusable invocations (no image, bad config, bad pattern) exit 1. Faults
/// while running OCR still exit 0; the JSON line carries the error.
fn run(args: &Args) -> (SelectionResult, u8) {
    let Some(image) = args.image.as_deref() else {
        return failure(ReaderError::NoImagePath);
    };

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => return failure(e),
    };

    let selector = match PlateSelector::new(config.plate.clone()) {
        Ok(selector) => selector,
        Err(e) => return failure(e),
    };

    let result = match intercept(|| OcrEngine::from_settings(&config.ocr)) {
        Ok(engine) => PlateReader::new(engine, selector).read(image),
        Err(e) => {
            warn!("Failed to initialize OCR engine: {}", e);
            SelectionResult::failure(e.to_string())
        }
    };

    (result, 0)
}

fn download_models(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let manager = match &config.ocr.models_dir {
        Some(dir) => ModelManager::with_dir(dir.clone())?,
        None => ModelManager::new()?,
    };

    manager.ensure_all_models()?;
    info!("Models ready in {}", manager.models_dir().display());

    for model in ModelType::ALL {
        let status = manager.status(model);
        eprintln!(
            "{:<22} {:>10} bytes  {}",
            model.display_name(),
            status.size.unwrap_or_default(),
            status.path.display()
        );
    }
    Ok(())
}

/// Save the effective configuration to `--config` or the default location
fn init_config(args: &Args) -> Result<PathBuf> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    let mut config = if path.is_file() {
        config::load_config(&path)?
    } else {
        AppConfig::default()
    };
    apply_overrides(&mut config, args);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    config::save_config(&config, &path)?;
    Ok(path)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match rejection(&e) {
            Some(result) => {
                emit(&result);
                return ExitCode::from(EXIT_USAGE);
            }
            None => e.exit(),
        },
    };
    init_logging(args.verbose);

    if args.download_models {
        return match download_models(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Model download failed: {:#}", e);
                ExitCode::from(EXIT_USAGE)
            }
        };
    }

    if args.init_config {
        return match init_config(&args) {
            Ok(path) => {
                eprintln!("Wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to write config: {:#}", e);
                ExitCode::from(EXIT_USAGE)
            }
        };
    }

    let (result, status) = run(&args);
    emit(&result);
    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_missing_image_exits_1() {
        let (result, status) = run(&parse(&["plate-reader"]));

        assert_eq!(status, 1);
        assert_eq!(
            result.to_json_line().unwrap(),
            r#"{"success": false, "error": "No image path provided"}"#
        );
    }

    #[test]
    fn test_extra_argument_is_rejected_as_json() {
        let err = Args::try_parse_from(["plate-reader", "car.jpg", "extra"]).unwrap_err();
        let result = rejection(&err).unwrap();

        let message = result.error().unwrap();
        assert!(message.starts_with("Invalid arguments: "));
        assert!(message.contains("'extra'"));
        assert!(!message.contains('\n'));
    }

    #[test]
    fn test_unknown_flag_is_rejected_as_json() {
        let err = Args::try_parse_from(["plate-reader", "--bogus", "car.jpg"]).unwrap_err();
        let result = rejection(&err).unwrap();
        assert!(result.error().unwrap().contains("--bogus"));
    }

    #[test]
    fn test_help_is_not_a_rejection() {
        let err = Args::try_parse_from(["plate-reader", "--help"]).unwrap_err();
        assert!(rejection(&err).is_none());
    }

    #[test]
    fn test_unreadable_config_exits_1() {
        let args = parse(&["plate-reader", "-c", "/nonexistent/plate.toml", "car.jpg"]);
        let (result, status) = run(&args);

        assert_eq!(status, 1);
        assert!(result.error().unwrap().starts_with("Configuration error: "));
    }

    #[test]
    fn test_invalid_pattern_exits_1() {
        let file = config_file("[plate]\npattern = \"[A-Z\"\n");
        let args = parse(&["plate-reader", "-c", file.path().to_str().unwrap(), "car.jpg"]);
        let (result, status) = run(&args);

        assert_eq!(status, 1);
        assert!(result.error().unwrap().starts_with("Invalid plate pattern '[A-Z'"));
    }

    #[test]
    fn test_provider_failure_exits_0_with_failure_json() {
        let models = TempDir::new().unwrap();
        let file = config_file("[ocr]\noffline = true\n");
        let args = parse(&[
            "plate-reader",
            "-c",
            file.path().to_str().unwrap(),
            "--models-dir",
            models.path().to_str().unwrap(),
            "car.jpg",
        ]);
        let (result, status) = run(&args);

        assert_eq!(status, 0);
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("Offline mode"));
        assert!(result.to_json_line().unwrap().starts_with(r#"{"success": false, "error": "#));
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let file = config_file("[ocr]\nuse_gpu = false\nintra_threads = 2\n");
        let args = parse(&[
            "plate-reader",
            "-c",
            file.path().to_str().unwrap(),
            "--models-dir",
            "/opt/models",
            "--gpu",
        ]);
        let config = load_config(&args).unwrap();

        assert!(config.ocr.use_gpu);
        assert_eq!(config.ocr.intra_threads, 2);
        assert_eq!(config.ocr.models_dir, Some(PathBuf::from("/opt/models")));
    }

    #[test]
    fn test_init_config_writes_effective_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("plate.toml");
        let args = parse(&[
            "plate-reader",
            "--init-config",
            "-c",
            path.to_str().unwrap(),
            "--models-dir",
            "/opt/models",
        ]);

        assert_eq!(init_config(&args).unwrap(), path);

        let written = config::load_config(&path).unwrap();
        assert_eq!(written.ocr.models_dir, Some(PathBuf::from("/opt/models")));
        assert_eq!(written.plate, AppConfig::default().plate);
    }
}
