//! Clinseq command line.
//!
//! - `clinseq predict` classifies one case and prints the serialized record
//! - `clinseq serve` runs the HTTP API until Ctrl-C

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use clinseq::api::start_server;
use clinseq::config;
use clinseq::pipeline::{build_record, Footer, PredictionPipeline, SequenceClassifier};

#[derive(Parser)]
#[command(name = "clinseq", version, about = "Longitudinal clinical case classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one case and print the serialized record
    ///
    /// # Examples
    ///
    /// ```bash
    /// clinseq predict --case "fiebre" "disnea" --dates 10Jan2024 null
    /// clinseq predict --case-file case.txt --dates-file dates.txt
    /// ```
    Predict(PredictArgs),

    /// Serve /process_text, /process_bulk and /health
    Serve(ServeArgs),
}

#[derive(Args)]
struct PredictArgs {
    /// Visit texts to process
    #[arg(long, num_args = 1.., required_unless_present = "case_file", conflicts_with = "case_file")]
    case: Vec<String>,

    /// Visit dates in DDMonYYYY form ('4Jan2002'); `null` or empty for unknown
    #[arg(long, num_args = 1.., required_unless_present = "dates_file", conflicts_with = "dates_file")]
    dates: Vec<String>,

    /// Text file with one visit note per line
    #[arg(long)]
    case_file: Option<PathBuf>,

    /// Text file with one visit date per line
    #[arg(long)]
    dates_file: Option<PathBuf>,

    /// JSON file with record metadata (provider_id, person_id, note_id, ...)
    #[arg(long)]
    footer: Option<PathBuf>,

    /// Model bundle directory [default: $CLINSEQ_MODEL_DIR or ~/Clinseq/models/lstm-attn]
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address [default: $CLINSEQ_BIND or 127.0.0.1:5000]
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Model bundle directory [default: $CLINSEQ_MODEL_DIR or ~/Clinseq/models/lstm-attn]
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    clinseq::init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Predict(args) => predict(args),
        Command::Serve(args) => serve(args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_pipeline(model_dir: Option<PathBuf>) -> Result<PredictionPipeline, String> {
    let dir = model_dir.unwrap_or_else(config::default_model_dir);
    info!(model_dir = %dir.display(), "Loading model bundle");
    PredictionPipeline::load(&dir).map_err(|e| format!("Failed to load model from {}: {e}", dir.display()))
}

fn predict(args: PredictArgs) -> Result<(), String> {
    let case = match &args.case_file {
        Some(path) => read_lines(path)?,
        None => args.case,
    };
    let raw_dates = match &args.dates_file {
        Some(path) => read_lines(path)?,
        None => args.dates,
    };
    let dates: Vec<Option<String>> = raw_dates.into_iter().map(cli_date).collect();

    let footer = match &args.footer {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read footer {}: {e}", path.display()))?;
            serde_json::from_str::<Footer>(&raw)
                .map_err(|e| format!("Invalid footer {}: {e}", path.display()))?
        }
        None => Footer::default(),
    };

    let pipeline = load_pipeline(args.model_dir)?;
    let result = pipeline.predict(&case, &dates).map_err(|e| e.to_string())?;
    let record = build_record(pipeline.name(), &case, &result, &footer);

    let json = serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), String> {
    let addr = match args.bind {
        Some(addr) => addr,
        None => config::bind_addr()?,
    };
    let pipeline: Arc<dyn SequenceClassifier> = Arc::new(load_pipeline(args.model_dir)?);

    info!("{} v{} serving on {addr}", config::APP_NAME, config::APP_VERSION);
    let mut server = start_server(pipeline, addr).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Cannot listen for Ctrl-C: {e}"))?;
    server.shutdown();
    server.wait().await
}

fn read_lines(path: &Path) -> Result<Vec<String>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    Ok(raw.lines().map(str::to_string).collect())
}

/// `null` and blank entries mean an unknown date.
fn cli_date(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn null_and_blank_dates_are_unknown() {
        for raw in ["null", "NULL", "Null", "", "   "] {
            assert_eq!(cli_date(raw.to_string()), None, "{raw:?}");
        }
    }

    #[test]
    fn dates_are_trimmed() {
        assert_eq!(cli_date(" 10Jan2024 ".to_string()), Some("10Jan2024".to_string()));
    }

    #[test]
    fn read_lines_keeps_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "10Jan2024\n\nnull\n01Mar2024\n").unwrap();

        let lines = read_lines(file.path()).unwrap();
        assert_eq!(lines, vec!["10Jan2024", "", "null", "01Mar2024"]);

        let dates: Vec<Option<String>> = lines.into_iter().map(cli_date).collect();
        assert_eq!(
            dates,
            vec![Some("10Jan2024".to_string()), None, None, Some("01Mar2024".to_string())]
        );
    }

    #[test]
    fn read_lines_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("dates.txt");
        let err = read_lines(&missing).unwrap_err();
        assert!(err.starts_with("Cannot read"));
    }
}
