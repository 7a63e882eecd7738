//! tourseg - command-line interface for the tour segmenter
//!
//! Commands:
//! - analyze: Segment tours and write analysis reports
//! - segmenters: List segmenters available for a tour
//! - smooth: Derive smoothed channels
//! - validate: Validate tour.series.v1 documents
//! - config: Print the default analysis configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tour_segmenter::encoder::{ReportEncoder, TourReport};
use tour_segmenter::schema::{TourInput, TourSeriesDocument, SCHEMA_VERSION};
use tour_segmenter::segmenter::{describe_segmenters, SegmenterInfo};
use tour_segmenter::types::{Channels, SmoothedSeries};
use tour_segmenter::{
    analyze_tour, AnalysisConfig, ComputeError, SegmenterKind, SignalSmoother, ENGINE_VERSION,
};

/// tourseg - segment recorded tours and compute segment statistics
#[derive(Parser)]
#[command(name = "tourseg")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Segment tour time series and compute segment statistics", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment tours and write analysis reports
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Analysis configuration for documents without one
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Segmenter overriding the configured one, with default parameters
        #[arg(long, value_enum)]
        segmenter: Option<SegmenterArg>,
    },

    /// List segmenters and whether a tour supports them
    Segmenters {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive smoothed channels
    Smooth {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Analysis configuration for documents without one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate tour.series.v1 documents
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default analysis configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// One tour document
    Json,
    /// Newline-delimited JSON (one tour document per line)
    Ndjson,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum SegmenterArg {
    AltitudeDp,
    AltitudeDpMerged,
    AltitudeWithMarker,
    Marker,
    Distance,
    BreakTime,
    PulseDp,
    AltitudeUpDown,
}

impl From<SegmenterArg> for SegmenterKind {
    fn from(arg: SegmenterArg) -> Self {
        match arg {
            SegmenterArg::AltitudeDp => SegmenterKind::ByAltitudeDp,
            SegmenterArg::AltitudeDpMerged => SegmenterKind::ByAltitudeDpMerged,
            SegmenterArg::AltitudeWithMarker => SegmenterKind::ByAltitudeWithMarker,
            SegmenterArg::Marker => SegmenterKind::ByMarker,
            SegmenterArg::Distance => SegmenterKind::ByDistance,
            SegmenterArg::BreakTime => SegmenterKind::ByBreakTime,
            SegmenterArg::PulseDp => SegmenterKind::ByPulseDp,
            SegmenterArg::AltitudeUpDown => SegmenterKind::ByAltitudeUpDown,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TourCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            config,
            segmenter,
        } => cmd_analyze(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            segmenter.map(SegmenterKind::from),
        ),

        Commands::Segmenters {
            input,
            input_format,
            json,
        } => cmd_segmenters(&input, input_format, json),

        Commands::Smooth {
            input,
            output,
            input_format,
            output_format,
            config,
        } => cmd_smooth(&input, &output, input_format, output_format, config.as_deref()),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Config => {
            println!("{}", AnalysisConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    segmenter: Option<SegmenterKind>,
) -> Result<(), TourCliError> {
    let default_config = load_config(config)?;
    let encoder = ReportEncoder::new();

    let mut reports: Vec<TourReport> = Vec::new();
    for document in read_documents(input, input_format)? {
        let mut tour = document.into_input(default_config)?;
        if let Some(kind) = segmenter {
            tour.config.segmenter = kind.default_config();
        }

        let analysis = analyze_tour(&tour.series, &tour.markers, &tour.config)?;
        reports.push(encoder.encode(&analysis, tour.source.as_ref())?);
    }

    info!(tours = reports.len(), "analysis finished");
    write_output(output, &format_output(&reports, output_format)?)
}

fn cmd_segmenters(input: &Path, input_format: InputFormat, json: bool) -> Result<(), TourCliError> {
    let mut listings: Vec<Vec<SegmenterInfo>> = Vec::new();
    for document in read_documents(input, input_format)? {
        let tour = document.into_input(AnalysisConfig::default())?;
        listings.push(describe_segmenters(Channels::of(&tour.series, &tour.markers)));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    for (index, listing) in listings.iter().enumerate() {
        println!("Tour {index}");
        for info in listing {
            let requires: Vec<&str> = info.requires.iter().map(|c| c.as_str()).collect();
            let status = if info.available { "[OK]" } else { "[--]" };
            println!(
                "  {status} {:<24} {:<36} requires {}",
                info.kind.id(),
                info.name,
                requires.join(", ")
            );
        }
    }

    Ok(())
}

fn cmd_smooth(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
) -> Result<(), TourCliError> {
    let default_config = load_config(config)?;

    let smoothed: Vec<SmoothedSeries> = read_documents(input, input_format)?
        .into_iter()
        .map(|document| {
            let TourInput { series, config, .. } = document.into_input(default_config)?;
            Ok(SignalSmoother::smooth(&series, &config.smoothing))
        })
        .collect::<Result<_, ComputeError>>()?;

    write_output(output, &format_output(&smoothed, output_format)?)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), TourCliError> {
    let data = read_input(input)?;

    let mut report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_documents: 0,
        valid_documents: 0,
        invalid_documents: 0,
        errors: Vec::new(),
    };

    for (index, text) in document_texts(&data, input_format).into_iter().enumerate() {
        report.total_documents += 1;

        let result = serde_json::from_str::<TourSeriesDocument>(text)
            .map_err(|e| e.to_string())
            .and_then(|document| document.validate().map_err(|e| e.to_string()));

        match result {
            Ok(()) => report.valid_documents += 1,
            Err(error) => {
                report.invalid_documents += 1;
                report.errors.push(ValidationErrorDetail { index, error });
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema_version);
        println!("=================");
        println!("Total documents:   {}", report.total_documents);
        println!("Valid documents:   {}", report.valid_documents);
        println!("Invalid documents: {}", report.invalid_documents);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Document {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_documents > 0 {
        Err(TourCliError::ValidationFailed(report.invalid_documents))
    } else {
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, TourCliError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading analysis configuration");
            Ok(AnalysisConfig::from_json(&fs::read_to_string(path)?)?)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, TourCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(TourCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn document_texts(data: &str, format: InputFormat) -> Vec<&str> {
    match format {
        InputFormat::Json => vec![data],
        InputFormat::Ndjson => data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect(),
    }
}

fn read_documents(
    input: &Path,
    format: InputFormat,
) -> Result<Vec<TourSeriesDocument>, TourCliError> {
    let data = read_input(input)?;

    let documents = document_texts(&data, format)
        .into_iter()
        .map(TourSeriesDocument::from_json)
        .collect::<Result<Vec<_>, _>>()?;

    if documents.is_empty() {
        return Err(TourCliError::NoDocuments);
    }

    debug!(documents = documents.len(), "documents read");
    Ok(documents)
}

fn format_output<T: Serialize>(records: &[T], format: OutputFormat) -> Result<String, TourCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), TourCliError> {
    if output.to_string_lossy() == "-" {
        print!("{data}");
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ValidationReport {
    schema_version: String,
    total_documents: usize,
    valid_documents: usize,
    invalid_documents: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(Debug)]
enum TourCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    InteractiveStdin,
    NoDocuments,
    ValidationFailed(usize),
}

impl From<io::Error> for TourCliError {
    fn from(e: io::Error) -> Self {
        TourCliError::Io(e)
    }
}

impl From<ComputeError> for TourCliError {
    fn from(e: ComputeError) -> Self {
        TourCliError::Compute(e)
    }
}

impl From<serde_json::Error> for TourCliError {
    fn from(e: serde_json::Error) -> Self {
        TourCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TourCliError> for CliError {
    fn from(e: TourCliError) -> Self {
        match e {
            TourCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TourCliError::Compute(ComputeError::SegmenterUnavailable { segmenter, missing }) => {
                CliError {
                    code: "SEGMENTER_UNAVAILABLE".to_string(),
                    message: format!("Segmenter {segmenter} is unavailable, missing: {missing}"),
                    hint: Some("Run `tourseg segmenters` to list usable segmenters".to_string()),
                }
            }
            TourCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {SCHEMA_VERSION} schema")),
            },
            TourCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TourCliError::InteractiveStdin => CliError {
                code: "INTERACTIVE_STDIN".to_string(),
                message: "Refusing to read a tour from an interactive terminal".to_string(),
                hint: Some("Pipe a document into stdin or pass --input <file>".to_string()),
            },
            TourCliError::NoDocuments => CliError {
                code: "NO_DOCUMENTS".to_string(),
                message: "Input contains no tour documents".to_string(),
                hint: None,
            },
            TourCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{count} document(s) failed validation"),
                hint: Some("Fix the reported errors and validate again".to_string()),
            },
        }
    }
}
