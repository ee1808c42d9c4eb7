//! checkin CLI - Command-line interface for checkin-signals
//!
//! Commands:
//! - replay: Run recorded landmark frames through the mode controller
//! - extract: Print per-frame raw features as NDJSON
//! - classify: Classify one feature value
//! - validate: Validate recorded frames
//! - doctor: Diagnose configuration and threshold tables
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use checkin_signals::classifier::{Classifier, DESCRIPTORS};
use checkin_signals::config::PipelineConfig;
use checkin_signals::draft::DraftHandle;
use checkin_signals::encoder::{SnapshotEncoder, SNAPSHOT_VERSION};
use checkin_signals::features::{FeatureExtractor, SessionMemory};
use checkin_signals::pipeline::ModeController;
use checkin_signals::schema::{FrameRecord, FrameRecordAdapter, ReplaySource, FRAME_SCHEMA_VERSION};
use checkin_signals::types::{
    FeatureKind, FeatureSample, Mode, SessionEnd, SessionReport, SkipReason,
};
use checkin_signals::{SignalError, CHECKIN_SIGNALS_VERSION, PRODUCER_NAME};

/// checkin - On-device wellness signals from facial geometry
#[derive(Parser)]
#[command(name = "checkin")]
#[command(author = "Koru Wellness")]
#[command(version = CHECKIN_SIGNALS_VERSION)]
#[command(about = "Turn face-landmark frames into check-in scores", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frames through the mode controller and print a snapshot
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Acquisition mode
        #[arg(long, default_value = "windowed")]
        mode: ModeArg,

        /// Pipeline config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep the configured tick periods instead of replaying as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Stop a continuous session after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Pretty-print the snapshot
        #[arg(long)]
        pretty: bool,
    },

    /// Print raw per-frame features as NDJSON
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,
    },

    /// Classify one feature value into a 1-5 score
    Classify {
        /// Feature name (eye_openness, brow_distance_ratio, ...)
        #[arg(long)]
        feature: String,

        /// Feature value
        #[arg(long, allow_hyphen_values = true)]
        value: f64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate recorded frames
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and threshold tables
    Doctor {
        /// Check a pipeline config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Detect from the first character
    Auto,
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Smooth every frame until the recording ends
    Continuous,
    /// Aggregate a fixed countdown window
    Windowed,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Continuous => Mode::Continuous,
            ModeArg::Windowed => Mode::Windowed,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (checkin.landmark_frame.v1)
    Input,
    /// Output schema (check-in snapshot)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

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

/// Log to stderr so stdout stays machine-readable
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<(), CheckinCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            mode,
            config,
            realtime,
            duration_ms,
            pretty,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            mode.into(),
            config.as_deref(),
            realtime,
            duration_ms,
            pretty,
        ),

        Commands::Extract {
            input,
            output,
            input_format,
        } => cmd_extract(&input, &output, input_format),

        Commands::Classify { feature, value, json } => cmd_classify(&feature, value, json),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    mode: Mode,
    config_path: Option<&Path>,
    realtime: bool,
    duration_ms: Option<u64>,
    pretty: bool,
) -> Result<(), CheckinCliError> {
    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(CheckinCliError::NoFrames);
    }
    if let Some(failure) = FrameRecordAdapter::validate_records(&records).first() {
        return Err(CheckinCliError::Signal(SignalError::ParseError(format!(
            "frame at index {} is invalid: {}",
            failure.index, failure.error
        ))));
    }

    let mut config = match config_path {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if !realtime {
        config.frame_interval_ms = 1;
        config.window_tick_ms = 1;
        config.cooldown_ms = 0;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let source = ReplaySource::new(records);
    let draft = DraftHandle::default();

    let report = runtime.block_on(run_session(&source, draft.clone(), config, mode, duration_ms))?;
    let report = report
        .ok_or_else(|| CheckinCliError::SessionFailed("session did not report".to_string()))?;
    if let SessionEnd::Failed { reason } = &report.end {
        return Err(CheckinCliError::SessionFailed(reason.clone()));
    }
    if report.stats.samples == 0 {
        warn!(ticks = report.stats.ticks, "no valid samples in recording");
    }

    let encoder = SnapshotEncoder::new();
    let snapshot = encoder.encode(&draft.snapshot(), Some(&report));
    let rendered = if pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    write_output(output, &(rendered + "\n"))
}

/// Drive one session over the recording until it completes, the recording
/// runs out, or `duration_ms` passes
async fn run_session(
    source: &ReplaySource,
    draft: DraftHandle,
    config: PipelineConfig,
    mode: Mode,
    duration_ms: Option<u64>,
) -> Result<Option<SessionReport>, CheckinCliError> {
    let mut controller = ModeController::new(
        Arc::new(source.device()),
        Arc::new(source.loader()),
        draft,
        config,
    )?;
    controller.start(mode).await?;
    info!(frames = source.len(), mode = mode.as_str(), "replaying recording");

    if mode == Mode::Windowed {
        return Ok(controller.join().await);
    }

    let stats = source.stats();
    let limit = duration_ms.map(Duration::from_millis);
    let started = tokio::time::Instant::now();
    let poll = controller.config().frame_interval();
    loop {
        tokio::time::sleep(poll).await;
        let timed_out = limit.is_some_and(|limit| started.elapsed() >= limit);
        if stats.is_exhausted() || timed_out || !controller.is_running() {
            break;
        }
    }
    Ok(controller.stop().await)
}

#[derive(serde::Serialize)]
struct ExtractedFrame {
    sequence: u64,
    timestamp_ms: f64,
    features: Option<FeatureSample>,
    skip: Option<SkipReason>,
}

fn cmd_extract(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
) -> Result<(), CheckinCliError> {
    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(CheckinCliError::NoFrames);
    }

    let mut memory = SessionMemory::new();
    let mut lines = String::new();
    for record in &records {
        let result = match (&record.face, record.ready) {
            (_, false) => Err(SkipReason::InvalidFrame),
            (None, true) => Err(SkipReason::DetectionGap),
            (Some(face), true) => {
                FeatureExtractor::extract(face, &mut memory).ok_or(SkipReason::InvalidFrame)
            }
        };
        let line = ExtractedFrame {
            sequence: record.sequence,
            timestamp_ms: record.timestamp_ms,
            features: result.ok(),
            skip: result.err(),
        };
        lines.push_str(&serde_json::to_string(&line)?);
        lines.push('\n');
    }

    write_output(output, &lines)
}

fn cmd_classify(feature: &str, value: f64, json: bool) -> Result<(), CheckinCliError> {
    let kind: FeatureKind = feature.parse()?;
    if !value.is_finite() {
        return Err(CheckinCliError::InvalidValue(value));
    }
    let update = Classifier::score_update(kind, value);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "feature": kind.as_str(),
                "value": value,
                "metric": update.metric.as_str(),
                "score": update.score.value(),
            })
        );
    } else {
        println!("{} = {} -> {}: {}/5", kind, value, update.metric.label(), update.score);
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), CheckinCliError> {
    let records = read_records(input, &input_format)?;
    let results = FrameRecordAdapter::validate_records(&records);

    let report = ValidationReport {
        total_frames: records.len(),
        valid_frames: records.len() - results.len(),
        invalid_frames: results.len(),
        faces: records.iter().filter(|r| r.face.is_some()).count(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                sequence: r.sequence,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total frames:   {}", report.total_frames);
        println!("Valid frames:   {}", report.valid_frames);
        println!("Invalid frames: {}", report.invalid_frames);
        println!("With face:      {}", report.faces);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Frame {} (index {}): {}", err.sequence, err.index, err.error);
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(CheckinCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), CheckinCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("checkin-signals version {}", CHECKIN_SIGNALS_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", FRAME_SCHEMA_VERSION),
    });

    // Threshold tables must ascend so every value lands in exactly one bracket
    let unordered: Vec<&str> = DESCRIPTORS
        .iter()
        .filter(|d| !d.boundaries.windows(2).all(|w| w[0] < w[1]))
        .map(|d| d.kind.as_str())
        .collect();
    checks.push(if unordered.is_empty() {
        DoctorCheck {
            name: "thresholds".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} feature tables ascending", DESCRIPTORS.len()),
        }
    } else {
        DoctorCheck {
            name: "thresholds".to_string(),
            status: CheckStatus::Error,
            message: format!("Boundaries out of order: {}", unordered.join(", ")),
        }
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(config_path) {
                Ok(content) => match PipelineConfig::from_json(&content) {
                    Ok(parsed) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid ({} ticks of {} ms, cooldown {} ms)",
                            parsed.window_ticks, parsed.window_tick_ms, parsed.cooldown_ms
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (recordings can be piped in with -i -)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CHECKIN_SIGNALS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Checkin Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CheckinCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), CheckinCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", FRAME_SCHEMA_VERSION);
                println!();
                println!("One record per captured frame (NDJSON or JSON array):");
                println!();
                println!("- schema_version: \"{}\"", FRAME_SCHEMA_VERSION);
                println!("- sequence: frame counter (default 0)");
                println!("- timestamp_ms: capture time, non-decreasing");
                println!("- ready: false when the camera had no decodable frame (default true)");
                println!("- face: array of {{ x, y }} normalized points, or null without a face");
                println!();
                println!("Landmark indices read by the extractor:");
                println!("  nose 1, lips 13/14, mouth corners 61/291, brows 70/300");
                println!("  face edges 234/454");
                println!("  left eye 33,160,158,133,153,144; right eye 362,385,387,263,373,380");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: check-in snapshot {}", SNAPSHOT_VERSION);
                println!();
                println!("- snapshot_version: Schema version ({})", SNAPSHOT_VERSION);
                println!("- producer: {{ name, version, instance_id }}");
                println!("- computed_at_utc: RFC 3339 timestamp");
                println!("- scores: {{ sleep, stress, tension, mood, focus }} as 1-5 or null");
                println!("- summary: e.g. \"Sleep quality: 4/5, Mood: 3/5\"");
                println!("- session: {{ session_id, mode, started_at, ended_at, end, stats }}");
                println!("  plus window aggregates for windowed sessions");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, CheckinCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, format: &InputFormat) -> Result<Vec<FrameRecord>, CheckinCliError> {
    let data = read_input(input)?;
    let records = match format {
        InputFormat::Auto => FrameRecordAdapter::parse(&data)?,
        InputFormat::Ndjson => FrameRecordAdapter::parse_ndjson(&data)?,
        InputFormat::Json => FrameRecordAdapter::parse_array(&data)?,
    };
    Ok(records)
}

fn write_output(output: &Path, data: &str) -> Result<(), CheckinCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": FRAME_SCHEMA_VERSION,
        "description": "Recorded face-landmark frame",
        "type": "object",
        "required": ["schema_version", "timestamp_ms"],
        "properties": {
            "schema_version": { "type": "string", "const": FRAME_SCHEMA_VERSION },
            "sequence": { "type": "integer", "minimum": 0 },
            "timestamp_ms": { "type": "number", "minimum": 0 },
            "ready": { "type": "boolean", "default": true },
            "face": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["x", "y"],
                    "properties": {
                        "x": { "type": "number" },
                        "y": { "type": "number" }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let score = serde_json::json!({ "type": ["integer", "null"], "minimum": 1, "maximum": 5 });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "checkin.snapshot",
        "description": "Check-in scores derived from facial geometry",
        "type": "object",
        "required": ["snapshot_version", "producer", "computed_at_utc", "scores", "summary"],
        "properties": {
            "snapshot_version": { "type": "string", "const": SNAPSHOT_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "scores": {
                "type": "object",
                "properties": {
                    "sleep": score,
                    "stress": score,
                    "tension": score,
                    "mood": score,
                    "focus": score
                }
            },
            "summary": { "type": "string" },
            "session": { "type": "object" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum CheckinCliError {
    Io(io::Error),
    Signal(SignalError),
    Json(serde_json::Error),
    NoFrames,
    InvalidValue(f64),
    ValidationFailed(usize),
    DoctorFailed,
    SessionFailed(String),
}

impl From<io::Error> for CheckinCliError {
    fn from(e: io::Error) -> Self {
        CheckinCliError::Io(e)
    }
}

impl From<SignalError> for CheckinCliError {
    fn from(e: SignalError) -> Self {
        CheckinCliError::Signal(e)
    }
}

impl From<serde_json::Error> for CheckinCliError {
    fn from(e: serde_json::Error) -> Self {
        CheckinCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CheckinCliError> for CliError {
    fn from(e: CheckinCliError) -> Self {
        match e {
            CheckinCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CheckinCliError::Signal(e @ SignalError::UnknownFeature(_)) => CliError {
                code: "UNKNOWN_FEATURE".to_string(),
                message: e.to_string(),
                hint: Some(format!(
                    "Use one of: {}",
                    FeatureKind::ALL.map(|k| k.as_str()).join(", ")
                )),
            },
            CheckinCliError::Signal(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", FRAME_SCHEMA_VERSION)),
            },
            CheckinCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CheckinCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CheckinCliError::InvalidValue(value) => CliError {
                code: "INVALID_VALUE".to_string(),
                message: format!("Feature value must be finite, got {}", value),
                hint: None,
            },
            CheckinCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} frames failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CheckinCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            CheckinCliError::SessionFailed(reason) => CliError {
                code: "SESSION_FAILED".to_string(),
                message: reason,
                hint: Some("Run 'checkin validate' on the recording".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    faces: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    sequence: u64,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
