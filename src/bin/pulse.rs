//! Pulse CLI - Command-line interface for Pagepulse
//!
//! Commands:
//! - replay: Replay a recorded session into sink calls (batch mode)
//! - run: Replay records streamed on stdin (streaming mode)
//! - validate: Validate recorded session records
//! - doctor: Diagnose configuration and environment
//! - schema: Describe the recorded session format

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pagepulse::config::TRACKING_ID_ENV;
use pagepulse::replay::{parse_array, parse_ndjson, validate_records, ReplayProcessor, ReplayRecord};
use pagepulse::{Environment, SinkCall, TrackingConfig};
use pagepulse::{PRODUCER_NAME, PULSE_VERSION, REPLAY_FORMAT};

/// Pulse - Client-side behavioral analytics engine
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = PULSE_VERSION)]
#[command(about = "Replay page sessions into analytics events", long_about = None)]
struct Cli {
    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session into sink calls (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Replay records streamed on stdin (streaming mode)
    Run {
        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Validate recorded session records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a tracking configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the recorded session format
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

/// Tracking configuration and host environment of the replayed page
#[derive(Args)]
struct SessionArgs {
    /// Tracking identifier (falls back to PAGEPULSE_TRACKING_ID)
    #[arg(long)]
    tracking_id: Option<String>,

    /// Tracking configuration file (JSON); overrides --tracking-id
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hostname of the replayed document
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// Browser timezone (IANA format, e.g., "Europe/Berlin")
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Browser locale
    #[arg(long, default_value = "en-US")]
    locale: String,

    /// Referrer URL of the visit
    #[arg(long)]
    referrer: Option<String>,

    /// Document title
    #[arg(long)]
    title: Option<String>,

    /// Delay before reading navigation timing after load, in milliseconds
    #[arg(long)]
    settle_delay_ms: Option<u64>,
}

impl SessionArgs {
    fn tracking_config(&self) -> Result<TrackingConfig, PulseCliError> {
        let mut config = match (&self.config, &self.tracking_id) {
            (Some(path), _) => TrackingConfig::from_json(&fs::read_to_string(path)?)?,
            (None, Some(id)) => TrackingConfig::new(id.clone()),
            (None, None) => TrackingConfig::from_env(),
        };
        if let Some(delay) = self.settle_delay_ms {
            config = config.with_settle_delay_ms(delay);
        }
        if !config.is_enabled() {
            log::warn!("No tracking id configured; the replay will produce no sink calls");
        }
        Ok(config)
    }

    fn environment(&self) -> Environment {
        let mut environment = Environment::new(self.hostname.clone())
            .with_timezone(self.timezone.clone())
            .with_locale(self.locale.clone());
        if let Some(referrer) = &self.referrer {
            environment = environment.with_referrer(referrer.clone());
        }
        if let Some(title) = &self.title {
            environment = environment.with_title(title.clone());
        }
        environment
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one sink call per line)
    Ndjson,
    /// JSON array of sink calls
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args()))
        .init();
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            session,
        } => cmd_replay(&input, &output, input_format, output_format, &session),

        Commands::Run {
            output_format,
            flush,
            session,
        } => cmd_run(output_format, flush, &session),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

fn read_input(input: &Path) -> Result<String, PulseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, input_format: InputFormat) -> Result<Vec<ReplayRecord>, PulseCliError> {
    let input_data = read_input(input)?;
    let records = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => parse_array(&input_data)?,
    };
    Ok(records)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    session: &SessionArgs,
) -> Result<(), PulseCliError> {
    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(PulseCliError::NoRecords);
    }

    let mut processor = ReplayProcessor::new(session.tracking_config()?, session.environment());
    let mut calls = processor.process(&records)?;
    calls.extend(processor.finish());
    log::debug!("{} records replayed into {} sink calls", records.len(), calls.len());

    let output_data = format_output(&calls, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(output_format: OutputFormat, flush: bool, session: &SessionArgs) -> Result<(), PulseCliError> {
    let mut processor = ReplayProcessor::new(session.tracking_config()?, session.environment());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let record: ReplayRecord = serde_json::from_str(trimmed).map_err(|e| {
            PulseCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;

        record.validate()?;

        let calls = processor.process(std::slice::from_ref(&record))?;
        if calls.is_empty() {
            continue;
        }

        write!(stdout, "{}", format_output(&calls, &output_format)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    let calls = processor.finish();
    if !calls.is_empty() {
        write!(stdout, "{}", format_output(&calls, &output_format)?)?;
    }
    stdout.flush()?;

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), PulseCliError> {
    let records = read_records(input, input_format)?;
    let failures = validate_records(&records);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - failures.len(),
        invalid_records: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                record_type: f.action.to_string(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {} ({}): {}", err.index, err.record_type, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(PulseCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pagepulse version {}", PULSE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "replay_format".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input format: {}", REPLAY_FORMAT),
    });

    let env_config = TrackingConfig::from_env();
    checks.push(match env_config.active_tracking_id() {
        Some(id) => DoctorCheck {
            name: "tracking_id".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is set ({})", TRACKING_ID_ENV, id),
        },
        None => DoctorCheck {
            name: "tracking_id".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} is not set; tracking is disabled unless --tracking-id is given", TRACKING_ID_ENV),
        },
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
                Ok(content) => match TrackingConfig::from_json(&content) {
                    Ok(parsed) if parsed.is_enabled() => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!("Config valid (settle delay {} ms)", parsed.settle_delay_ms),
                    },
                    Ok(_) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Warning,
                        message: "Config valid but has no tracking id".to_string(),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
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

    // Check stdin is available (for streaming mode)
    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (streaming mode ready)"
    };
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: stdin_message.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
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
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(json_schema: bool) -> Result<(), PulseCliError> {
    if json_schema {
        println!("{}", get_input_json_schema());
        return Ok(());
    }

    println!("Input Format: {}", REPLAY_FORMAT);
    println!();
    println!("Each record is a JSON object with an RFC 3339 \"at\" timestamp and a \"type\".");
    println!("Records must be in chronological order.");
    println!();
    println!("Host signals:");
    println!("  - navigation         {{ path, query?, title? }}");
    println!("  - scroll             {{ scroll_y, document_height, viewport_height }}");
    println!("  - click              {{ tag, text?, href?, download?, ancestors? }}");
    println!("  - load");
    println!("  - performance_entry  {{ entryType, name, startTime }}");
    println!("  - navigation_timing  {{ fetchStart, domainLookupStart, ..., loadEventEnd }}");
    println!();
    println!("Component calls:");
    println!("  - mount_post / unmount_post  {{ slug }}");
    println!("  - manual_progress            {{ slug, percent }}");
    println!("  - code_copy / code_view      {{ code, language? }}");
    println!("  - form_view                  {{ form }}");
    println!("  - form_submit                {{ form, fields_filled? }}");
    println!("  - form_success               {{ form, response_time_ms? }}");
    println!("  - search                     {{ query, results_count? }}");
    println!("  - service_inquiry            {{ service_type, value? }}");
    println!("  - technical_interaction");
    println!("  - advance_clock");
    println!();
    println!("Output: one [command, target, payload] sink call per line.");

    Ok(())
}

// Helper functions

fn format_output(calls: &[SinkCall], format: &OutputFormat) -> Result<String, PulseCliError> {
    let wire: Vec<serde_json::Value> = calls.iter().map(SinkCall::to_wire).collect();
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for call in &wire {
                lines.push(serde_json::to_string(call)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(&wire)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(&wire)? + "\n"),
    }
}

fn get_input_json_schema() -> String {
    let record_types = [
        "navigation",
        "scroll",
        "click",
        "load",
        "performance_entry",
        "navigation_timing",
        "mount_post",
        "unmount_post",
        "manual_progress",
        "code_copy",
        "code_view",
        "form_view",
        "form_submit",
        "form_success",
        "search",
        "service_inquiry",
        "technical_interaction",
        "advance_clock",
    ];

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": REPLAY_FORMAT,
        "description": "Pagepulse recorded session record",
        "type": "object",
        "required": ["at", "type"],
        "properties": {
            "at": { "type": "string", "format": "date-time" },
            "type": { "type": "string", "enum": record_types },
            "path": { "type": "string", "pattern": "^/" },
            "query": { "type": "string" },
            "title": { "type": "string" },
            "scroll_y": { "type": "number" },
            "document_height": { "type": "number" },
            "viewport_height": { "type": "number" },
            "tag": { "type": "string" },
            "text": { "type": "string" },
            "href": { "type": "string" },
            "download": { "type": "boolean" },
            "ancestors": { "type": "array", "items": { "type": "string" } },
            "slug": { "type": "string" },
            "percent": { "type": "integer", "minimum": 0, "maximum": 100 },
            "code": { "type": "string" },
            "language": { "type": "string" },
            "form": { "type": "string" },
            "fields_filled": { "type": "integer", "minimum": 0 },
            "response_time_ms": { "type": "number" },
            "results_count": { "type": "integer", "minimum": 0 },
            "service_type": { "type": "string" },
            "value": { "type": "number" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Track(pagepulse::TrackError),
    Json(serde_json::Error),
    Validation(pagepulse::replay::ValidationError),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<pagepulse::TrackError> for PulseCliError {
    fn from(e: pagepulse::TrackError) -> Self {
        PulseCliError::Track(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

impl From<pagepulse::replay::ValidationError> for PulseCliError {
    fn from(e: pagepulse::replay::ValidationError) -> Self {
        PulseCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Track(e) => CliError {
                code: "REPLAY_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {} format", REPLAY_FORMAT)),
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pulse validate' for details".to_string()),
            },
            PulseCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            PulseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    record_type: String,
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
