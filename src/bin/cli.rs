//! hil-harness CLI
//!
//! Runs the built-in or file-declared suites against a device on a serial
//! port (or the built-in virtual device) and writes the report.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use hil_harness::cli::{print_exit_codes, CliResult, ExitCodes};
use hil_harness::config::{default_config_path, HarnessConfig};
use hil_harness::core::dispatcher::Completion;
use hil_harness::core::logger::{Transcript, TranscriptWriter};
use hil_harness::core::report::{ReportGenerator, ReportHeader};
use hil_harness::core::session::{HarnessSession, SessionConfig};
use hil_harness::core::simulator::{DeviceProfile, VirtualDevice};
use hil_harness::core::suite::{load_suite, TestSuite};
use hil_harness::core::transport::{list_ports, SimulatorConfig, Transport};
use hil_harness::suites::{self, BenchProfile};
use hil_harness::HarnessError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Completion strategy selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionArg {
    /// Wait the command's settle time
    Fixed,
    /// Stop once the device goes quiet
    Idle,
    /// Stop at a line matching `--marker`
    Marker,
}

/// HIL harness CLI
#[derive(Parser, Debug)]
#[command(
    name = "hil-harness",
    version,
    about = "Hardware-in-the-loop test harness for serial-console devices",
    long_about = None
)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run test suites and write the report
    Run(RunArgs),

    /// List available serial ports
    ListPorts {
        /// Show port types
        #[arg(short, long)]
        detailed: bool,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// List built-in suites and their cases
    ListSuites,

    /// Print the exit code table
    ExitCodes,

    /// Show the effective configuration
    Config {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Save it as the per-user default
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Built-in suite (complete, extended, all) or a suite file
    #[arg(short, long, default_value = "complete")]
    suite: String,

    /// Serial port
    #[arg(short, long, env = "HIL_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, env = "HIL_BAUD")]
    baud: Option<u32>,

    /// Plain-text report path
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Also write a JSON report
    #[arg(long)]
    json: Option<PathBuf>,

    /// Record every line sent and received (.jsonl for JSON lines)
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Response completion strategy
    #[arg(long, value_enum)]
    completion: Option<CompletionArg>,

    /// Quiet period for `--completion idle`, in ms
    #[arg(long, default_value_t = 150)]
    idle_ms: u64,

    /// End-of-response pattern for `--completion marker`
    #[arg(long, required_if_eq("completion", "marker"))]
    marker: Option<String>,

    /// Bench signal frequency in Hz
    #[arg(long)]
    signal_hz: Option<f64>,

    /// Run against the built-in virtual device
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_tracing(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    let result = match &cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
                warn!(error = %e, "Ctrl-C handler not installed");
            }
            match run(args, cancel).await {
                Ok(result) => result,
                Err(e) => CliResult::from(e),
            }
        }
        Commands::ListPorts { detailed, json } => into_result(list_serial_ports(*detailed, *json)),
        Commands::ListSuites => {
            list_suites();
            CliResult::success()
        }
        Commands::ExitCodes => {
            print_exit_codes();
            CliResult::success()
        }
        Commands::Config { config, write } => into_result(show_config(config.as_deref(), *write)),
    };

    match (&result, result.message()) {
        (CliResult::Success(_), Some(msg)) if !cli.quiet => println!("{msg}"),
        (CliResult::Failure { .. }, Some(msg)) => eprintln!("Error: {msg}"),
        _ => {}
    }
    result.to_exit_code()
}

fn init_tracing(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("cannot create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, "hil-harness.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("cannot install logger")?;
    Ok(guard)
}

fn into_result(result: anyhow::Result<()>) -> CliResult {
    result.map_or_else(CliResult::from, |()| CliResult::success())
}

async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<CliResult, HarnessError> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if let Some(port) = &args.port {
        config.link.port.clone_from(port);
    }
    if let Some(baud) = args.baud {
        config.link.baud_rate = baud;
    }
    if let Some(hz) = args.signal_hz {
        config.bench.signal_hz = hz;
    }
    if let Some(completion) = args.completion {
        config.dispatch.completion = match completion {
            CompletionArg::Fixed => Completion::Fixed,
            CompletionArg::Idle => Completion::Idle {
                idle: Duration::from_millis(args.idle_ms),
            },
            CompletionArg::Marker => Completion::Marker {
                pattern: args.marker.clone().unwrap_or_default(),
            },
        };
    }

    let profile = if args.simulate {
        BenchProfile::accelerated()
    } else {
        BenchProfile::hardware(config.bench.signal_hz)
    };
    let suites = select_suites(&args.suite, &profile, config.default_quiescence())?;

    let transport = if args.simulate {
        let device = VirtualDevice::new(DeviceProfile {
            signal_hz: profile.signal_hz,
            ..DeviceProfile::default()
        });
        Transport::Simulated(SimulatorConfig::default().with_device(device))
    } else {
        Transport::Serial(config.serial_config())
    };
    let target = transport.target();

    let transcript: Option<Transcript> = args
        .transcript
        .as_deref()
        .map(TranscriptWriter::shared)
        .transpose()
        .map_err(HarnessError::Report)?;

    let session = SessionConfig {
        transport,
        dispatch: config.dispatcher_config(),
        log_capacity: config.dispatch.log_capacity,
        settle_after_open: if args.simulate {
            Duration::ZERO
        } else {
            config.settle_after_open()
        },
        transcript,
    };

    let suite_names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    let mut generator = ReportGenerator::new(ReportHeader::new(
        config.report.title.clone(),
        config.report.firmware.clone(),
        target,
        suite_names.join(", "),
    ));
    info!(run = %generator.header().run_id, suites = %generator.header().suite, "run started");

    let run = HarnessSession::execute(session, &suites, cancel).await?;

    if let Some(fault) = &run.outcome.aborted {
        generator
            .header_mut()
            .note(format!("run aborted: {fault}; {} cases not run", run.outcome.skipped));
    }
    if run.outcome.cancelled {
        generator
            .header_mut()
            .note(format!("cancelled by operator; {} cases not run", run.outcome.skipped));
    }

    let report_path = args.report.clone().unwrap_or_else(|| config.report.path.clone());
    generator.write(&run.ledger, &report_path).map_err(HarnessError::Report)?;
    if let Some(json) = args.json.as_ref().or(config.report.json.as_ref()) {
        generator.write_json(&run.ledger, json).map_err(HarnessError::Report)?;
    }

    let summary = run.ledger.summary();
    let message = format!("{summary}\nReport: {}", report_path.display());
    if let Some(fault) = run.outcome.aborted {
        return Err(HarnessError::Aborted(format!("{fault} ({message})")));
    }
    if run.outcome.cancelled {
        return Ok(CliResult::cancelled(format!("cancelled: {message}")));
    }
    Ok(CliResult::success_with_message(message))
}

fn select_suites(name: &str, profile: &BenchProfile, default_wait: Duration) -> Result<Vec<TestSuite>, HarnessError> {
    if let Some(builtin) = suites::by_name(name, profile) {
        return Ok(builtin);
    }
    let suite = load_suite(Path::new(name))?;
    Ok(vec![suite.with_default_wait(default_wait)])
}

fn list_serial_ports(detailed: bool, json: bool) -> anyhow::Result<()> {
    let ports = list_ports().context("cannot enumerate serial ports")?;

    if json {
        let json: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.port_name,
                    "type": format!("{:?}", p.port_type)
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    if detailed {
        println!("Available Serial Ports:");
        println!("{:-<60}", "");
        for port in &ports {
            println!("  {} [{:?}]", port.port_name, port.port_type);
        }
    } else {
        for port in &ports {
            println!("{}", port.port_name);
        }
    }
    Ok(())
}

fn list_suites() {
    let profile = BenchProfile::default();
    for suite in suites::by_name("all", &profile).unwrap_or_default() {
        println!("{} - {}", suite.name, suite.description);
        for case in &suite.cases {
            let flaky = if case.known_flaky.is_some() { " (known flaky)" } else { "" };
            println!("  {:<12} {}{flaky}", case.id, case.description);
        }
    }
    println!("all - every built-in suite in order");
}

fn show_config(path: Option<&Path>, write: bool) -> anyhow::Result<()> {
    let config = HarnessConfig::load(path).context("cannot load configuration")?;
    println!("{}", toml::to_string_pretty(&config)?);
    if write {
        let saved = config.save().context("cannot save configuration")?;
        println!("Saved to {}", saved.display());
    } else if let Some(default) = default_config_path() {
        println!("# default location: {}", default.display());
    }
    Ok(())
}
