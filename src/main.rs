//! Port Logger - Main Entry Point
//!
//! Logs lines from a serial port (or a TCP client) to a dated log file,
//! echoes them to the console and forwards typed lines back to the device.

use anyhow::Context;
use clap::Parser;
use port_logger::{
    config::{
        default_configs_dir, FlowControl, Parity, SerialSourceConfig, SourceConfig, StopBits,
        TcpSourceConfig,
    },
    pipeline::QUIT_TOKEN,
    source::list_serial_ports,
    ControlCommand, PipelineController, PipelineEvent, PipelineHandle, PortLogConfig,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log lines from a serial port to a timestamped, read-only-on-exit file
#[derive(Debug, Parser)]
#[command(name = "port-logger", version, about)]
struct Args {
    /// Load this config file
    #[arg(long, value_name = "FILE", conflicts_with = "console")]
    config: Option<PathBuf>,

    /// Find the config whose display.console_name matches (case-insensitive)
    #[arg(long, value_name = "NAME")]
    console: Option<String>,

    /// Directory searched by --console (default: ./configs or the platform config dir)
    #[arg(long, value_name = "DIR", requires = "console")]
    configs_dir: Option<PathBuf>,

    /// Serial port name (COM3, /dev/ttyUSB0)
    #[arg(long, conflicts_with = "tcp")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Serial parity (none, odd, even)
    #[arg(long, value_parser = parse_parity)]
    parity: Option<Parity>,

    /// Serial data bits (5-8)
    #[arg(long)]
    data_bits: Option<u8>,

    /// Serial stop bits (1, 2)
    #[arg(long, value_parser = parse_stop_bits)]
    stop_bits: Option<StopBits>,

    /// Serial flow control (none, software, hardware)
    #[arg(long, value_parser = parse_flow_control)]
    flow_control: Option<FlowControl>,

    /// Listen on this address and log the first TCP client instead of a serial port
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,

    /// Base directory for log files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Log file name inside each run folder
    #[arg(long, value_name = "NAME")]
    log_file: Option<String>,

    /// Keep retrying if the source is not available at start
    #[arg(long)]
    wait_for_source: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Write the resolved config (file plus overrides) to this path and exit
    #[arg(long, value_name = "FILE")]
    init_config: Option<PathBuf>,
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    Parity::parse(s).ok_or_else(|| format!("unknown parity '{s}'"))
}

fn parse_stop_bits(s: &str) -> Result<StopBits, String> {
    StopBits::parse(s).ok_or_else(|| format!("unknown stop bits '{s}'"))
}

fn parse_flow_control(s: &str) -> Result<FlowControl, String> {
    FlowControl::parse(s).ok_or_else(|| format!("unknown flow control '{s}'"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout carries the line echo
    let (log_writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,port_logger=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(log_writer))
        .init();

    if args.list_ports {
        let ports = list_serial_ports().context("Failed to list serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            match port.product {
                Some(product) => println!("{}\t{}\t{}", port.port_name, port.port_type, product),
                None => println!("{}\t{}", port.port_name, port.port_type),
            }
        }
        return Ok(());
    }

    let config = resolve_config(&args)?;
    config.validate().context("Invalid configuration")?;

    if let Some(path) = &args.init_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote config to {}", path.display());
        return Ok(());
    }

    print_summary(&config);

    let (mut controller, handle) = PipelineController::from_config(config)?;
    let echo = spawn_echo(handle.clone())?;
    spawn_console_input(handle)?;

    println!("Type {} to exit", QUIT_TOKEN);
    let result = controller.run();
    drop(controller);
    if echo.join().is_err() {
        tracing::warn!("Echo thread panicked");
    }

    let report = result.context("Logging stopped on an error")?;
    println!(
        "Stopped: {} lines logged, {} reconnects{}",
        report.stats.lines_written,
        report.stats.reconnect_episodes,
        report
            .sealed_log
            .map(|path| format!(", sealed {path}"))
            .unwrap_or_default()
    );
    Ok(())
}

/// Build the run config from the file/console lookup plus command-line overrides
fn resolve_config(args: &Args) -> anyhow::Result<PortLogConfig> {
    let mut config = if let Some(path) = &args.config {
        PortLogConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else if let Some(name) = &args.console {
        let dir = args.configs_dir.clone().unwrap_or_else(default_configs_dir);
        PortLogConfig::find_by_console_name(&dir, name)?
    } else {
        PortLogConfig::default()
    };

    if let Some(addr) = &args.tcp {
        config.source = SourceConfig::Tcp(TcpSourceConfig {
            bind_address: addr.clone(),
            ..Default::default()
        });
    }

    let serial_override = args.port.is_some()
        || args.baud.is_some()
        || args.parity.is_some()
        || args.data_bits.is_some()
        || args.stop_bits.is_some()
        || args.flow_control.is_some();
    if serial_override {
        if !matches!(config.source, SourceConfig::Serial(_)) {
            config.source = SourceConfig::Serial(SerialSourceConfig::default());
        }
        if let SourceConfig::Serial(serial) = &mut config.source {
            if let Some(port) = &args.port {
                serial.port_name = port.clone();
            }
            if let Some(baud) = args.baud {
                serial.baud_rate = baud;
            }
            if let Some(parity) = args.parity {
                serial.parity = parity;
            }
            if let Some(bits) = args.data_bits {
                serial.data_bits = bits;
            }
            if let Some(stop_bits) = args.stop_bits {
                serial.stop_bits = stop_bits;
            }
            if let Some(flow) = args.flow_control {
                serial.flow_control = flow;
            }
        }
    }

    if let Some(dir) = &args.log_dir {
        config.log.base_directory = dir.clone();
    }
    if let Some(name) = &args.log_file {
        config.log.file_name = name.clone();
    }
    if args.wait_for_source {
        config.supervisor.wait_for_source = true;
    }
    if config.display.console_name.is_empty() {
        config.display.console_name = args
            .console
            .clone()
            .unwrap_or_else(|| config.source.identity().to_string());
    }
    Ok(config)
}

fn print_summary(config: &PortLogConfig) {
    println!("Port Logger - {}", config.display.console_name);
    match &config.source {
        SourceConfig::Serial(serial) => println!(
            "  Source : {} @ {} (flow control: {})",
            serial.port_name,
            serial.line_summary(),
            serial.flow_control
        ),
        SourceConfig::Tcp(tcp) => println!("  Source : TCP client on {}", tcp.bind_address),
    }
    println!(
        "  Log    : {}/<yyyy>/<MM_Mon>/<MM_dd>/<HH_mm_ss>/{}",
        config.log.base_directory.display(),
        config.log.file_name
    );
}

/// Print received lines to stdout and status changes to stderr
fn spawn_echo(handle: PipelineHandle) -> anyhow::Result<JoinHandle<()>> {
    let thread = std::thread::Builder::new()
        .name("echo".to_string())
        .spawn(move || loop {
            let event = match handle.recv_timeout(Duration::from_millis(200)) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(_) => break,
            };
            match event {
                PipelineEvent::Line(line) => println!("{line}"),
                PipelineEvent::ConnectionStatus(status) => eprintln!("[{status}]"),
                PipelineEvent::ReconnectAttempt { attempt, error } => {
                    eprintln!("[reconnect attempt {attempt} failed: {error}]")
                }
                PipelineEvent::Reconnected { attempts } => {
                    eprintln!("[reconnected after {attempts} attempt(s)]")
                }
                PipelineEvent::Rotated { sealed, current } => {
                    eprintln!("[log rotated: sealed {sealed}, now {current}]")
                }
                PipelineEvent::OutboundFailed(message) => eprintln!("[send failed: {message}]"),
                PipelineEvent::Error(message) => eprintln!("[error: {message}]"),
                PipelineEvent::ReconnectStarted => {}
                PipelineEvent::Stopped => break,
            }
        })
        .context("Failed to spawn echo thread")?;
    Ok(thread)
}

/// Forward stdin lines as control commands until QUIT
///
/// The thread is detached: it may stay blocked on stdin after the pipeline
/// stops for another reason.
fn spawn_console_input(handle: PipelineHandle) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match handle.submit_text(&line) {
                    Some(ControlCommand::Stop) => break,
                    Some(_) => {}
                    None if !handle.is_running() => break,
                    None => {}
                }
            }
        })
        .context("Failed to spawn console input thread")?;
    Ok(())
}
