//! portcat: command-line companion for the commport library.
//!
//! Bridges a port to stdin/stdout, fires one-shot payloads and prints the
//! reply, and lists the serial hardware visible on this machine. Targets
//! come from flags or from the commport configuration file.

use std::error::Error;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use commport::config::{Config, ConfigLoader, LogFormat, MonitorCfg};
use commport::{
    enumerate_ports, BoxedTransport, DataBits, DeviceTransport, FileTransport, MonitorEntry,
    MonitorMode, MonitorQueue, Port, PortSettings, Rs485Port, SerialTransport, StopBits,
    TcpClientTransport, TcpServer, Transport,
};

/// Pause between bridge passes when nothing moved.
const BRIDGE_IDLE: Duration = Duration::from_millis(10);

/// How long `send` keeps reading after the reply goes quiet.
const QUIET_WINDOW: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "portcat")]
#[command(about = "Talk to serial, TCP, and device-file ports from the command line")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to COMMPORT_CONFIG, ./commport.toml,
    /// then the platform config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports visible on this machine
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Bridge a port to stdin/stdout until either side ends
    Cat(CatArgs),

    /// Write one payload, then print whatever comes back
    Send(SendArgs),

    /// Print the active configuration as TOML
    ShowConfig,
}

/// Where the traffic goes. The flags are mutually exclusive; without any,
/// the configuration file decides.
#[derive(ClapArgs, Debug)]
struct TargetArgs {
    /// Serial device to open (a path, COM name, or configured alias)
    #[arg(long, value_name = "DEV", group = "target")]
    serial: Option<String>,

    /// Device file to open directly, bypassing the serial backend
    #[arg(long, value_name = "PATH", group = "target")]
    device: Option<PathBuf>,

    /// TCP address to dial (host:port)
    #[arg(long, value_name = "ADDR", group = "target")]
    tcp: Option<String>,

    /// TCP address to listen on; bridges the first inbound connection
    #[arg(long, value_name = "ADDR", group = "target")]
    listen: Option<String>,

    /// File to replay as the receive side
    #[arg(long, value_name = "PATH", group = "target")]
    replay: Option<PathBuf>,

    /// Where file replay records transmitted bytes
    #[arg(long, value_name = "PATH", requires = "replay")]
    capture: Option<PathBuf>,

    /// Baud rate for serial and device targets
    #[arg(long)]
    baud: Option<u32>,

    /// Data bits: 5 through 8
    #[arg(long, value_name = "N")]
    data_bits: Option<u8>,

    /// Stop bits: 1 or 2
    #[arg(long, value_name = "N")]
    stop_bits: Option<u8>,

    /// Parity: none, even, odd, mark, space
    #[arg(long)]
    parity: Option<String>,

    /// Flow control: none, software, hardware
    #[arg(long)]
    flow: Option<String>,

    /// Wait deadline in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Monitor wiring: off, shared, split
    #[arg(long, value_name = "MODE")]
    monitor: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct CatArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Print received bytes as hex instead of raw
    #[arg(long)]
    hex: bool,
}

#[derive(ClapArgs, Debug)]
struct SendArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Payload as text
    #[arg(long, group = "payload")]
    text: Option<String>,

    /// Payload as hex bytes ("1b 5b 32 4a")
    #[arg(long = "hex", value_name = "BYTES", group = "payload")]
    data: Option<String>,

    /// Drive the write through the RS-485 wrapper, consuming the echo
    #[arg(long)]
    rs485: bool,

    /// Verify the RS-485 echo byte-for-byte
    #[arg(long, requires = "rs485")]
    verify_echo: bool,

    /// Discard input until this text appears before printing the reply
    #[arg(long, value_name = "TEXT")]
    expect: Option<String>,

    /// How long to wait for the first reply byte, in milliseconds
    #[arg(long, value_name = "MS")]
    reply_timeout_ms: Option<u64>,

    /// Dump the monitor transcript as JSON when done
    #[arg(long)]
    transcript: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref(), &config);

    match cli.command {
        Commands::List { json } => cmd_list(json),
        Commands::Cat(args) => cmd_cat(&config, &args),
        Commands::Send(args) => cmd_send(&config, &args),
        Commands::ShowConfig => cmd_show_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    let loader = match path {
        Some(p) => ConfigLoader::load_from(p)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

fn init_logging(override_level: Option<&str>, config: &Config) {
    let level = override_level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout carries port data.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn cmd_list(json: bool) -> Result<(), Box<dyn Error>> {
    let ports = enumerate_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("no serial ports found");
    } else {
        for port in &ports {
            println!("{:<20} {}", port.name, port.description);
        }
    }
    Ok(())
}

fn cmd_cat(config: &Config, args: &CatArgs) -> Result<(), Box<dyn Error>> {
    let settings = port_settings(config, &args.target)?;
    match resolve_target(config, &args.target)? {
        Target::Stream(transport) => {
            let mut port = Port::with_settings(transport, settings);
            port.open()?;
            bridge(&mut port, args.hex)
        }
        Target::Listen(addr) => {
            let server = TcpServer::bind(addr.as_str())?;
            eprintln!("listening on {}", server.local_addr());
            let mut port = server
                .accept_within(config.tcp.accept_wait(), settings)?
                .ok_or("no connection arrived in time")?;
            bridge(&mut port, args.hex)
        }
    }
}

fn cmd_send(config: &Config, args: &SendArgs) -> Result<(), Box<dyn Error>> {
    let payload = match (&args.text, &args.data) {
        (Some(text), None) => text.clone().into_bytes(),
        (None, Some(bytes)) => parse_hex(bytes)?,
        _ => return Err("payload required: pass --text or --hex".into()),
    };

    let mut settings = port_settings(config, &args.target)?;
    if args.transcript && matches!(settings.monitor, MonitorMode::Off) {
        settings = settings.with_monitor(MonitorMode::Shared);
    }

    match resolve_target(config, &args.target)? {
        Target::Stream(transport) => {
            let mut port = Port::with_settings(transport, settings);
            port.open()?;
            run_send(port, args, &payload)
        }
        Target::Listen(addr) => {
            let server = TcpServer::bind(addr.as_str())?;
            eprintln!("listening on {}", server.local_addr());
            let port = server
                .accept_within(config.tcp.accept_wait(), settings)?
                .ok_or("no connection arrived in time")?;
            run_send(port, args, &payload)
        }
    }
}

fn cmd_show_config(config: &Config) -> Result<(), Box<dyn Error>> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// A resolved destination: either a transport to open, or an address to
/// listen on.
enum Target {
    Stream(BoxedTransport),
    Listen(String),
}

/// Pick the destination. Explicit flags win; otherwise the configuration
/// file is consulted in order: serial device, device path, TCP connect,
/// TCP listen.
fn resolve_target(config: &Config, target: &TargetArgs) -> Result<Target, Box<dyn Error>> {
    let params = line_params(config, target)?;

    if let Some(name) = &target.serial {
        let device = config.serial.resolve_device(name);
        return Ok(Target::Stream(Box::new(SerialTransport::new(
            device, params,
        )?)));
    }
    if let Some(path) = &target.device {
        return Ok(Target::Stream(Box::new(DeviceTransport::new(
            path.clone(),
            params,
            config.device.stty,
        )?)));
    }
    if let Some(addr) = &target.tcp {
        return Ok(Target::Stream(Box::new(TcpClientTransport::new(
            addr.clone(),
        ))));
    }
    if let Some(addr) = &target.listen {
        return Ok(Target::Listen(addr.clone()));
    }
    if let Some(input) = &target.replay {
        let capture = target
            .capture
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("portcat-capture.bin"));
        return Ok(Target::Stream(Box::new(FileTransport::new(
            input.clone(),
            capture,
        ))));
    }

    if let Some(name) = &config.serial.device {
        let device = config.serial.resolve_device(name);
        return Ok(Target::Stream(Box::new(SerialTransport::new(
            device, params,
        )?)));
    }
    if let Some(path) = &config.device.path {
        return Ok(Target::Stream(Box::new(DeviceTransport::new(
            path.clone(),
            params,
            config.device.stty,
        )?)));
    }
    if let Some(addr) = &config.tcp.connect {
        return Ok(Target::Stream(Box::new(TcpClientTransport::new(
            addr.clone(),
        ))));
    }
    if let Some(addr) = &config.tcp.listen {
        return Ok(Target::Listen(addr.clone()));
    }

    Err("no target: pass --serial, --device, --tcp, --listen, or --replay, \
         or set one in the configuration file"
        .into())
}

/// Line parameters from the config file with flag overrides applied.
fn line_params(
    config: &Config,
    target: &TargetArgs,
) -> Result<commport::LineParams, Box<dyn Error>> {
    let mut params = config.line_params();
    if let Some(baud) = target.baud {
        params.baud = baud;
    }
    if let Some(bits) = target.data_bits {
        params.data_bits = DataBits::try_from(bits)?;
    }
    if let Some(bits) = target.stop_bits {
        params.stop_bits = StopBits::try_from(bits)?;
    }
    if let Some(parity) = &target.parity {
        params.parity = parity.parse()?;
    }
    if let Some(flow) = &target.flow {
        params.flow_control = flow.parse()?;
    }
    Ok(params)
}

/// Engine settings from the config file with flag overrides applied.
fn port_settings(config: &Config, target: &TargetArgs) -> Result<PortSettings, Box<dyn Error>> {
    let mut settings = config.port_settings();
    if let Some(ms) = target.timeout_ms {
        settings = settings.with_timeout_millis(ms);
    }
    if let Some(mode) = &target.monitor {
        let cfg: MonitorCfg = mode.parse()?;
        settings = settings.with_monitor(cfg.into());
    }
    Ok(settings)
}

/// Pump stdin to the port and the port to stdout until stdin ends or the
/// link dies.
fn bridge<T: Transport>(port: &mut Port<T>, hex: bool) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let reader = thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let mut stdout = io::stdout().lock();
    let mut stdin_done = false;
    loop {
        loop {
            match rx.try_recv() {
                Ok(bytes) => port.write_bytes(&bytes)?,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    stdin_done = true;
                    break;
                }
            }
        }

        let bytes = port.read_available()?;
        if !bytes.is_empty() {
            write_chunk(&mut stdout, &bytes, hex)?;
            stdout.flush()?;
        }

        if stdin_done {
            port.flush_tx()?;
            // Linger briefly so a prompt reply still lands on stdout.
            if port.wait_for_available(1, QUIET_WINDOW)? {
                let tail = port.read_available()?;
                write_chunk(&mut stdout, &tail, hex)?;
                stdout.flush()?;
            }
            break;
        }
        if !port.is_open() {
            info!("peer closed the link");
            break;
        }
        thread::sleep(BRIDGE_IDLE);
    }

    // The reader thread may still be parked in a blocking read; process
    // exit reclaims it.
    drop(reader);
    port.close();
    Ok(())
}

/// Write the payload, optionally sync to an expected marker, then print
/// the reply until the line goes quiet.
fn run_send<T: Transport>(
    mut port: Port<T>,
    args: &SendArgs,
    payload: &[u8],
) -> Result<(), Box<dyn Error>> {
    let rx_mon = port.rx_monitor();
    let tx_mon = port.tx_monitor();

    if args.rs485 {
        let mut wired = if args.verify_echo {
            Rs485Port::with_echo_verification(port)
        } else {
            Rs485Port::new(port)
        };
        wired.write_bytes(payload)?;
        wired.flush_tx()?;
        port = wired.into_inner();
    } else {
        port.write_bytes(payload)?;
        port.flush_tx()?;
    }
    debug!(bytes = payload.len(), "payload written");

    if let Some(pattern) = &args.expect {
        if !port.skip_until(pattern.as_bytes())? {
            warn!(pattern = %pattern, "stream ended before the expected text");
        }
    }

    let first_wait = args
        .reply_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(port.settings().timeout);
    let mut stdout = io::stdout().lock();
    if port.wait_for_available(1, first_wait)? {
        loop {
            let bytes = port.read_available()?;
            if !bytes.is_empty() {
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            if !port.wait_for_available(1, QUIET_WINDOW)? {
                break;
            }
        }
    }

    if args.transcript {
        match transcript_entries(rx_mon, tx_mon) {
            Some(entries) => {
                println!();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            None => eprintln!("transcript empty"),
        }
    }

    port.close();
    Ok(())
}

/// Drain both monitor queues into one timestamp-ordered transcript. In
/// shared wiring both handles point at the same queue, so the first drain
/// takes everything and nothing is recorded twice.
fn transcript_entries(
    rx: Option<MonitorQueue>,
    tx: Option<MonitorQueue>,
) -> Option<Vec<MonitorEntry>> {
    let mut entries: Vec<MonitorEntry> = Vec::new();
    if let Some(queue) = rx {
        entries.extend(queue.drain());
    }
    if let Some(queue) = tx {
        entries.extend(queue.drain());
    }
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|entry| entry.at);
    Some(entries)
}

fn parse_hex(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut bytes = Vec::new();
    for token in text.split([' ', ',', ':']).filter(|t| !t.is_empty()) {
        let byte = u8::from_str_radix(token.trim_start_matches("0x"), 16)
            .map_err(|_| format!("bad hex byte '{token}'"))?;
        bytes.push(byte);
    }
    if bytes.is_empty() {
        return Err("empty hex payload".into());
    }
    Ok(bytes)
}

fn write_chunk(out: &mut impl Write, bytes: &[u8], hex: bool) -> io::Result<()> {
    if hex {
        for byte in bytes {
            write!(out, "{byte:02x} ")?;
        }
        Ok(())
    } else {
        out.write_all(bytes)
    }
}
