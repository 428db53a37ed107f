use clap::{Parser, Subcommand};
use serial_ports::config::{Config, ConfigLoader};
use serial_ports::{
    AppError, AppResult, BaudRate, PortRegistry, PortSession, SerialMonitor,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Discover, monitor and safely open serial ports.",
    long_about = "Lists serial ports by their short names, follows hot-plug events, and opens ports exclusively in raw mode, restoring the terminal settings on exit."
)]
struct Args {
    /// Configuration file to use instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports currently present.
    List {
        /// Print JSON including USB details.
        #[arg(long)]
        json: bool,
    },
    /// Print the device path for a port name.
    Resolve { name: String },
    /// Print the port list every time it changes, until Ctrl-C.
    Watch,
    /// Open a port and copy stdin to it and its output to stdout.
    Monitor {
        name: String,
        /// Line speed; defaults to the saved or configured rate.
        #[arg(short, long)]
        baud: Option<u32>,
        /// Terminate sent lines with CR.
        #[arg(long)]
        cr: bool,
        /// Do not terminate sent lines with LF.
        #[arg(long)]
        no_lf: bool,
        /// Remember these settings for the port.
        #[arg(long)]
        save: bool,
    },
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> AppResult<()> {
    let mut loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    serial_ports::logging::init(&loader.config().logging)?;
    debug!("Configuration from {:?}", loader.config_path);

    let registry = Arc::new(PortRegistry::new(loader.config().discovery.naming()?));

    match args.command {
        Command::List { json } => list_ports(&registry, json),
        Command::Resolve { name } => {
            let path = registry.device_path_for_name(&name)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Watch => {
            start_watching(&registry, loader.config());
            watch_ports(&registry).await
        }
        Command::Monitor {
            name,
            baud,
            cr,
            no_lf,
            save,
        } => {
            let mut settings = loader.config().port_settings(&name);
            if let Some(baud) = baud {
                settings.baud_rate = BaudRate::new(baud)?;
            }
            if cr {
                settings.send_cr = true;
            }
            if no_lf {
                settings.send_lf = false;
            }
            if save {
                loader.config_mut().remember_port(&name, settings);
                loader.save()?;
                info!("Saved settings for {}", name);
            }

            start_watching(&registry, loader.config());
            let session = PortSession::posix(Arc::clone(&registry))
                .with_read_timeout(loader.config().serial.read_timeout());
            run_monitor(SerialMonitor::new(session, name, settings), &registry).await
        }
    }
}

fn list_ports(registry: &PortRegistry, json: bool) -> AppResult<()> {
    let ports = registry.list_ports();
    if json {
        let details: Vec<_> = ports
            .iter()
            .filter_map(|port| registry.describe(&port.name))
            .collect();
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<24} {}", port.name, port.path.display());
    }
    Ok(())
}

#[cfg(feature = "hot-plug")]
fn start_watching(registry: &PortRegistry, config: &Config) {
    if !config.discovery.watch {
        return;
    }
    let result = match config.discovery.poll_interval() {
        Some(interval) => registry.watch_polling(interval),
        None => registry.watch(),
    };
    if let Err(e) = result {
        warn!("Hot-plug notification unavailable: {}", e);
    }
}

#[cfg(not(feature = "hot-plug"))]
fn start_watching(_registry: &PortRegistry, config: &Config) {
    if config.discovery.watch {
        warn!("Built without hot-plug support; port changes will not be reported");
    }
}

async fn watch_ports(registry: &PortRegistry) -> AppResult<()> {
    let mut events = registry.subscribe();
    list_ports(registry, false)?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    println!("--");
                    list_ports(registry, false)?;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = signal::ctrl_c() => return Ok(()),
        }
    }
}

/// Pause between reconnect checks while the port is away.
const DISCONNECTED_WAIT: Duration = Duration::from_millis(250);

/// Commands from the async side to the thread that owns the port.
#[derive(Debug)]
enum MonitorCommand {
    Send(String),
    PortsChanged,
    Quit,
}

async fn run_monitor(mut monitor: SerialMonitor, registry: &PortRegistry) -> AppResult<()> {
    monitor.connect()?;
    eprintln!(
        "Connected to {} at {} baud (Ctrl-C to quit)",
        monitor.port(),
        monitor.settings().baud_rate
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut worker = tokio::task::spawn_blocking(move || -> AppResult<()> {
        let mut stdout = std::io::stdout();
        loop {
            while let Ok(command) = rx.try_recv() {
                match command {
                    MonitorCommand::Send(line) => {
                        if let Err(e) = monitor.send_line(&line) {
                            warn!("Send failed: {}", e);
                        }
                    }
                    MonitorCommand::PortsChanged => {
                        let was_connected = monitor.is_connected();
                        if let Err(e) = monitor.handle_ports_changed() {
                            warn!("Reconnect failed: {}", e);
                        }
                        if !was_connected && monitor.is_connected() {
                            eprintln!("Reconnected to {}", monitor.port());
                        }
                    }
                    MonitorCommand::Quit => return Ok(monitor.disconnect()?),
                }
            }

            if monitor.is_connected() {
                let text = monitor.poll()?;
                if !text.is_empty() {
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
            } else {
                std::thread::sleep(DISCONNECTED_WAIT);
                // Covers hosts where no change event arrives.
                if monitor.should_reconnect() && monitor.has_valid_port() {
                    match monitor.reconnect() {
                        Ok(()) => eprintln!("Reconnected to {}", monitor.port()),
                        Err(e) => debug!("Reconnect attempt failed: {}", e),
                    }
                }
            }
        }
    });

    let mut events = registry.subscribe();
    let mut stdin = spawn_line_reader(io::BufReader::new(io::stdin()))?;
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = stdin.recv(), if stdin_open => match line {
                Some(line) => { let _ = tx.send(MonitorCommand::Send(line)); }
                None => stdin_open = false,
            },
            event = events.recv() => {
                if !matches!(event, Err(broadcast::error::RecvError::Closed)) {
                    let _ = tx.send(MonitorCommand::PortsChanged);
                }
            }
            finished = &mut worker => return join_result(finished),
            _ = signal::ctrl_c() => break,
        }
    }

    let _ = tx.send(MonitorCommand::Quit);
    join_result(worker.await)
}

/// Forward lines from `reader` on a plain thread.
///
/// A blocked read there does not hold up runtime shutdown. The channel
/// closes at end of input or on a read error.
fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::UnboundedReceiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-lines".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!("Stopped reading input: {}", e);
                        return;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn join_result(
    finished: Result<AppResult<()>, tokio::task::JoinError>,
) -> AppResult<()> {
    finished.map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::time::Instant;

    /// Input that blocks until the test lets it finish.
    struct Stalled(std::sync::mpsc::Receiver<()>);

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_line_reader_ends_at_eof() {
        let mut lines = spawn_line_reader(Cursor::new(b"G28\r\nM105".to_vec())).unwrap();
        assert_eq!(lines.recv().await.as_deref(), Some("G28"));
        assert_eq!(lines.recv().await.as_deref(), Some("M105"));
        assert_eq!(lines.recv().await, None);
    }

    #[test]
    fn test_runtime_shutdown_does_not_wait_for_input() {
        let (release, stalled) = std::sync::mpsc::channel::<()>();
        let input = Cursor::new(b"M105\n".to_vec()).chain(Stalled(stalled));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let first = runtime.block_on(async {
            let mut lines = spawn_line_reader(io::BufReader::new(input)).unwrap();
            lines.recv().await
        });
        assert_eq!(first.as_deref(), Some("M105"));

        // The reader thread is now blocked on input that never arrives.
        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(release);
    }
}
