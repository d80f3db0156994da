//! Printer adapters for sending rendered ZPL payloads
//!
//! Supports:
//! - System spooler queues (`lp`, payload piped over stdin)
//! - Network printers (raw TCP, port 9100)
//! - Character device nodes (`/dev/usb/lp0`)

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Trait for printer adapters
///
/// Object safe so callers can hold a `Box<dyn Printer>` picked from config
/// and tests can substitute mocks. Implementations send the payload exactly
/// once; retry policy belongs to the caller.
#[async_trait]
pub trait Printer: Send + Sync {
    /// Send a raw ZPL payload to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Spooler-backed printer (CUPS `lp` queue)
///
/// Pipes the payload to the spooler over stdin, so no spool files are left
/// behind. The queue must be configured for raw passthrough or the spooler
/// will mangle the ZPL.
#[derive(Debug, Clone)]
pub struct SpoolerPrinter {
    program: String,
    args: Vec<String>,
    queue: String,
    timeout: Duration,
}

impl SpoolerPrinter {
    /// Create a printer backed by the `lp` queue with the given name
    pub fn new(queue: &str) -> Self {
        Self {
            program: "lp".to_string(),
            args: vec!["-d".to_string(), queue.to_string()],
            queue: queue.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Replace the spooler command entirely (program plus argv)
    ///
    /// For spoolers other than `lp`. The payload is always delivered on
    /// stdin.
    pub fn with_command(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Set the per-job timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the queue name
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Printer for SpoolerPrinter {
    #[instrument(skip(self, data), fields(queue = %self.queue, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PrintError::Spooler(format!("spawn {}: {}", self.program, e)))?;

        // The spooler may exit before draining stdin (unknown queue name);
        // keep the write error around and judge by exit status first.
        let written = match child.stdin.take() {
            Some(mut stdin) => {
                let result = stdin.write_all(data).await;
                drop(stdin);
                result
            }
            None => Err(std::io::Error::other("stdin not captured")),
        };

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PrintError::Timeout(format!("spooler job on {}", self.queue)))?
            .map_err(PrintError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrintError::Spooler(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        // Exit was clean but the payload never made it into the pipe
        written.map_err(PrintError::Io)?;

        info!("Spooler accepted job");
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue))]
    async fn is_online(&self) -> bool {
        let status = Command::new("lpstat")
            .args(["-p", &self.queue])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => true,
            Ok(_) => {
                warn!("Queue not known to the spooler");
                false
            }
            Err(e) => {
                warn!(error = %e, "lpstat unavailable");
                false
            }
        }
    }
}

/// Network printer (raw TCP, port 9100)
///
/// Zebra and most other label printers accept raw ZPL on port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        let addr_str = format!("{}:{}", host, port);
        let addr = addr_str
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr_str)))?;

        Ok(Self {
            addr,
            timeout: Duration::from_secs(5),
        })
    }

    /// Create from a socket address string (e.g., "192.168.1.50:9100")
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;

        Ok(Self {
            addr,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        debug!("Connecting to printer");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;

        stream.flush().await?;

        info!("Payload sent");
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

/// Character-device printer (`/dev/usb/lp0` and friends)
///
/// Writes the payload straight to the device node. The node must already
/// exist; a missing node reports the printer offline.
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    path: PathBuf,
}

impl DevicePrinter {
    /// Create a printer over the given device node
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the device path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Printer for DevicePrinter {
    #[instrument(skip(self, data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut device = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PrintError::Offline(self.path.display().to_string())
                }
                _ => PrintError::Io(e),
            })?;

        device.write_all(data).await?;
        device.flush().await?;

        info!("Payload written to device");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }
}
