//! Worker configuration
//!
//! Everything comes from the environment (a `.env` file is honored), with
//! harmless defaults for all but the source credentials.

use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// How rendered payloads reach a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterTransport {
    /// CUPS `lp` queue, payload over stdin
    Spooler,
    /// Raw TCP, usually port 9100
    Network,
    /// Character device node
    Device,
}

impl std::str::FromStr for PrinterTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spooler" | "lp" => Ok(PrinterTransport::Spooler),
            "network" | "tcp" => Ok(PrinterTransport::Network),
            "device" => Ok(PrinterTransport::Device),
            other => Err(ConfigError::InvalidValue {
                var: "PRINTER_TRANSPORT",
                value: other.to_string(),
            }),
        }
    }
}

/// Worker configuration - every knob of the dispatch loop
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | SUPABASE_URL | (required) | Project REST endpoint |
/// | SUPABASE_KEY | (required) | API key, sent as `apikey` and bearer |
/// | WORK_DIR | /home/gst3d | Counter files, journals, notices |
/// | TEMPLATE_DIR | {WORK_DIR}/etiquetas | `.prn` ZPL templates |
/// | PRINTER_TRANSPORT | spooler | spooler \| network \| device |
/// | PRINTER_SMALL | ZebraZD420 | Small-stock target |
/// | PRINTER_LARGE | ZebraZD420_Grande | Large-stock target |
/// | MACHINE_ID | 02 | Station id prefixed into barcodes |
/// | HOURLY_LABEL_LIMIT | 100 | Labels admitted per hour window |
/// | POLL_INTERVAL_MS | 5000 | Pause between polling cycles |
/// | FETCH_LIMIT | 10 | Jobs fetched per cycle |
/// | DISPATCH_ATTEMPTS | 3 | Attempts per label unit |
/// | DISPATCH_TIMEOUT_MS | 30000 | Bound on one dispatch attempt |
/// | DISPATCH_RETRY_DELAY_MS | 2000 | Pause between dispatch attempts |
/// | CONNECT_RETRIES | 5 | Reconnect attempts against the source |
/// | CONNECT_RETRY_DELAY_MS | 10000 | Pause between reconnect attempts |
/// | UPDATE_RETRIES | 3 | State write-back attempts per job |
/// | UPDATE_RETRY_DELAY_MS | 2000 | Pause between write-back attempts |
/// | MAX_CONSECUTIVE_FAILURES | 5 | Failed cycles before extended backoff |
/// | CRITICAL_BACKOFF_MS | 30000 | The extended backoff itself |
/// | INTER_JOB_DELAY_MS | 1000 | Pause between jobs inside a cycle |
/// | IDLE_HEARTBEAT_CYCLES | 60 | Idle cycles between heartbeat lines |
/// | TEMPLATE_AUDIT | true | Periodic catalog-vs-templates check |
/// | AUDIT_INTERVAL_CYCLES | 100 | Cycles between template audits |
/// | LABEL_TIMEZONE | America/Argentina/Buenos_Aires | Stamped onto labels |
/// | LOG_LEVEL | info | trace \| debug \| info \| warn \| error |
/// | LOG_DIR | (unset) | Daily-rolling log files when set |
///
/// # Example
///
/// ```ignore
/// SUPABASE_URL=https://xyz.supabase.co SUPABASE_KEY=... cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Project REST endpoint, e.g. https://xyz.supabase.co
    pub supabase_url: String,
    /// API key sent as `apikey` header and bearer token
    pub supabase_key: String,
    /// Directory holding counters, journals and notices
    pub work_dir: PathBuf,
    /// Directory holding `.prn` ZPL templates
    pub template_dir: PathBuf,
    /// Transport used for both printers
    pub printer_transport: PrinterTransport,
    /// Small-stock target: queue name, host:port or device path
    pub printer_small: String,
    /// Large-stock target
    pub printer_large: String,
    /// This station's id, prefixed into every barcode
    pub machine_id: String,
    /// Labels admitted per fixed hourly window
    pub hourly_label_limit: u32,
    /// Pause between polling cycles
    pub poll_interval: Duration,
    /// Jobs fetched per cycle
    pub fetch_limit: usize,
    /// Dispatch attempts per label unit
    pub dispatch_attempts: u32,
    /// Upper bound on one dispatch attempt
    pub dispatch_timeout: Duration,
    /// Pause between dispatch attempts
    pub dispatch_retry_delay: Duration,
    /// Reconnect attempts against the job source
    pub connect_retries: u32,
    /// Pause between reconnect attempts
    pub connect_retry_delay: Duration,
    /// State write-back attempts per job
    pub update_retries: u32,
    /// Pause between write-back attempts
    pub update_retry_delay: Duration,
    /// Whole-cycle failures tolerated before the extended backoff
    pub max_consecutive_failures: u32,
    /// Extended backoff after repeated cycle failures
    pub critical_backoff: Duration,
    /// Pause between jobs inside one cycle
    pub inter_job_delay: Duration,
    /// Idle cycles between heartbeat log lines (0 disables)
    pub idle_heartbeat_cycles: u32,
    /// Whether the periodic template audit runs
    pub template_audit: bool,
    /// Polling cycles between template audits
    pub audit_interval_cycles: u32,
    /// Timezone stamped onto labels and journal lines
    pub label_timezone: Tz,
    /// Log level for the tracing subscriber
    pub log_level: String,
    /// Optional directory for daily-rolling log files
    pub log_dir: Option<String>,
}

impl Default for Config {
    /// Production defaults with empty credentials; tests override paths
    fn default() -> Self {
        let work_dir = PathBuf::from("/home/gst3d");
        Self {
            supabase_url: String::new(),
            supabase_key: String::new(),
            template_dir: work_dir.join("etiquetas"),
            work_dir,
            printer_transport: PrinterTransport::Spooler,
            printer_small: "ZebraZD420".to_string(),
            printer_large: "ZebraZD420_Grande".to_string(),
            machine_id: "02".to_string(),
            hourly_label_limit: 100,
            poll_interval: Duration::from_millis(5000),
            fetch_limit: 10,
            dispatch_attempts: 3,
            dispatch_timeout: Duration::from_millis(30000),
            dispatch_retry_delay: Duration::from_millis(2000),
            connect_retries: 5,
            connect_retry_delay: Duration::from_millis(10000),
            update_retries: 3,
            update_retry_delay: Duration::from_millis(2000),
            max_consecutive_failures: 5,
            critical_backoff: Duration::from_millis(30000),
            inter_job_delay: Duration::from_millis(1000),
            idle_heartbeat_cycles: 60,
            template_audit: true,
            audit_interval_cycles: 100,
            label_timezone: chrono_tz::America::Argentina::Buenos_Aires,
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Only the source credentials are required; everything else falls
    /// back to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::MissingVar("SUPABASE_URL"))?
            .trim_end_matches('/')
            .to_string();
        config.supabase_key =
            std::env::var("SUPABASE_KEY").map_err(|_| ConfigError::MissingVar("SUPABASE_KEY"))?;
        if config.supabase_url.is_empty() {
            return Err(ConfigError::MissingVar("SUPABASE_URL"));
        }
        if config.supabase_key.is_empty() {
            return Err(ConfigError::MissingVar("SUPABASE_KEY"));
        }

        if let Ok(dir) = std::env::var("WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
            config.template_dir = config.work_dir.join("etiquetas");
        }
        if let Ok(dir) = std::env::var("TEMPLATE_DIR") {
            config.template_dir = PathBuf::from(dir);
        }
        if let Ok(transport) = std::env::var("PRINTER_TRANSPORT") {
            config.printer_transport = transport.parse()?;
        }
        if let Ok(tz) = std::env::var("LABEL_TIMEZONE") {
            config.label_timezone = tz.parse().map_err(|_| ConfigError::InvalidValue {
                var: "LABEL_TIMEZONE",
                value: tz,
            })?;
        }

        config.printer_small = env_or("PRINTER_SMALL", &config.printer_small);
        config.printer_large = env_or("PRINTER_LARGE", &config.printer_large);
        config.machine_id = env_or("MACHINE_ID", &config.machine_id);
        config.log_level = env_or("LOG_LEVEL", &config.log_level);
        config.log_dir = std::env::var("LOG_DIR").ok();

        config.hourly_label_limit = env_parse("HOURLY_LABEL_LIMIT", config.hourly_label_limit);
        config.fetch_limit = env_parse("FETCH_LIMIT", config.fetch_limit);
        config.dispatch_attempts = env_parse("DISPATCH_ATTEMPTS", config.dispatch_attempts);
        config.connect_retries = env_parse("CONNECT_RETRIES", config.connect_retries);
        config.update_retries = env_parse("UPDATE_RETRIES", config.update_retries);
        config.max_consecutive_failures =
            env_parse("MAX_CONSECUTIVE_FAILURES", config.max_consecutive_failures);
        config.idle_heartbeat_cycles =
            env_parse("IDLE_HEARTBEAT_CYCLES", config.idle_heartbeat_cycles);
        config.template_audit = env_parse("TEMPLATE_AUDIT", config.template_audit);
        config.audit_interval_cycles =
            env_parse("AUDIT_INTERVAL_CYCLES", config.audit_interval_cycles);

        config.poll_interval = env_ms("POLL_INTERVAL_MS", config.poll_interval);
        config.dispatch_timeout = env_ms("DISPATCH_TIMEOUT_MS", config.dispatch_timeout);
        config.dispatch_retry_delay =
            env_ms("DISPATCH_RETRY_DELAY_MS", config.dispatch_retry_delay);
        config.connect_retry_delay = env_ms("CONNECT_RETRY_DELAY_MS", config.connect_retry_delay);
        config.update_retry_delay = env_ms("UPDATE_RETRY_DELAY_MS", config.update_retry_delay);
        config.critical_backoff = env_ms("CRITICAL_BACKOFF_MS", config.critical_backoff);
        config.inter_job_delay = env_ms("INTER_JOB_DELAY_MS", config.inter_job_delay);

        Ok(config)
    }

    // File names under the work dir are pinned: an in-place upgrade of the
    // deployment keeps the running ticket sequence, the open hour window
    // and the journals other tooling tails.

    /// Rate-window state file: admission count plus window start
    pub fn window_file(&self) -> PathBuf {
        self.work_dir.join("estado_contador.txt")
    }

    /// Ticket counter file: a single integer
    pub fn ticket_file(&self) -> PathBuf {
        self.work_dir.join("contador_id_numero.txt")
    }

    /// Per-unit attempt journal (JSONL)
    pub fn attempts_file(&self) -> PathBuf {
        self.work_dir.join("etiquetas_log.json")
    }

    /// Missing-template notification log
    pub fn notices_file(&self) -> PathBuf {
        self.work_dir.join("notificaciones_prn.log")
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
