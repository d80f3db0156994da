//! Print delivery with bounded retries
//!
//! One transport per label format. The retry policy lives here, not in
//! the transports: each unit gets a fixed number of attempts with a fixed
//! pause between them, and every attempt is clamped by a wall-clock
//! timeout so a hung spooler cannot stall the whole cycle.

use crate::config::{Config, PrinterTransport};
use crate::job::LabelFormat;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use zpl_printer::{DevicePrinter, NetworkPrinter, PrintError, Printer, SpoolerPrinter};

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Print failed after {attempts} attempts on '{target}'")]
    Exhausted {
        attempts: u32,
        target: String,
        #[source]
        last: PrintError,
    },

    #[error("Printer target '{target}' unusable")]
    BadTarget {
        target: String,
        #[source]
        source: PrintError,
    },
}

/// Construct the transport for one configured target
pub fn build_printer(
    transport: PrinterTransport,
    target: &str,
    attempt_timeout: Duration,
) -> DispatchResult<Box<dyn Printer>> {
    let printer: Box<dyn Printer> = match transport {
        PrinterTransport::Spooler => {
            Box::new(SpoolerPrinter::new(target).with_timeout(attempt_timeout))
        }
        PrinterTransport::Network => Box::new(
            NetworkPrinter::from_addr(target)
                .map_err(|source| DispatchError::BadTarget {
                    target: target.to_string(),
                    source,
                })?
                .with_timeout(attempt_timeout),
        ),
        PrinterTransport::Device => Box::new(DevicePrinter::new(target)),
    };
    Ok(printer)
}

/// Delivers rendered labels to the per-format printers
pub struct PrintDispatcher {
    small: Box<dyn Printer>,
    large: Box<dyn Printer>,
    small_target: String,
    large_target: String,
    attempts: u32,
    attempt_timeout: Duration,
    retry_delay: Duration,
}

impl PrintDispatcher {
    pub fn from_config(config: &Config) -> DispatchResult<Self> {
        let small = build_printer(
            config.printer_transport,
            &config.printer_small,
            config.dispatch_timeout,
        )?;
        let large = build_printer(
            config.printer_transport,
            &config.printer_large,
            config.dispatch_timeout,
        )?;
        Ok(Self::with_printers(small, large, config))
    }

    /// Wire explicit transports; tests use this with in-memory printers
    pub fn with_printers(
        small: Box<dyn Printer>,
        large: Box<dyn Printer>,
        config: &Config,
    ) -> Self {
        Self {
            small,
            large,
            small_target: config.printer_small.clone(),
            large_target: config.printer_large.clone(),
            attempts: config.dispatch_attempts.max(1),
            attempt_timeout: config.dispatch_timeout,
            retry_delay: config.dispatch_retry_delay,
        }
    }

    fn printer_for(&self, format: LabelFormat) -> (&dyn Printer, &str) {
        match format {
            LabelFormat::Small => (self.small.as_ref(), &self.small_target),
            LabelFormat::Large => (self.large.as_ref(), &self.large_target),
        }
    }

    /// Log which targets answer. Informational; an offline printer at
    /// startup is not fatal, it may come up later.
    pub async fn probe_targets(&self) {
        for format in LabelFormat::ALL {
            let (printer, target) = self.printer_for(format);
            if printer.is_online().await {
                info!(%format, target, "Printer online");
            } else {
                warn!(%format, target, "Printer not answering");
            }
        }
    }

    /// Deliver one rendered label, retrying within the attempt budget
    pub async fn dispatch(&self, format: LabelFormat, payload: &[u8]) -> DispatchResult<()> {
        let (printer, target) = self.printer_for(format);
        let mut last = None;

        for attempt in 1..=self.attempts {
            match timeout(self.attempt_timeout, printer.print(payload)).await {
                Ok(Ok(())) => {
                    debug!(%format, target, attempt, "Label dispatched");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(
                        %format,
                        target,
                        attempt,
                        total = self.attempts,
                        error = %e,
                        "Print attempt failed"
                    );
                    last = Some(e);
                }
                Err(_) => {
                    warn!(
                        %format,
                        target,
                        attempt,
                        total = self.attempts,
                        "Print attempt timed out"
                    );
                    last = Some(PrintError::Timeout(format!(
                        "no response within {:?}",
                        self.attempt_timeout
                    )));
                }
            }
            if attempt < self.attempts {
                sleep(self.retry_delay).await;
            }
        }

        Err(DispatchError::Exhausted {
            attempts: self.attempts,
            target: target.to_string(),
            last: last.unwrap_or_else(|| PrintError::Connection("no attempt made".into())),
        })
    }
}
