//! The polling dispatch loop
//!
//! Pulls pending jobs from the source, prints every requested unit,
//! writes the terminal state back, and keeps running through any
//! failure short of shutdown. One worker instance owns the counter
//! files; running two against the same work dir corrupts the ticket
//! sequence and the hourly window.

use crate::config::Config;
use crate::counters::CounterStore;
use crate::dispatch::PrintDispatcher;
use crate::error::WorkerResult;
use crate::job::{JobState, LabelFormat, PrintJob};
use crate::journal::{PrintAttempt, PrintJournal};
use crate::limiter::RateLimiter;
use crate::render::LabelRenderer;
use crate::source::{JobSource, SourceError};
use chrono::Utc;
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one format within one job
#[derive(Debug, Clone, Copy, Default)]
struct FormatReport {
    requested: u32,
    printed: u32,
}

impl FormatReport {
    /// Vacuously true for a format the job does not use
    fn complete(&self) -> bool {
        self.printed == self.requested
    }
}

/// Polling worker that drives jobs from pending to a terminal state
pub struct PrintWorker {
    config: Config,
    source: Box<dyn JobSource>,
    renderer: LabelRenderer,
    dispatcher: PrintDispatcher,
    limiter: RateLimiter,
    counters: CounterStore,
    journal: PrintJournal,
}

impl PrintWorker {
    pub fn new(
        config: Config,
        source: Box<dyn JobSource>,
        renderer: LabelRenderer,
        dispatcher: PrintDispatcher,
        limiter: RateLimiter,
        counters: CounterStore,
        journal: PrintJournal,
    ) -> Self {
        Self {
            config,
            source,
            renderer,
            dispatcher,
            limiter,
            counters,
            journal,
        }
    }

    /// Run until the token cancels. In-flight work finishes; jobs not yet
    /// picked up stay pending for the next start.
    pub async fn run(mut self, shutdown: CancellationToken) -> WorkerResult<()> {
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            hourly_limit = self.config.hourly_label_limit,
            remaining = self.limiter.remaining(),
            "Worker loop starting"
        );

        if self.config.template_audit {
            self.run_template_audit().await;
        }

        let mut consecutive_failures: u32 = 0;
        let mut cycles: u64 = 0;
        let mut idle_cycles: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let started = Instant::now();
            cycles += 1;

            let failed_jobs = self.run_cycle(&shutdown, &mut idle_cycles).await;
            if failed_jobs > 0 {
                consecutive_failures += 1;
                warn!(
                    failed_jobs,
                    consecutive = consecutive_failures,
                    "Cycle finished with failures"
                );
            } else {
                consecutive_failures = 0;
            }

            if self.config.template_audit
                && self.config.audit_interval_cycles > 0
                && cycles % u64::from(self.config.audit_interval_cycles) == 0
            {
                self.run_template_audit().await;
            }

            if consecutive_failures >= self.config.max_consecutive_failures {
                error!(
                    consecutive = consecutive_failures,
                    backoff_secs = self.config.critical_backoff.as_secs(),
                    "Too many consecutive failed cycles, backing off"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.config.critical_backoff) => {}
                }
                if let Err(e) = self.source.reconnect().await {
                    warn!(error = %e, "Source still unreachable after backoff");
                }
                consecutive_failures = 0;
                continue;
            }

            let wait = self.config.poll_interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        info!("Worker loop stopped");
        Ok(())
    }

    /// One polling cycle. Returns how many jobs failed.
    async fn run_cycle(&mut self, shutdown: &CancellationToken, idle_cycles: &mut u32) -> u32 {
        let limit = self.config.fetch_limit as u32;
        let batch = self.source.fetch_pending(limit).await;

        if batch.is_empty() {
            *idle_cycles += 1;
            if self.config.idle_heartbeat_cycles > 0
                && *idle_cycles % self.config.idle_heartbeat_cycles == 0
            {
                info!(
                    idle_cycles = *idle_cycles,
                    remaining = self.limiter.remaining(),
                    "No pending jobs"
                );
            }
            return 0;
        }
        *idle_cycles = 0;

        info!(count = batch.len(), "Pending jobs found");
        let mut failed = 0;

        for job in &batch {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, remaining jobs stay pending");
                break;
            }
            match self.process_job(job).await {
                Ok(state) => {
                    info!(job_id = job.id, state = %state, "Job finished");
                }
                Err(e) => {
                    error!(job_id = job.id, error = %e, "Job failed");
                    failed += 1;
                }
            }
            sleep(self.config.inter_job_delay).await;
        }

        failed
    }

    /// Drive one job to a terminal state and write it back
    ///
    /// `printed` only when every participating format delivered every
    /// requested unit; anything less is `error`. The only error that
    /// escapes is a write-back that exhausted its retries; the job then
    /// stays pending remotely and will be fetched again.
    #[instrument(skip(self, job), fields(job_id = job.id))]
    pub async fn process_job(&mut self, job: &PrintJob) -> WorkerResult<JobState> {
        info!(
            machine = job.machine_id(),
            operator = job.operator(),
            material = job.material(),
            small = job.quantity(LabelFormat::Small),
            large = job.quantity(LabelFormat::Large),
            "Processing job"
        );

        let mut all_complete = true;
        for format in LabelFormat::ALL {
            let report = self.process_format(job, format).await;
            if report.requested > 0 {
                info!(
                    %format,
                    printed = report.printed,
                    requested = report.requested,
                    "Format finished"
                );
            }
            all_complete &= report.complete();
        }

        let state = if all_complete {
            JobState::Printed
        } else {
            JobState::Error
        };
        self.write_back(job.id, state).await?;
        Ok(state)
    }

    /// Print every requested unit of one format
    async fn process_format(&mut self, job: &PrintJob, format: LabelFormat) -> FormatReport {
        let requested = job.quantity(format);
        if requested == 0 {
            return FormatReport::default();
        }
        let Some(reference) = job.label_ref(format) else {
            return FormatReport::default();
        };

        // One template lookup gates the whole format: a missing template
        // produces a single notice and zero dispatches.
        if let Err(e) = self.renderer.resolve_template(reference, format) {
            warn!(job_id = job.id, %format, error = %e, "Format abandoned");
            if let Err(e) =
                self.journal
                    .notify_missing_template(reference, format, job.material(), Utc::now())
            {
                warn!(error = %e, "Missing-template notice not recorded");
            }
            return FormatReport {
                requested,
                printed: 0,
            };
        }

        let mut printed = 0;
        for unit in 1..=requested {
            if !self.limiter.admit(&self.counters) {
                warn!(
                    job_id = job.id,
                    %format,
                    issued = printed,
                    requested,
                    "Hourly label limit reached, format abandoned"
                );
                break;
            }
            match self.print_unit(job, format, unit).await {
                Ok(()) => printed += 1,
                Err(e) => {
                    error!(job_id = job.id, %format, unit, error = %e, "Unit not printed");
                }
            }
        }

        FormatReport { requested, printed }
    }

    /// Render and dispatch one unit, then advance the ticket and journal it
    async fn print_unit(
        &mut self,
        job: &PrintJob,
        format: LabelFormat,
        unit: u32,
    ) -> WorkerResult<()> {
        let ticket = match self.counters.peek_ticket() {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "Ticket counter unreadable, starting over at 1");
                1
            }
        };
        let now = Utc::now();

        let payload = self.renderer.render(job, format, ticket, now)?;
        self.dispatcher.dispatch(format, &payload).await?;

        // The label is out of the door; counter and journal problems are
        // logged but cannot un-print it.
        match self.counters.next_ticket() {
            Ok(issued) => {
                if issued != ticket {
                    warn!(issued, rendered = ticket, "Ticket sequence moved underneath us");
                }
            }
            Err(e) => warn!(error = %e, "Ticket counter not advanced"),
        }

        let reference = job.label_ref(format).unwrap_or_default();
        let attempt = PrintAttempt {
            at: self.journal.format_stamp(now),
            kind: job.material().to_string(),
            color: reference.to_string(),
            format: format.as_wire().to_string(),
            ticket: format!("{:010}", ticket),
            barcode: self.renderer.barcode_content(job, reference, ticket),
            station: self.renderer.station_id().to_string(),
            machine: job.machine_id(),
            operator: job.operator().to_string(),
            quantity: job.quantity(format),
        };
        if let Err(e) = self.journal.append_attempt(&attempt) {
            warn!(error = %e, "Print record not journaled");
        }

        debug!(job_id = job.id, %format, unit, ticket, "Unit printed");
        Ok(())
    }

    /// Write the terminal state back, bounded retries with a fixed wait
    async fn write_back(&mut self, job_id: i64, state: JobState) -> WorkerResult<()> {
        let retries = self.config.update_retries.max(1);
        let mut last = None;

        for attempt in 1..=retries {
            match self.source.update_state(job_id, state).await {
                Ok(()) => {
                    debug!(job_id, state = %state, "State written back");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        job_id,
                        attempt,
                        total = retries,
                        error = %e,
                        "State write-back failed"
                    );
                    last = Some(e);
                }
            }
            if attempt < retries {
                sleep(self.config.update_retry_delay).await;
            }
        }

        error!(job_id, state = %state, "Write-back abandoned, job stays pending remotely");
        Err(last
            .unwrap_or(SourceError::Unreachable { attempts: retries })
            .into())
    }

    /// Check every catalog color against the template directory and leave
    /// one notice per gap. Catalog fetch failures skip the audit.
    #[instrument(skip(self))]
    async fn run_template_audit(&mut self) {
        let catalog = match self.source.fetch_color_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Color catalog unavailable, audit skipped");
                return;
            }
        };
        if catalog.is_empty() {
            debug!("Color catalog empty, nothing to audit");
            return;
        }

        let mut missing = 0u32;
        for (material, format, color) in catalog.entries() {
            if self.renderer.resolve_template(color, format).is_err() {
                missing += 1;
                warn!(color, %format, material, "Catalog color has no template");
                if let Err(e) =
                    self.journal
                        .notify_missing_template(color, format, material, Utc::now())
                {
                    warn!(error = %e, "Missing-template notice not recorded");
                }
            }
        }
        if missing > 0 {
            warn!(missing, "Template audit found gaps");
        } else {
            info!("Template audit clean");
        }
    }
}
