//! End-to-end worker flows against in-memory printers and job source
//!
//! Covers the contract the remote queue relies on: all-units-or-error
//! terminal states, ticket consumption only on successful dispatch,
//! missing-template notices, hourly admission, write-back retries, and
//! loop behavior under repeated failures.

use async_trait::async_trait;
use label_worker::{
    ColorCatalog, Config, CounterStore, JobSource, JobState, LabelRenderer, PrintDispatcher,
    PrintJob, PrintJournal, PrintWorker, RateLimiter, SourceResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zpl_printer::{PrintError, PrintResult, Printer};

const TEMPLATE: &str = "^XA\n^FO10,10^A0N,20,20^FDSTATIC^FS\n^XZ\n";

/// Shared view into a mock printer: payloads delivered, attempts made,
/// and a queue of scripted failures consumed one per attempt.
#[derive(Clone, Default)]
struct PrinterProbe {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    attempts: Arc<AtomicU32>,
    failures: Arc<Mutex<VecDeque<bool>>>,
}

impl PrinterProbe {
    fn failing_next(&self, n: u32) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..n {
            failures.push_back(true);
        }
    }

    fn printed(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn payload(&self, index: usize) -> String {
        String::from_utf8(self.payloads.lock().unwrap()[index].clone()).unwrap()
    }
}

struct MockPrinter {
    probe: PrinterProbe,
}

#[async_trait]
impl Printer for MockPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        self.probe.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .probe
            .failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(PrintError::Connection("scripted failure".into()));
        }
        self.probe.payloads.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn is_online(&self) -> bool {
        true
    }
}

/// In-memory job source: batches are handed out once, updates and
/// reconnects are recorded, update failures can be scripted.
#[derive(Clone, Default)]
struct MockJobSource {
    queue: Arc<Mutex<VecDeque<Vec<PrintJob>>>>,
    updates: Arc<Mutex<Vec<(i64, JobState)>>>,
    update_attempts: Arc<AtomicU32>,
    failing_updates: Arc<AtomicU32>,
    reconnects: Arc<AtomicU32>,
    catalog: Arc<Mutex<ColorCatalog>>,
}

impl MockJobSource {
    fn push_batch(&self, jobs: Vec<PrintJob>) {
        self.queue.lock().unwrap().push_back(jobs);
    }

    fn updates(&self) -> Vec<(i64, JobState)> {
        self.updates.lock().unwrap().clone()
    }

    fn update_attempts(&self) -> u32 {
        self.update_attempts.load(Ordering::SeqCst)
    }

    fn fail_updates(&self, n: u32) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn set_catalog(&self, value: serde_json::Value) {
        *self.catalog.lock().unwrap() = serde_json::from_value(value).unwrap();
    }
}

#[async_trait]
impl JobSource for MockJobSource {
    async fn fetch_pending(&mut self, _limit: u32) -> Vec<PrintJob> {
        self.queue.lock().unwrap().pop_front().unwrap_or_default()
    }

    async fn update_state(&mut self, job_id: i64, state: JobState) -> SourceResult<()> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_updates.load(Ordering::SeqCst) > 0 {
            self.failing_updates.fetch_sub(1, Ordering::SeqCst);
            return Err(label_worker::SourceError::Unreachable { attempts: 1 });
        }
        self.updates.lock().unwrap().push((job_id, state));
        Ok(())
    }

    async fn probe(&mut self) -> bool {
        true
    }

    async fn reconnect(&mut self) -> SourceResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_color_catalog(&mut self) -> SourceResult<ColorCatalog> {
        Ok(self.catalog.lock().unwrap().clone())
    }
}

struct Harness {
    worker: PrintWorker,
    source: MockJobSource,
    small: PrinterProbe,
    large: PrinterProbe,
    config: Config,
    _dir: TempDir,
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.work_dir = dir.path().to_path_buf();
    config.template_dir = dir.path().join("etiquetas");
    config.machine_id = "02".to_string();
    config.poll_interval = Duration::from_millis(10);
    config.inter_job_delay = Duration::ZERO;
    config.dispatch_timeout = Duration::from_secs(1);
    config.dispatch_retry_delay = Duration::ZERO;
    config.update_retry_delay = Duration::ZERO;
    config.critical_backoff = Duration::from_millis(5);
    config.template_audit = false;
    config.audit_interval_cycles = 10_000;
    config.idle_heartbeat_cycles = 0;
    config
}

fn build_harness_with(tweak: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);
    std::fs::create_dir_all(&config.template_dir).unwrap();

    let counters = CounterStore::new(config.window_file(), config.ticket_file());
    let limiter = RateLimiter::from_store("test", config.hourly_label_limit, &counters);
    let journal = PrintJournal::new(
        config.attempts_file(),
        config.notices_file(),
        config.label_timezone,
    );
    let renderer = LabelRenderer::new(
        config.template_dir.clone(),
        config.machine_id.clone(),
        config.label_timezone,
    );

    let small = PrinterProbe::default();
    let large = PrinterProbe::default();
    let dispatcher = PrintDispatcher::with_printers(
        Box::new(MockPrinter {
            probe: small.clone(),
        }),
        Box::new(MockPrinter {
            probe: large.clone(),
        }),
        &config,
    );

    let source = MockJobSource::default();
    let worker = PrintWorker::new(
        config.clone(),
        Box::new(source.clone()),
        renderer,
        dispatcher,
        limiter,
        counters,
        journal,
    );

    Harness {
        worker,
        source,
        small,
        large,
        config,
        _dir: dir,
    }
}

fn build_harness() -> Harness {
    build_harness_with(|_| {})
}

fn write_template(config: &Config, name: &str) {
    std::fs::write(config.template_dir.join(name), TEMPLATE).unwrap();
}

fn job(id: i64, small_qty: u32, large_qty: u32) -> PrintJob {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "maquina_id": 7,
        "tipo_material": "PLA",
        "etiqueta_chica": "AZUL",
        "etiqueta_grande": "AZUL_GRANDE",
        "operador": "Maria",
        "cantidad_chicas": small_qty,
        "cantidad_grandes": large_qty,
        "estado": "pendiente"
    }))
    .unwrap()
}

#[tokio::test]
async fn test_job_prints_every_unit_and_lands_printed() {
    let mut h = build_harness();
    write_template(&h.config, "AZUL.prn");

    let state = h.worker.process_job(&job(1, 3, 0)).await.unwrap();

    assert_eq!(state, JobState::Printed);
    assert_eq!(h.small.printed(), 3);
    assert_eq!(h.large.printed(), 0);
    assert_eq!(h.source.updates(), vec![(1, JobState::Printed)]);

    // One journal record per unit, tickets issued in sequence
    let log = std::fs::read_to_string(h.config.attempts_file()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(first["id_numero"], "0000000001");
    assert_eq!(last["id_numero"], "0000000003");
    assert_eq!(first["codigo_barra"], "02-PLA-AZUL-0000000001");
    assert_eq!(first["tipo"], "PLA");
    assert_eq!(first["cantidad"], 3);
    assert_eq!(first["operador"], "Maria");
}

#[tokio::test]
async fn test_both_formats_share_the_ticket_sequence() {
    let mut h = build_harness();
    write_template(&h.config, "AZUL.prn");
    write_template(&h.config, "AZUL_GRANDE.prn");

    let state = h.worker.process_job(&job(1, 2, 1)).await.unwrap();

    assert_eq!(state, JobState::Printed);
    assert_eq!(h.small.printed(), 2);
    assert_eq!(h.large.printed(), 1);

    // Small units burn tickets 1 and 2, the large unit gets 3, and the
    // large barcode drops the _GRANDE suffix
    assert!(h.large.payload(0).contains("^FD02-PLA-AZUL-0000000003^FS"));

    let log = std::fs::read_to_string(h.config.attempts_file()).unwrap();
    let records: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["tipo_etiqueta"], "grande");
    assert_eq!(records[2]["color"], "AZUL_GRANDE");
}

#[tokio::test]
async fn test_missing_template_notices_once_and_dispatches_nothing() {
    let mut h = build_harness();

    let state = h.worker.process_job(&job(5, 2, 0)).await.unwrap();

    assert_eq!(state, JobState::Error);
    assert_eq!(h.small.attempts(), 0);
    assert_eq!(h.source.updates(), vec![(5, JobState::Error)]);

    let notices = std::fs::read_to_string(h.config.notices_file()).unwrap();
    let lines: Vec<&str> = notices.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("ARCHIVO PRN FALTANTE: AZUL (chica) - PLA"));

    // No units dispatched, so nothing journaled
    assert!(!h.config.attempts_file().exists());
}

#[tokio::test]
async fn test_failed_unit_keeps_its_ticket_and_job_lands_error() {
    let mut h = build_harness();
    write_template(&h.config, "AZUL.prn");
    // First unit exhausts all three dispatch attempts
    h.small.failing_next(3);

    let state = h.worker.process_job(&job(2, 2, 0)).await.unwrap();

    assert_eq!(state, JobState::Error);
    assert_eq!(h.small.attempts(), 4);
    assert_eq!(h.small.printed(), 1);
    assert_eq!(h.source.updates(), vec![(2, JobState::Error)]);

    // The abandoned unit never consumed a ticket: the surviving unit
    // prints with ticket 1
    let log = std::fs::read_to_string(h.config.attempts_file()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["id_numero"], "0000000001");
}

#[tokio::test]
async fn test_hourly_limit_stops_admissions_across_jobs() {
    let mut h = build_harness_with(|config| {
        config.hourly_label_limit = 2;
    });
    write_template(&h.config, "AZUL.prn");

    let state = h.worker.process_job(&job(1, 5, 0)).await.unwrap();
    assert_eq!(state, JobState::Error);
    assert_eq!(h.small.printed(), 2);

    // The window is spent; the next job prints nothing this hour
    let state = h.worker.process_job(&job(2, 1, 0)).await.unwrap();
    assert_eq!(state, JobState::Error);
    assert_eq!(h.small.printed(), 2);
    assert_eq!(
        h.source.updates(),
        vec![(1, JobState::Error), (2, JobState::Error)]
    );
}

#[tokio::test]
async fn test_write_back_exhaustion_leaves_job_pending() {
    let mut h = build_harness();
    write_template(&h.config, "AZUL.prn");
    h.source.fail_updates(3);

    let result = h.worker.process_job(&job(9, 1, 0)).await;

    assert!(result.is_err());
    // The label went out before the write-back failed: at-least-once
    assert_eq!(h.small.printed(), 1);
    assert_eq!(h.source.update_attempts(), 3);
    assert!(h.source.updates().is_empty());
}

#[tokio::test]
async fn test_write_back_recovers_within_retry_budget() {
    let mut h = build_harness();
    write_template(&h.config, "AZUL.prn");
    h.source.fail_updates(2);

    let state = h.worker.process_job(&job(9, 1, 0)).await.unwrap();

    assert_eq!(state, JobState::Printed);
    assert_eq!(h.source.update_attempts(), 3);
    assert_eq!(h.source.updates(), vec![(9, JobState::Printed)]);
}

#[tokio::test]
async fn test_loop_drains_batches_and_honors_shutdown() {
    let Harness {
        worker,
        source,
        small,
        config,
        _dir,
        ..
    } = build_harness();
    write_template(&config, "AZUL.prn");
    source.push_batch(vec![job(1, 1, 0)]);
    source.push_batch(vec![job(2, 2, 0)]);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while source.updates().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("jobs not processed in time");

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(small.printed(), 3);
    assert_eq!(
        source.updates(),
        vec![(1, JobState::Printed), (2, JobState::Printed)]
    );
}

#[tokio::test]
async fn test_repeated_cycle_failures_force_reconnect() {
    let Harness {
        worker,
        source,
        config,
        _dir,
        ..
    } = build_harness_with(|config| {
        config.poll_interval = Duration::from_millis(5);
        config.max_consecutive_failures = 2;
        config.update_retries = 1;
    });
    write_template(&config, "AZUL.prn");
    source.fail_updates(u32::MAX);
    source.push_batch(vec![job(1, 1, 0)]);
    source.push_batch(vec![job(2, 1, 0)]);
    source.push_batch(vec![job(3, 1, 0)]);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while source.reconnects() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no reconnect after repeated failures");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_startup_audit_notices_catalog_gaps() {
    let Harness {
        worker,
        source,
        config,
        _dir,
        ..
    } = build_harness_with(|config| {
        config.template_audit = true;
        config.poll_interval = Duration::from_millis(5);
    });
    write_template(&config, "AZUL.prn");
    source.set_catalog(serde_json::json!({
        "PLA": { "chica": { "AZUL": {}, "ROJO": {} } }
    }));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !config.notices_file().exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("audit produced no notice");

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let notices = std::fs::read_to_string(config.notices_file()).unwrap();
    let lines: Vec<&str> = notices.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("ARCHIVO PRN FALTANTE: ROJO (chica) - PLA"));
}
