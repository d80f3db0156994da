use anyhow::Context;
use label_worker::{
    init_logger_with_file, print_banner, Config, CounterStore, JobSource, LabelRenderer,
    PrintDispatcher, PrintJournal, PrintWorker, RateLimiter, SupabaseJobSource,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment first: .env, then config, then logging
    dotenv::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    print_banner();
    tracing::info!("🏷️ Label worker starting...");
    tracing::info!(
        source = %config.supabase_url,
        templates = %config.template_dir.display(),
        small_printer = %config.printer_small,
        large_printer = %config.printer_large,
        transport = ?config.printer_transport,
        poll_secs = config.poll_interval.as_secs(),
        hourly_limit = config.hourly_label_limit,
        "Configuration loaded"
    );

    // The work dir holds counters and journals; without it nothing is
    // durable. The template dir can show up later with the templates.
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("work dir {} not usable", config.work_dir.display()))?;
    if let Err(e) = std::fs::create_dir_all(&config.template_dir) {
        tracing::warn!(
            error = %e,
            dir = %config.template_dir.display(),
            "Template dir not created"
        );
    }

    let counters = CounterStore::new(config.window_file(), config.ticket_file());
    let limiter = RateLimiter::from_store("etiquetas", config.hourly_label_limit, &counters);
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

    let dispatcher = PrintDispatcher::from_config(&config)?;
    dispatcher.probe_targets().await;

    let mut source = SupabaseJobSource::from_config(&config)?;
    if let Err(e) = source.reconnect().await {
        tracing::warn!(error = %e, "Source not reachable yet, the worker keeps trying");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down...");
            signal_token.cancel();
        }
    });

    let worker = PrintWorker::new(
        config,
        Box::new(source),
        renderer,
        dispatcher,
        limiter,
        counters,
        journal,
    );
    worker.run(shutdown).await?;

    tracing::info!("👋 Label worker stopped");
    Ok(())
}
