mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logcollect_http::AppState;
use logcollect_logs::{
    Broadcaster, ConsoleEcho, FilterQuery, PeriodicPublisher, RingBuffer, SyslogIngestor,
};
use logcollect_syslog::{
    SyslogTcpSource, SyslogTcpSourceConfig, SyslogUdpSource, SyslogUdpSourceConfig,
    report_metrics,
};

use crate::config::{Args, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries echoed syslog lines, so diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args).context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let cancel = CancellationToken::new();
    let buffer = RingBuffer::new(config.max_log_entries);
    let broadcaster = Broadcaster::new(config.stream_queue);

    // Bind everything up front; any failure here ends the process
    let udp = SyslogUdpSource::bind(SyslogUdpSourceConfig {
        address: config.syslog_host.clone(),
        port: config.syslog_port,
        ..Default::default()
    })
    .await?;
    let tcp = SyslogTcpSource::bind(SyslogTcpSourceConfig {
        address: config.syslog_host.clone(),
        port: config.syslog_port,
        ..Default::default()
    })
    .await?;
    let http = logcollect_http::bind(&config.http_address()).await?;

    tracing::info!(
        syslog = %udp.local_addr()?,
        http = %http.local_addr()?,
        max_log_entries = config.max_log_entries,
        "syslog collector started"
    );

    let (records_tx, records_rx) = mpsc::channel(config.ingest_queue);

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(report_metrics(
        vec![("udp", udp.metrics()), ("tcp", tcp.metrics())],
        config.metrics_interval(),
        cancel.clone(),
    ));
    {
        let tx = records_tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = udp.run(tx, cancel).await {
                tracing::error!(error = %e, "syslog UDP listener failed");
            }
        });
    }
    {
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = tcp.run(records_tx, cancel).await {
                tracing::error!(error = %e, "syslog TCP listener failed");
            }
        });
    }

    let ingestor = SyslogIngestor::new(buffer.clone(), config.sev);
    tasks.spawn(ingestor.run(records_rx, cancel.clone()));

    let mut publisher = PeriodicPublisher::new(buffer.clone(), broadcaster.clone());
    if config.stdout {
        let echo = ConsoleEcho::spawn(Box::new(std::io::stdout()), config.echo_queue)
            .context("starting console echo")?;
        publisher = publisher.with_echo(echo);
    }
    tasks.spawn(publisher.run(config.publish_interval(), cancel.clone()));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl-C, shutting down"),
                Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
            }
            cancel.cancel();
        });
    }

    let state = AppState::new(
        FilterQuery::new(buffer, config.max_filter_entries),
        broadcaster,
        cancel.clone(),
    );
    let served = logcollect_http::serve(http, state).await;

    cancel.cancel();
    while tasks.join_next().await.is_some() {}

    served.context("HTTP server error")
}
