use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use circadian_sync::cli::Cli;
use circadian_sync::config::{JobConfig, SyncConfig, TransportKind};
use circadian_sync::{discover, DailyTransferClient, Transport, UploadCallbacks};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .clone()
        .or_else(SyncConfig::default_path)
        .context("Cannot determine configuration directory, pass --config")?;
    let config = SyncConfig::load(&config_path)?;
    let jobs: Vec<JobConfig> = config
        .select_jobs(&cli.jobs)?
        .into_iter()
        .cloned()
        .collect();

    if cli.list {
        return list_jobs(&jobs);
    }

    let abort = Arc::new(AtomicBool::new(false));
    let signal_flag = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let ok = tokio::task::spawn_blocking(move || run_jobs(&config, &jobs, abort))
        .await
        .context("Upload task panicked")??;

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn list_jobs(jobs: &[JobConfig]) -> Result<()> {
    let now = chrono::Local::now().naive_local();
    for job in jobs {
        let options = job.options(&Default::default());
        let mut discovery = discover(&job.src_path(), &job.pattern()?, options.variant)
            .with_context(|| format!("Job {}", job.name))?;
        for rejected in &discovery.rejected {
            warn!("{}: {}", job.name, rejected);
        }
        discovery.retain_eligible(now, options.grace_period);

        println!("{} ({} {}):", job.name, discovery.units.len(), options.variant);
        for unit in &discovery.units {
            println!("  {}", unit.label());
        }
    }
    Ok(())
}

fn run_jobs(config: &SyncConfig, jobs: &[JobConfig], abort: Arc<AtomicBool>) -> Result<bool> {
    match config.remote.transport {
        TransportKind::Local => {
            let transport = circadian_sync::LocalTransport::new();
            run_batches(&transport, config, jobs, &abort)
        }
        #[cfg(feature = "ssh")]
        TransportKind::Ssh => {
            let remote = &config.remote;
            let host = remote.host.as_deref().unwrap_or_default();
            let transport = circadian_sync::transport::SshTransport::connect(
                host,
                remote.port,
                &remote.user(),
                &remote.credential(),
            )?;
            let ok = run_batches(&transport, config, jobs, &abort)?;
            transport.close()?;
            Ok(ok)
        }
        #[cfg(not(feature = "ssh"))]
        TransportKind::Ssh => {
            anyhow::bail!("Built without the `ssh` feature; use transport = \"local\"")
        }
    }
}

fn run_batches<T: Transport>(
    transport: &T,
    config: &SyncConfig,
    jobs: &[JobConfig],
    abort: &Arc<AtomicBool>,
) -> Result<bool> {
    let mut ok = true;

    for job in jobs {
        if abort.load(Ordering::SeqCst) {
            break;
        }

        let info_name = job.name.clone();
        let error_name = job.name.clone();
        let abort_flag = abort.clone();
        let callbacks = UploadCallbacks::default()
            .with_pattern(job.pattern()?)
            .with_log_info(move |msg| info!(job = %info_name, "{}", msg))
            .with_log_error(move |msg| error!(job = %error_name, "{}", msg))
            .with_abort_check(move || abort_flag.load(Ordering::SeqCst));

        let client = DailyTransferClient::new(
            transport,
            job.src_path(),
            &job.dst,
            job.options(&config.remote),
            callbacks,
        );

        match client.run() {
            Ok(report) => {
                info!(
                    job = %job.name,
                    "{} succeeded, {} failed{}",
                    report.succeeded(),
                    report.failed(),
                    if report.aborted() { ", aborted" } else { "" }
                );
                ok &= report.is_success();
                if report.aborted() {
                    break;
                }
            }
            Err(e) => {
                error!(job = %job.name, "{}", e);
                ok = false;
            }
        }
    }

    Ok(ok)
}
