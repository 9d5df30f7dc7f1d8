use super::{exit_codes, open_store};
use crate::cli::args::ServeArgs;
use speedtrack_core::config::Settings;
use speedtrack_core::probe::command::CommandProbe;
use speedtrack_core::recorder::Recorder;
use speedtrack_core::scheduler::{Scheduler, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub async fn run(args: ServeArgs, settings: &Settings) -> anyhow::Result<i32> {
    let store = open_store(settings)?;
    let probe = Arc::new(CommandProbe::new(settings.speedtest_bin.clone()));
    let sched = Scheduler::start(probe, settings.probe_options(), Arc::new(SystemClock));
    let recorder = Recorder::new(store).spawn(sched.subscribe());

    tracing::info!(
        event = "serve_start",
        db_path = %settings.db_path.display(),
        speedtest_bin = %settings.speedtest_bin.display(),
        next_run_at = ?sched.status().next_run_at
    );

    if args.run_now {
        sched.run();
    }

    shutdown_signal().await?;
    tracing::info!(event = "shutdown_requested", in_flight = sched.is_running());
    sched.shutdown();

    let grace = Duration::from_secs(settings.shutdown_grace_secs);
    if timeout(grace, sched.wait_idle()).await.is_err() {
        tracing::warn!(
            event = "shutdown_grace_elapsed",
            grace_secs = settings.shutdown_grace_secs,
            "abandoning in-flight speedtest"
        );
    }

    // last handle: closes the event channel so the recorder drains and exits
    drop(sched);
    match timeout(grace, recorder).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(event = "recorder_panicked", error = %e),
        Err(_) => tracing::warn!(event = "recorder_drain_timeout"),
    }

    tracing::info!(event = "serve_stop");
    Ok(exit_codes::OK)
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
