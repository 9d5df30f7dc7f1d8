use super::{exit_codes, open_store};
use speedtrack_core::config::Settings;
use speedtrack_core::probe::command::CommandProbe;
use speedtrack_core::recorder::Recorder;
use speedtrack_core::scheduler::{RunEvent, Scheduler, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn run(settings: &Settings) -> anyhow::Result<i32> {
    let store = open_store(settings)?;
    let probe = Arc::new(CommandProbe::new(settings.speedtest_bin.clone()));
    let sched = Scheduler::start(probe, settings.probe_options(), Arc::new(SystemClock));
    let mut events = sched.subscribe();

    // a scheduler private to this process is idle, so the trigger is accepted;
    // a concurrent `serve` holds its own scheduler and is not consulted
    sched.run();
    // one-shot: no further timer runs
    sched.shutdown();

    let outcome = loop {
        match events.recv().await {
            Ok(RunEvent::Started) => continue,
            Ok(RunEvent::Succeeded(result)) => break Ok(result),
            Ok(RunEvent::Failed(err)) => break Err(err),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => anyhow::bail!("scheduler stopped before the run finished"),
        }
    };

    match outcome {
        Ok(result) => {
            let record = Recorder::new(store).persist(&result)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("speedtest failed: {err:#}");
            Ok(exit_codes::RUN_FAILED)
        }
    }
}
