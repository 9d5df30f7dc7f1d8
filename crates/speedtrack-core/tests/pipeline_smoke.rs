use speedtrack_core::probe::fake::FakeProbe;
use speedtrack_core::probe::{ProbeOptions, ProbeResult, ResultLink};
use speedtrack_core::recorder::Recorder;
use speedtrack_core::scheduler::{Scheduler, SystemClock};
use speedtrack_core::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn result(id: &str) -> ProbeResult {
    ProbeResult {
        timestamp: Some(chrono::Utc::now()),
        result: Some(ResultLink {
            id: Some(id.into()),
            url: None,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_runs_flow_from_probe_to_store() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let probe = Arc::new(
        FakeProbe::new()
            .succeed(result("first"))
            .fail("server busy")
            .succeed(result("first")),
    );
    let sched = Scheduler::start(probe.clone(), ProbeOptions::default(), Arc::new(SystemClock));
    let recorder = Recorder::new(store.clone()).spawn(sched.subscribe());

    for _ in 0..3 {
        assert!(sched.run());
        timeout(Duration::from_secs(5), sched.wait_idle()).await?;
    }

    sched.shutdown();
    drop(sched);
    timeout(Duration::from_secs(5), recorder).await??;

    // failure wrote nothing, the repeated id was dropped
    assert_eq!(probe.calls(), 3);
    assert_eq!(store.count()?, 1);
    Ok(())
}
