use super::{Probe, ProbeOptions, ProbeResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Semaphore;

/// Scripted probe: hands out queued outcomes in order.
///
/// A gated probe holds every run until [`FakeProbe::release`] is called,
/// which lets callers observe a run in flight.
pub struct FakeProbe {
    script: Mutex<VecDeque<Result<ProbeResult, String>>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn succeed(self, result: ProbeResult) -> Self {
        self.push(Ok(result));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn push(&self, outcome: Result<ProbeResult, String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Lets `n` held runs proceed. No-op for ungated probes.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for FakeProbe {
    async fn measure(&self, _options: &ProbeOptions) -> anyhow::Result<ProbeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("fake probe script exhausted"),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
