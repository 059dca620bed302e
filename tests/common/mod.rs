//! Shared test helpers and scripted producer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use turnkit::prelude::*;

/// One thing a scripted producer does before returning.
#[derive(Debug, Clone)]
pub enum Step {
    Emit(EventPayload),
    Send(Event),
    Sleep(Duration),
    /// Block until cancelled.
    Hang,
}

/// A queued turn: steps to play, then the result to return.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<Step>,
    result: std::result::Result<(Response, StateBlob), String>,
}

impl Script {
    pub fn respond(response: impl Into<Response>, state: &[u8]) -> Self {
        Self {
            steps: Vec::new(),
            result: Ok((response.into(), StateBlob::new(state.to_vec()))),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            steps: Vec::new(),
            result: Err(message.to_string()),
        }
    }

    pub fn emit(mut self, payload: EventPayload) -> Self {
        self.steps.push(Step::Emit(payload));
        self
    }

    pub fn send(mut self, event: Event) -> Self {
        self.steps.push(Step::Send(event));
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.steps.push(Step::Sleep(Duration::from_millis(ms)));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }
}

/// Producer that plays queued scripts, one per turn.
#[derive(Debug, Default)]
pub struct ScriptedProducer {
    scripts: std::sync::Mutex<VecDeque<Script>>,
    requests: std::sync::Mutex<Vec<ProducerRequest>>,
    sent: AtomicUsize,
}

impl ScriptedProducer {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: std::sync::Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<ProducerRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Events the relay has accepted from this producer.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentProducer for ScriptedProducer {
    async fn run(
        &self,
        request: ProducerRequest,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Result<ProducerOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::respond("default", request.prior_state.as_bytes()));

        for step in script.steps {
            match step {
                Step::Emit(payload) => {
                    events.emit(payload).await?;
                }
                Step::Send(event) => events.send(event).await?,
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Hang => {
                    cancel.cancelled().await;
                    return Err(TurnError::Cancelled);
                }
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
        }

        match script.result {
            Ok((response, state)) => Ok(ProducerOutcome::new(response, state)),
            Err(message) => Err(TurnError::execution(message)),
        }
    }
}

pub async fn memory_history() -> Arc<HistoryStore> {
    Arc::new(
        HistoryStore::in_memory(SessionId::from("test"))
            .await
            .unwrap(),
    )
}

pub async fn orchestrator(
    producer: Arc<ScriptedProducer>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(memory_history().await, producer, config).unwrap()
}

/// Drain a turn's feed into its units and outcome, checking feed order.
pub async fn collect(mut handle: TurnHandle) -> (Vec<RenderUnit>, TurnOutcome) {
    let mut units: Vec<RenderUnit> = Vec::new();
    while let Some(item) = handle.next().await {
        match item {
            TurnFeed::Unit(unit) => {
                if let Some(last) = units.last() {
                    assert!(unit.seq > last.seq, "units out of order: {last:?} then {unit:?}");
                }
                units.push(unit);
            }
            TurnFeed::Finished(outcome) => {
                assert!(handle.next().await.is_none(), "items after the outcome");
                return (units, outcome);
            }
        }
    }
    panic!("feed closed without an outcome");
}

pub fn finals(units: &[RenderUnit]) -> Vec<RenderUnit> {
    units.iter().filter(|u| u.is_final()).cloned().collect()
}

pub fn state(bytes: &[u8]) -> StateBlob {
    StateBlob::new(bytes.to_vec())
}
