// In-process transport that replays queued replies instead of talking HTTP.
//
// Replies are queued per command kind as raw JSON and decoded on the way out,
// so they go through the same serde path as real server replies. When a
// kind's queue runs dry the last reply handed out for it is repeated. `hold`
// parks every call until `release`, for exercising in-flight behavior.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use avalon_core::protocol::{
    CommandKind, GameStateResponse, MissionRequest, ProposeRequest, RevealGroup, SetupRequest,
    SetupResponse, StartRequest, VoteRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::TransportError;
use crate::transport::GameTransport;

#[derive(Debug, Clone)]
enum Step {
    Reply(Value),
    Fail { status: u16, message: String },
}

#[derive(Default)]
struct Script {
    queued: HashMap<CommandKind, VecDeque<Step>>,
    last: HashMap<CommandKind, Step>,
    calls: Vec<(CommandKind, Value)>,
}

pub struct ScriptedTransport {
    script: Mutex<Script>,
    gate: watch::Sender<bool>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (gate, _rx) = watch::channel(false);
        Self {
            script: Mutex::new(Script::default()),
            gate,
        }
    }

    /// Queue a reply body for `kind`.
    pub fn push(&self, kind: CommandKind, reply: Value) {
        self.queue(kind, Step::Reply(reply));
    }

    /// Queue a game-state reply for `game/state`.
    pub fn push_state(&self, reply: Value) {
        self.push(CommandKind::FetchState, reply);
    }

    /// Queue a non-2xx answer for `kind`.
    pub fn push_error(&self, kind: CommandKind, status: u16, message: &str) {
        self.queue(
            kind,
            Step::Fail {
                status,
                message: message.to_string(),
            },
        );
    }

    /// Park every call until `release`.
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CommandKind> {
        self.lock().calls.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn call_count(&self, kind: CommandKind) -> usize {
        self.lock().calls.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Request bodies sent for `kind`, in order.
    pub fn requests(&self, kind: CommandKind) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queue(&self, kind: CommandKind, step: Step) {
        self.lock().queued.entry(kind).or_default().push_back(step);
    }

    async fn call<B, R>(&self, kind: CommandKind, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.lock().calls.push((kind, body));

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;

        let step = {
            let mut script = self.lock();
            let next = script.queued.get_mut(&kind).and_then(VecDeque::pop_front);
            match next {
                Some(step) => {
                    script.last.insert(kind, step.clone());
                    Some(step)
                }
                None => script.last.get(&kind).cloned(),
            }
        };

        match step {
            Some(Step::Reply(value)) => Ok(serde_json::from_value(value)?),
            Some(Step::Fail { status, message }) => Err(TransportError::Status { status, message }),
            None => Err(TransportError::Status {
                status: 503,
                message: format!("no scripted reply for {kind}"),
            }),
        }
    }
}

#[async_trait]
impl GameTransport for ScriptedTransport {
    async fn join(&self) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::Join, &Value::Null).await
    }

    async fn start(&self, request: &StartRequest) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::Start, request).await
    }

    async fn setup(&self, request: &SetupRequest) -> Result<SetupResponse, TransportError> {
        self.call(CommandKind::Setup, request).await
    }

    async fn propose(
        &self,
        request: &ProposeRequest,
    ) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::Propose, request).await
    }

    async fn vote(&self, request: &VoteRequest) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::Vote, request).await
    }

    async fn act_on_mission(
        &self,
        request: &MissionRequest,
    ) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::Mission, request).await
    }

    async fn reveal(&self) -> Result<Vec<RevealGroup>, TransportError> {
        self.call(CommandKind::Reveal, &Value::Null).await
    }

    async fn fetch_state(&self) -> Result<GameStateResponse, TransportError> {
        self.call(CommandKind::FetchState, &Value::Null).await
    }
}
