// HTTP transport to the game server.
//
// Every endpoint is a POST of a JSON body to `<base_url>/game/<name>`. Session
// cookies ride along in the client's cookie store; the CSRF token goes in the
// `x-csrf-token` header.

use async_trait::async_trait;
use avalon_core::config::ServerConfig;
use avalon_core::protocol::{
    CommandKind, GameStateResponse, MissionRequest, ProposeRequest, RevealGroup, SetupRequest,
    SetupResponse, StartRequest, VoteRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::TransportError;

const CSRF_HEADER: &str = "x-csrf-token";

/// The server's endpoints, one method per command kind.
#[async_trait]
pub trait GameTransport: Send + Sync {
    async fn join(&self) -> Result<GameStateResponse, TransportError>;

    async fn start(&self, request: &StartRequest) -> Result<GameStateResponse, TransportError>;

    async fn setup(&self, request: &SetupRequest) -> Result<SetupResponse, TransportError>;

    async fn propose(&self, request: &ProposeRequest)
        -> Result<GameStateResponse, TransportError>;

    async fn vote(&self, request: &VoteRequest) -> Result<GameStateResponse, TransportError>;

    async fn act_on_mission(
        &self,
        request: &MissionRequest,
    ) -> Result<GameStateResponse, TransportError>;

    async fn reveal(&self) -> Result<Vec<RevealGroup>, TransportError>;

    async fn fetch_state(&self) -> Result<GameStateResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    csrf_token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, csrf_token: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: csrf_token.to_string(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        Self::new(&config.base_url, &config.csrf_token)
    }

    pub fn endpoint(&self, kind: CommandKind) -> String {
        format!("{}/{}", self.base_url, kind.path())
    }

    async fn post<B, R>(&self, kind: CommandKind, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(kind);
        debug!(%kind, %url, "POST");

        let response = self
            .http
            .post(&url)
            .header(CSRF_HEADER, &self.csrf_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Body for endpoints that take no parameters.
#[derive(Serialize)]
struct Empty {}

#[async_trait]
impl GameTransport for HttpTransport {
    async fn join(&self) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::Join, &Empty {}).await
    }

    async fn start(&self, request: &StartRequest) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::Start, request).await
    }

    async fn setup(&self, request: &SetupRequest) -> Result<SetupResponse, TransportError> {
        self.post(CommandKind::Setup, request).await
    }

    async fn propose(
        &self,
        request: &ProposeRequest,
    ) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::Propose, request).await
    }

    async fn vote(&self, request: &VoteRequest) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::Vote, request).await
    }

    async fn act_on_mission(
        &self,
        request: &MissionRequest,
    ) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::Mission, request).await
    }

    async fn reveal(&self) -> Result<Vec<RevealGroup>, TransportError> {
        self.post(CommandKind::Reveal, &Empty {}).await
    }

    async fn fetch_state(&self) -> Result<GameStateResponse, TransportError> {
        self.post(CommandKind::FetchState, &Empty {}).await
    }
}
