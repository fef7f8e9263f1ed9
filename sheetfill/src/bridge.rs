use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::config::MatchPolicy;
use crate::form::FormOperator;
use crate::layout::FormLayout;
use crate::platforms::PageEngine;
use crate::protocol::{OperatorRequest, OperatorResponse};
use crate::FillError;

/// What a messaging layer reports when the tab has no listener
pub const NO_RECEIVER: &str = "Receiving end does not exist";

type PendingMap = HashMap<String, oneshot::Sender<OperatorResponse>>;
type Pending = Arc<Mutex<PendingMap>>;

/// A browser tab the orchestrator can talk to
#[async_trait]
pub trait TabTarget: Send + Sync {
    /// Deliver a request to the tab's operator and wait up to `timeout` for
    /// its reply
    async fn send(
        &self,
        request: OperatorRequest,
        timeout: Duration,
    ) -> Result<OperatorResponse, FillError>;

    /// Put the operator into the tab
    async fn install(&self) -> Result<(), FillError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct HostMessage {
    id: String,
    request: OperatorRequest,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostReply {
    id: String,
    response: OperatorResponse,
}

struct OperatorHost {
    sender: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl OperatorHost {
    fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// A tab backed by a [`PageEngine`] in this process
///
/// `install` starts an operator task next to the page. Requests and replies
/// cross as JSON text and are matched up by id, the same way a browser
/// extension's messages would be.
pub struct InProcessTab {
    engine: Arc<dyn PageEngine>,
    layout: FormLayout,
    match_policy: MatchPolicy,
    host: Mutex<Option<OperatorHost>>,
    pending: Pending,
    installs: AtomicUsize,
}

impl InProcessTab {
    pub fn new(engine: Arc<dyn PageEngine>, layout: FormLayout, match_policy: MatchPolicy) -> Self {
        Self {
            engine,
            layout,
            match_policy,
            host: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            installs: AtomicUsize::new(0),
        }
    }

    /// How many times an operator has actually been started
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub async fn is_installed(&self) -> bool {
        self.host.lock().await.as_ref().is_some_and(OperatorHost::is_alive)
    }

    /// Drop the operator as a page navigation would
    pub async fn reload(&self) {
        if let Some(host) = self.host.lock().await.take() {
            tracing::info!("Page reloaded, operator gone");
            host.stop();
        }
        self.pending.lock().await.clear();
    }

    fn spawn_host(&self) -> OperatorHost {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
        let operator = Arc::new(FormOperator::new(
            self.engine.clone(),
            self.layout.clone(),
            self.match_policy,
        ));

        // page side: answer pings inline, run each fill on its own task
        let host_task = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                let message = match serde_json::from_str::<HostMessage>(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Operator got invalid message: {}", e);
                        continue;
                    }
                };
                let HostMessage { id, request } = message;
                match request {
                    OperatorRequest::Ping => post_reply(&reply_tx, id, OperatorResponse::pong()),
                    OperatorRequest::FillForm { data } => {
                        let operator = operator.clone();
                        let reply_tx = reply_tx.clone();
                        tokio::spawn(async move {
                            let result = operator.fill(&data).await;
                            if let Err(e) = &result {
                                tracing::error!(id = %id, "Fill failed: {}", e);
                            }
                            post_reply(&reply_tx, id, OperatorResponse::from(result));
                        });
                    }
                }
            }
        });

        // extension side: route replies to whoever is waiting
        let pending = self.pending.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(text) = reply_rx.recv().await {
                match serde_json::from_str::<HostReply>(&text) {
                    Ok(HostReply { id, response }) => {
                        tracing::debug!(id = %id, "Bridge received reply");
                        match pending.lock().await.remove(&id) {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => tracing::warn!(id = %id, "Reply arrived after its request gave up"),
                        }
                    }
                    Err(e) => tracing::warn!("Invalid reply JSON: {}", e),
                }
            }
        });

        OperatorHost {
            sender: tx,
            tasks: vec![host_task, reader_task],
        }
    }
}

fn post_reply(reply_tx: &mpsc::UnboundedSender<String>, id: String, response: OperatorResponse) {
    match serde_json::to_string(&HostReply { id, response }) {
        Ok(text) => {
            let _ = reply_tx.send(text);
        }
        Err(e) => tracing::error!("Could not serialize reply: {}", e),
    }
}

#[async_trait]
impl TabTarget for InProcessTab {
    async fn send(
        &self,
        request: OperatorRequest,
        timeout: Duration,
    ) -> Result<OperatorResponse, FillError> {
        let sender = match self.host.lock().await.as_ref() {
            Some(host) if host.is_alive() => host.sender.clone(),
            _ => return Err(FillError::Transport(NO_RECEIVER.to_string())),
        };

        let action = request.action();
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel::<OperatorResponse>();
        self.pending.lock().await.insert(id.clone(), tx);
        let payload = serde_json::to_string(&HostMessage {
            id: id.clone(),
            request,
        })
        .map_err(|e| FillError::Transport(format!("bridge serialize: {e}")))?;

        tracing::debug!(id = %id, action, "Sending to operator");
        if sender.send(payload).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(FillError::Transport(NO_RECEIVER.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_canceled)) => Err(FillError::Transport(format!(
                "operator dropped the {action} request"
            ))),
            Err(_elapsed) => {
                let _ = self.pending.lock().await.remove(&id);
                tracing::warn!(id = %id, action, "Timed out waiting for operator reply");
                Err(FillError::Timeout(format!(
                    "no reply to {action} within {} ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn install(&self) -> Result<(), FillError> {
        let mut host = self.host.lock().await;
        if host.as_ref().is_some_and(OperatorHost::is_alive) {
            tracing::debug!("Operator already installed");
            return Ok(());
        }
        if let Some(dead) = host.take() {
            dead.stop();
        }
        *host = Some(self.spawn_host());
        let count = self.installs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(count, url = ?self.engine.url(), "Operator installed");
        Ok(())
    }
}

impl Drop for InProcessTab {
    fn drop(&mut self) {
        if let Some(host) = self.host.get_mut().take() {
            host.stop();
        }
    }
}
