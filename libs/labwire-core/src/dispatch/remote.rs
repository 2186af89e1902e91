//! Connection to a remote agent

use super::wire::{self, AgentFramed, ClientMessage, Reply, Request, ServerMessage};
use crate::error::{DispatchError, Result};
use crate::resource::Technology;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One session with an agent, bound to a single backend.
///
/// A failed exchange leaves the stream in an unknown state; the connection is
/// then marked broken and every further call fails without touching it.
pub struct AgentConnection {
    peer: String,
    framed: AgentFramed,
    request_timeout: Duration,
    broken: bool,
}

impl AgentConnection {
    /// Connect to `host:port` and attach the backend for `technology`.
    pub async fn connect(
        host: &str,
        port: u16,
        technology: &Technology,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        debug!("Connecting to agent {}", peer);

        let stream = match timeout(connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Agent {} unreachable: {}", peer, e);
                return Err(DispatchError::connection(format!(
                    "cannot connect to agent {}: {}",
                    peer, e
                )));
            }
            Err(_) => {
                warn!("Agent {} connect timeout", peer);
                return Err(DispatchError::connection(format!(
                    "connecting to agent {} timed out after {:?}",
                    peer, connect_timeout
                )));
            }
        };
        let _ = stream.set_nodelay(true);

        let mut connection = Self {
            peer,
            framed: wire::framed(stream),
            request_timeout,
            broken: false,
        };

        let attach = ClientMessage::Attach {
            resource: technology.clone(),
        };
        match connection.exchange(&attach).await? {
            ServerMessage::Attached => {
                info!("Attached {} on agent {}", technology, connection.peer);
                Ok(connection)
            }
            ServerMessage::Failed { error } => Err(error),
            other => Err(DispatchError::connection(format!(
                "agent {} answered attach with {:?}",
                connection.peer, other
            ))),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn invoke(&mut self, request: Request) -> Result<Reply> {
        match self.exchange(&ClientMessage::Invoke { request }).await? {
            ServerMessage::Reply { reply } => Ok(reply),
            ServerMessage::Failed { error } => Err(error),
            ServerMessage::Attached => Err(DispatchError::connection(format!(
                "agent {} sent an unsolicited attach confirmation",
                self.peer
            ))),
        }
    }

    /// Close the session; the agent releases the backend when it sees EOF.
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<Bytes>::close(&mut self.framed).await {
            debug!("Closing agent connection {} failed: {}", self.peer, e);
        }
        debug!("Closed agent connection {}", self.peer);
    }

    async fn exchange(&mut self, message: &ClientMessage) -> Result<ServerMessage> {
        if self.broken {
            return Err(DispatchError::connection(format!(
                "connection to agent {} is broken",
                self.peer
            )));
        }

        let frame = wire::encode(message)?;
        let framed = &mut self.framed;
        let result = timeout(self.request_timeout, async move {
            framed.send(frame).await?;
            framed.next().await.transpose()
        })
        .await;

        let failure = match result {
            Ok(Ok(Some(bytes))) => return wire::decode(&bytes),
            Ok(Ok(None)) => format!("agent {} closed the connection", self.peer),
            Ok(Err(e)) => format!("agent {} I/O error: {}", self.peer, e),
            Err(_) => format!(
                "agent {} did not answer within {:?}",
                self.peer, self.request_timeout
            ),
        };

        warn!("{}", failure);
        self.broken = true;
        Err(DispatchError::connection(failure))
    }
}

impl std::fmt::Debug for AgentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConnection")
            .field("peer", &self.peer)
            .field("broken", &self.broken)
            .finish()
    }
}
