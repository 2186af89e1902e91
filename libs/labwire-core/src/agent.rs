//! Agent side of remote dispatch
//!
//! Each accepted connection is one session: the first frame attaches a
//! backend through the agent's own (local) dispatch proxy, every later frame
//! is a call on that backend. When the peer goes away, or stays silent longer
//! than `session_idle_timeout`, the backend is released.

use crate::dispatch::wire::{self, AgentFramed, ClientMessage, ServerMessage};
use crate::dispatch::{BackendHandle, DispatchProxy};
use crate::error::{DispatchError, Result};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Accept sessions until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, proxy: DispatchProxy, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener
        .local_addr()
        .map_err(|e| DispatchError::connection(format!("listener has no address: {}", e)))?;
    info!("Agent listening on {}", local);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Agent on {} shutting down", local);
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let proxy = proxy.clone();
                    tokio::spawn(async move {
                        handle_session(stream, peer, proxy).await;
                    });
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    }
}

/// Serve one session to completion.
pub async fn handle_session(stream: TcpStream, peer: SocketAddr, proxy: DispatchProxy) {
    let _ = stream.set_nodelay(true);
    let idle = proxy.config().session_idle_timeout();
    let mut framed = wire::framed(stream);

    let Some(mut handle) = attach(&mut framed, peer, &proxy, idle).await else {
        return;
    };
    info!("Session {} attached {}", peer, handle.key());

    while let Some(frame) = next_frame(&mut framed, peer, idle).await {
        let response = match wire::decode::<ClientMessage>(&frame) {
            Ok(ClientMessage::Invoke { request }) => match handle.invoke(request).await {
                Ok(reply) => ServerMessage::Reply { reply },
                Err(error) => ServerMessage::Failed { error },
            },
            Ok(ClientMessage::Attach { .. }) => ServerMessage::Failed {
                error: DispatchError::lifecycle("session already has an attached backend"),
            },
            Err(error) => ServerMessage::Failed { error },
        };

        if send(&mut framed, &response).await.is_err() {
            break;
        }
    }

    handle.release().await;
    info!("Session {} closed", peer);
}

/// Next frame from the peer; None on EOF, read error or idle timeout.
async fn next_frame(
    framed: &mut AgentFramed,
    peer: SocketAddr,
    idle: Duration,
) -> Option<BytesMut> {
    match timeout(idle, framed.next()).await {
        Ok(Some(Ok(frame))) => Some(frame),
        Ok(Some(Err(e))) => {
            warn!("Session {} read error: {}", peer, e);
            None
        }
        Ok(None) => {
            debug!("Session {} closed by peer", peer);
            None
        }
        Err(_) => {
            warn!("Session {} idle for {:?}, dropping it", peer, idle);
            None
        }
    }
}

async fn attach(
    framed: &mut AgentFramed,
    peer: SocketAddr,
    proxy: &DispatchProxy,
    idle: Duration,
) -> Option<BackendHandle> {
    let frame = next_frame(framed, peer, idle).await?;

    let attached = match wire::decode::<ClientMessage>(&frame) {
        Ok(ClientMessage::Attach { resource }) => match resource.validate() {
            Ok(()) => proxy.attach_local(&resource).await,
            Err(e) => Err(e),
        },
        Ok(ClientMessage::Invoke { request }) => Err(DispatchError::lifecycle(format!(
            "{} before attach",
            request.method()
        ))),
        Err(e) => Err(e),
    };

    match attached {
        Ok(handle) => {
            if send(framed, &ServerMessage::Attached).await.is_err() {
                handle.release().await;
                return None;
            }
            Some(handle)
        }
        Err(error) => {
            warn!("Session {} attach failed: {}", peer, error);
            let _ = send(framed, &ServerMessage::Failed { error }).await;
            None
        }
    }
}

async fn send(framed: &mut AgentFramed, message: &ServerMessage) -> Result<()> {
    let frame = wire::encode(message)?;
    framed.send(frame).await.map_err(|e| {
        error!("Agent send failed: {}", e);
        DispatchError::connection(e.to_string())
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::Request;
    use crate::resource::Technology;
    use tracing_test::traced_test;

    async fn start_agent() -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let (addr, _proxy, tx) = start_agent_with(DispatchConfig::default()).await;
        (addr, tx)
    }

    async fn start_agent_with(
        config: DispatchConfig,
    ) -> (SocketAddr, DispatchProxy, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let proxy = DispatchProxy::new(config);
        tokio::spawn(serve(listener, proxy.clone(), async {
            let _ = rx.await;
        }));
        (addr, proxy, tx)
    }

    fn coil_resource() -> Technology {
        Technology::ModbusCoil(crate::resource::CoilAddress {
            host: "127.0.0.1:1502".to_string(),
            coil: 0,
            invert: false,
            write_multiple_coils: false,
        })
    }

    async fn roundtrip(framed: &mut AgentFramed, message: &ClientMessage) -> ServerMessage {
        framed.send(wire::encode(message).unwrap()).await.unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        wire::decode(&frame).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_invoke_before_attach_is_rejected() {
        let (addr, _shutdown) = start_agent().await;
        let mut framed = wire::framed(TcpStream::connect(addr).await.unwrap());

        let reply = roundtrip(
            &mut framed,
            &ClientMessage::Invoke {
                request: Request::Get,
            },
        )
        .await;
        match reply {
            ServerMessage::Failed {
                error: DispatchError::Lifecycle { message },
            } => assert_eq!(message, "get before attach"),
            other => panic!("unexpected {:?}", other),
        }

        // The session ends after a failed attach
        assert!(framed.next().await.is_none());
        assert!(logs_contain("attach failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_invalid_resource_is_rejected() {
        let (addr, _shutdown) = start_agent().await;
        let mut framed = wire::framed(TcpStream::connect(addr).await.unwrap());

        let reply = roundtrip(
            &mut framed,
            &ClientMessage::Attach {
                resource: Technology::WaveshareModbusCoil {
                    address: crate::resource::CoilAddress {
                        host: "relay-board".to_string(),
                        coil: 9,
                        invert: false,
                        write_multiple_coils: false,
                    },
                    coil_count: 8,
                },
            },
        )
        .await;
        assert!(matches!(
            reply,
            ServerMessage::Failed {
                error: DispatchError::Configuration { .. }
            }
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_second_attach_in_session() {
        let (addr, _shutdown) = start_agent().await;
        let mut framed = wire::framed(TcpStream::connect(addr).await.unwrap());
        let attach = ClientMessage::Attach {
            resource: coil_resource(),
        };

        assert_eq!(roundtrip(&mut framed, &attach).await, ServerMessage::Attached);
        assert!(matches!(
            roundtrip(&mut framed, &attach).await,
            ServerMessage::Failed {
                error: DispatchError::Lifecycle { .. }
            }
        ));

        drop(framed);
        for _ in 0..100 {
            if logs_contain("closed") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session close was never logged");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_idle_session_is_dropped() {
        let (addr, proxy, _shutdown) = start_agent_with(DispatchConfig {
            session_idle_timeout_ms: 200,
            ..Default::default()
        })
        .await;
        let mut framed = wire::framed(TcpStream::connect(addr).await.unwrap());

        let attach = ClientMessage::Attach {
            resource: coil_resource(),
        };
        assert_eq!(roundtrip(&mut framed, &attach).await, ServerMessage::Attached);
        assert_eq!(proxy.ownership().len(), 1);

        // The client keeps the socket open but never sends another frame
        let closed = tokio::time::timeout(Duration::from_secs(5), framed.next())
            .await
            .unwrap();
        assert!(closed.is_none());

        for _ in 0..100 {
            if proxy.ownership().is_empty() {
                assert!(logs_contain("idle"));
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("idle session still holds its claim");
    }
}
