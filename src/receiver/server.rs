//! RAOP receiver: TCP listener, connection loop and lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use super::config::ReceiverConfig;
use super::events::ReceiverEvent;
use super::session::{RtspSession, SessionContext};
use super::track::CurrentTrack;
use crate::discovery::{AdvertiserConfig, RaopAdvertiser, RaopCapabilities};
use crate::error::{ReceiverError, Result};
use crate::protocol::crypto::ReceiverKey;
use crate::protocol::rtsp::RtspServerCodec;

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Receiver is stopped
    Stopped,
    /// Receiver is starting
    Starting,
    /// Receiver is running and accepting connections
    Running,
    /// Receiver is stopping
    Stopping,
}

/// AirTunes (RAOP) audio receiver
pub struct RaopReceiver {
    config: Arc<ReceiverConfig>,
    state: Arc<RwLock<ReceiverState>>,
    event_tx: broadcast::Sender<ReceiverEvent>,
    track: CurrentTrack,
    shutdown_tx: Option<watch::Sender<bool>>,
    server_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl RaopReceiver {
    /// Create a receiver with configuration
    #[must_use]
    pub fn new(config: ReceiverConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(ReceiverState::Stopped)),
            event_tx,
            track: CurrentTrack::new(),
            shutdown_tx: None,
            server_task: None,
            local_addr: None,
        }
    }

    /// Create with default configuration
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(ReceiverConfig::with_name(name))
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
        self.event_tx.subscribe()
    }

    /// Handle to the now-playing track
    #[must_use]
    pub fn current_track(&self) -> CurrentTrack {
        self.track.clone()
    }

    /// Get current state
    pub async fn state(&self) -> ReceiverState {
        *self.state.read().await
    }

    /// Address the RTSP listener is bound to, once started
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Start the receiver
    ///
    /// Loads or generates the device key, binds the RTSP listener and
    /// optionally advertises the service.
    ///
    /// # Errors
    ///
    /// Returns error if the receiver is already running, the key is invalid,
    /// the port is in use or mDNS registration fails.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        {
            let mut state = self.state.write().await;
            if *state != ReceiverState::Stopped {
                return Err(ReceiverError::AlreadyRunning);
            }
            *state = ReceiverState::Starting;
        }

        match self.launch().await {
            Ok(addr) => {
                *self.state.write().await = ReceiverState::Running;
                Ok(addr)
            }
            Err(e) => {
                *self.state.write().await = ReceiverState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<SocketAddr> {
        let key = Arc::new(load_key(&self.config).await?);

        let listener =
            TcpListener::bind(SocketAddr::new(self.config.bind_address, self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        let advertiser = if self.config.advertise {
            Some(advertise(&self.config, local_addr.port())?)
        } else {
            None
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context = SessionContext {
            config: Arc::clone(&self.config),
            key,
            events: self.event_tx.clone(),
            track: self.track.clone(),
        };

        self.server_task = Some(tokio::spawn(accept_loop(
            listener,
            context,
            shutdown_rx,
            advertiser,
            Arc::clone(&self.state),
        )));
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        info!(name = %self.config.name, %local_addr, "RAOP receiver listening");
        let _ = self.event_tx.send(ReceiverEvent::Started {
            name: self.config.name.clone(),
            port: local_addr.port(),
        });

        Ok(local_addr)
    }

    /// Stop the receiver, closing every connection
    ///
    /// # Errors
    ///
    /// Never fails at present; the signature leaves room for shutdown
    /// failures.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        *self.state.write().await = ReceiverState::Stopping;
        let _ = tx.send(true);

        if let Some(task) = self.server_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Receiver task ended abnormally");
                *self.state.write().await = ReceiverState::Stopped;
            }
        }
        self.local_addr = None;
        Ok(())
    }
}

impl std::fmt::Debug for RaopReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaopReceiver")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

async fn load_key(config: &ReceiverConfig) -> Result<ReceiverKey> {
    if let Some(pem) = &config.private_key_pem {
        return Ok(ReceiverKey::from_pem(pem)?);
    }

    warn!("No private key configured, generating one; senders will reject Apple-Response");
    tokio::task::spawn_blocking(ReceiverKey::generate)
        .await
        .map_err(|e| ReceiverError::Network(std::io::Error::other(e)))?
        .map_err(ReceiverError::from)
}

fn advertise(config: &ReceiverConfig, port: u16) -> Result<RaopAdvertiser> {
    let mut advertiser = RaopAdvertiser::new(AdvertiserConfig {
        name: config.name.clone(),
        port,
        hardware_address: config.hardware_address,
        capabilities: RaopCapabilities::default(),
    })
    .map_err(|e| ReceiverError::Advertisement(e.to_string()))?;
    advertiser
        .register()
        .map_err(|e| ReceiverError::Advertisement(e.to_string()))?;
    Ok(advertiser)
}

async fn accept_loop(
    listener: TcpListener,
    context: SessionContext,
    mut shutdown_rx: watch::Receiver<bool>,
    advertiser: Option<RaopAdvertiser>,
    state: Arc<RwLock<ReceiverState>>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            context.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept error");
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.changed() => {
                break;
            }
        }
    }

    // Connections see the same signal and reset their sessions
    while connections.join_next().await.is_some() {}

    if let Some(advertiser) = advertiser {
        advertiser.shutdown();
    }
    *state.write().await = ReceiverState::Stopped;
    let _ = context.events.send(ReceiverEvent::Stopped);
    info!("RAOP receiver stopped");
}

/// Serve one RTSP connection until it closes, fails or the receiver stops
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: SessionContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let local = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(%peer, error = %e, "Dropping connection without local address");
            return;
        }
    };

    info!(%peer, "Client connected");
    let _ = context
        .events
        .send(ReceiverEvent::ClientConnected { address: peer });

    let session = RtspSession::new(context.clone(), local, peer);
    let mut framed = Framed::new(stream, RtspServerCodec::new());

    let reason = loop {
        let frame = tokio::select! {
            frame = framed.next() => frame,
            _ = shutdown_rx.changed() => break "Receiver stopped".to_string(),
        };

        let request = match frame {
            None => break "Connection closed".to_string(),
            Some(Err(e)) => {
                warn!(%peer, error = %e, "Unreadable RTSP request");
                break format!("Invalid request: {e}");
            }
            Some(Ok(request)) => request,
        };

        match session.handle(&request).await {
            Ok(reply) => {
                if let Err(e) = framed.send(reply.response).await {
                    break format!("Write failed: {e}");
                }
                if reply.close {
                    break "Teardown".to_string();
                }
            }
            Err(e) => {
                error!(%peer, method = %request.method, error = %e, "RTSP request failed");
                if e.is_fatal() {
                    session.reset().await;
                }
                if let Err(write_err) = framed.send(RtspSession::error_response(&request)).await {
                    debug!(%peer, error = %write_err, "Failed to send error response");
                }
                break format!("Request failed: {e}");
            }
        }
    };

    session.reset().await;
    info!(%peer, %reason, "Client disconnected");
    let _ = context.events.send(ReceiverEvent::ClientDisconnected {
        address: peer,
        reason,
    });
}
