//! Connection supervisor: keeps one transport alive against a set of
//! interchangeable servers.
//!
//! The supervisor owns the lifecycle of at most one connection run at a
//! time. It picks a server at random (skipping a per-run blacklist of
//! servers that have failed), starts a transport, consumes its state
//! transitions as messages, and on termination schedules a reconnect with
//! a doubling delay clamped to a ceiling. A successful connection resets
//! the delay to the floor. Stop is tolerated from any state and is
//! terminal.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::client::config::ClientConfig;
use crate::client::listeners::ConnectionListeners;
use crate::error::{ClientError, Result};
use crate::network::transport::{ElectrumTransport, TransportEvent};
use crate::types::ServerAddress;

/// Externally observable supervisor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Selecting,
    Connecting,
    Connected,
    Backoff,
    Stopped,
}

enum RunOutcome {
    Terminated,
    Stopped,
}

pub(crate) struct ConnectionSupervisor {
    config: ClientConfig,
    listeners: Arc<ConnectionListeners>,
    current: RwLock<Option<Arc<ElectrumTransport>>>,
    state_tx: watch::Sender<SupervisorState>,
    state_rx: watch::Receiver<SupervisorState>,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ConnectionSupervisor {
    pub(crate) fn new(config: ClientConfig, listeners: Arc<ConnectionListeners>) -> Self {
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);
        Self {
            config,
            listeners,
            current: RwLock::new(None),
            state_tx,
            state_rx,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_rx.clone()
    }

    /// The transport of the current run, if its socket is up.
    pub(crate) async fn connected_transport(&self) -> Option<Arc<ElectrumTransport>> {
        self.current.read().await.as_ref().filter(|t| t.is_running()).cloned()
    }

    /// Spawn the supervision loop. Rejected after `stop`; a second start
    /// is a no-op.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(coin = %self.config.coin.name(), "supervisor already started");
            return Ok(());
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.run().await;
        });
        Ok(())
    }

    /// Request termination: no new run is created, any pending reconnect is
    /// dropped, and the current transport is stopped. Idempotent from any
    /// state.
    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(coin = %self.config.coin.name(), "stopping connection supervisor");
        self.cancel.cancel();
        if !self.started.load(Ordering::SeqCst) {
            let _ = self.state_tx.send(SupervisorState::Stopped);
        }
    }

    fn set_state(&self, state: SupervisorState) {
        let _ = self.state_tx.send(state);
    }

    /// If every server has failed, clear the blacklist; then sample
    /// uniformly at random until a non-blacklisted server comes up.
    fn select_server(servers: &[ServerAddress], failed: &mut HashSet<ServerAddress>) -> ServerAddress {
        if failed.len() == servers.len() {
            failed.clear();
        }
        let mut rng = rand::thread_rng();
        loop {
            let candidate = &servers[rng.gen_range(0..servers.len())];
            if !failed.contains(candidate) {
                return candidate.clone();
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let coin = self.config.coin.name().to_string();
        let mut failed: HashSet<ServerAddress> = HashSet::new();
        let mut retry_delay = self.config.retry_delay_floor;

        while !self.cancel.is_cancelled() {
            self.set_state(SupervisorState::Selecting);
            let server = Self::select_server(&self.config.servers, &mut failed);

            self.set_state(SupervisorState::Connecting);
            tracing::info!(%coin, %server, "connecting");
            let transport = Arc::new(ElectrumTransport::new(
                server.clone(),
                self.config.connect_timeout,
                self.config.call_timeout,
            ));
            let mut events = transport.state_changes();
            *self.current.write().await = Some(transport.clone());
            transport.start();

            let mut connected = false;
            let outcome = loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break RunOutcome::Stopped,
                    event = events.recv() => match event {
                        Some(TransportEvent::Running) => {
                            connected = true;
                            retry_delay = self.config.retry_delay_floor;
                            self.set_state(SupervisorState::Connected);
                            tracing::info!(%coin, %server, "connected");
                            self.listeners.broadcast_connection(&server);
                        }
                        Some(TransportEvent::Terminated { .. }) | None => break RunOutcome::Terminated,
                    }
                }
            };

            *self.current.write().await = None;

            match outcome {
                RunOutcome::Stopped => {
                    transport.stop();
                    if connected {
                        self.listeners.broadcast_disconnect();
                    }
                    break;
                }
                RunOutcome::Terminated => {
                    self.listeners.broadcast_disconnect();
                    // Involuntary termination: exclude this server until the
                    // blacklist is exhausted. A user stop never lands here.
                    failed.insert(server);
                    retry_delay = (retry_delay * 2).min(self.config.retry_delay_ceiling);
                    self.set_state(SupervisorState::Backoff);
                    tracing::info!(%coin, delay = ?retry_delay, "reconnecting after backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(retry_delay) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }

        if let Some(transport) = self.current.write().await.take() {
            transport.stop();
        }
        self.set_state(SupervisorState::Stopped);
        tracing::info!(%coin, "supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<ServerAddress> {
        (0..n).map(|i| ServerAddress::new(format!("server-{i}"), 50001)).collect()
    }

    #[test]
    fn selection_skips_blacklisted_servers() {
        let servers = servers(3);
        let mut failed: HashSet<ServerAddress> =
            [servers[0].clone(), servers[2].clone()].into_iter().collect();
        for _ in 0..20 {
            let picked = ConnectionSupervisor::select_server(&servers, &mut failed);
            assert_eq!(picked, servers[1]);
        }
    }

    #[test]
    fn exhausted_blacklist_is_cleared() {
        let servers = servers(2);
        let mut failed: HashSet<ServerAddress> = servers.iter().cloned().collect();
        let picked = ConnectionSupervisor::select_server(&servers, &mut failed);
        assert!(servers.contains(&picked));
        assert!(failed.is_empty());
    }

    #[test]
    fn single_server_is_always_retried() {
        let servers = servers(1);
        let mut failed: HashSet<ServerAddress> = servers.iter().cloned().collect();
        let picked = ConnectionSupervisor::select_server(&servers, &mut failed);
        assert_eq!(picked, servers[0]);
    }
}
