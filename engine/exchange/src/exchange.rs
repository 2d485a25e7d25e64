//! Top-level coordinator: listener, accept loop, and engine-thread lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use protocol::{Id, MAX_CONNECTIONS};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::{spawn_connection, ClientHandle};
use crate::engine::EngineCore;
use crate::error::ExchangeResult;
use crate::event_log::BinaryEventLogger;

#[derive(Debug, Clone, Default)]
pub struct ExchangeConfig {
    /// Listening port; 0 lets the OS pick (used by tests).
    pub port: u16,
    /// Enables the binary event log when set.
    pub log_dir: Option<PathBuf>,
}

pub struct Exchange {
    running: Arc<AtomicBool>,
    engine: Option<std::thread::JoinHandle<()>>,
    accept: tokio::task::JoinHandle<()>,
    local_addr: SocketAddr,
}

impl Exchange {
    /// Bind the listener, start the engine thread and the accept loop.
    pub async fn bind(config: ExchangeConfig) -> ExchangeResult<Exchange> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;

        let event_log = match &config.log_dir {
            Some(dir) => Some(BinaryEventLogger::create(dir)?),
            None => None,
        };

        let (registration_tx, registration_rx) = mpsc::channel::<ClientHandle>();
        let running = Arc::new(AtomicBool::new(true));

        let engine = {
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("engine".into())
                .spawn(move || EngineCore::new(registration_rx, running, event_log).run())?
        };
        let accept = tokio::spawn(accept_loop(listener, registration_tx, Arc::clone(&running)));

        info!(%local_addr, "exchange listening");
        Ok(Exchange { running, engine: Some(engine), accept, local_addr })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Graceful shutdown: stop accepting, join the engine thread. Pending
    /// inbound frames are dropped; per-client teardown happens when the
    /// engine state is released.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.accept.abort();
        if let Some(engine) = self.engine.take() {
            if engine.join().is_err() {
                warn!("engine thread panicked during shutdown");
            }
        }
        info!("exchange stopped");
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    registration_tx: mpsc::Sender<ClientHandle>,
    running: Arc<AtomicBool>,
) {
    let mut next_connection_id: Id = 0;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                if next_connection_id as usize >= MAX_CONNECTIONS {
                    warn!(%peer, "connection table exhausted, refusing client");
                    continue;
                }
                let connection_id = next_connection_id;
                next_connection_id += 1;

                if let Err(e) = stream.set_nodelay(true) {
                    warn!(connection_id, error = %e, "set_nodelay failed");
                }
                let handle = spawn_connection(stream, connection_id);
                info!(connection_id, %peer, "client connected");
                if registration_tx.send(handle).is_err() {
                    warn!("engine thread gone, stopping accept loop");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                if !running.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }
}
