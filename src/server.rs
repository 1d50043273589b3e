//! TCP Listener
//!
//! Accepts connections and spawns one session task per client.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, SessionStats, SessionSettings};
use crate::storage::{StoreFactory, StoreScope};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A bound listener plus everything a new session needs.
pub struct Server {
    listener: TcpListener,
    stores: StoreFactory,
    settings: SessionSettings,
    stats: Arc<SessionStats>,
}

impl Server {
    /// Binds to the configured address.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wraps an already-bound listener.
    pub fn from_listener(listener: TcpListener, config: &Config) -> Self {
        Self {
            listener,
            stores: StoreFactory::new(config.store_scope),
            settings: config.session_settings(),
            stats: Arc::new(SessionStats::new()),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    pub fn store_scope(&self) -> StoreScope {
        self.stores.scope()
    }

    /// Accepts connections forever. A failed accept is logged and skipped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = CommandHandler::new(self.stores.open());
                    let settings = self.settings;
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, settings, stats).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Binds and serves until the task is dropped.
pub async fn serve(config: &Config) -> io::Result<()> {
    let server = Server::bind(config).await?;
    info!(
        addr = %server.local_addr()?,
        scope = ?server.store_scope(),
        "Listening"
    );
    server.run().await;
    Ok(())
}
