//! Local request server over a Unix socket.
//!
//! The server is organized into separate concerns:
//! - `types`: request and response wire types
//! - `handler`: validation and routing to the RAG engine and tools
//! - `transport`: socket lifecycle and JSON-lines framing

mod handler;
mod transport;
mod types;

pub use handler::{RequestHandler, MAX_QUERY_CHARS, MAX_TOP_K};
pub use transport::{TransportError, UnixSocketTransport};
pub use types::{QueryResponse, QueryResult, Request, Response, StatsConfig, StatsResponse};

use crate::rag::RagEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Serves query, stats, context and tool requests from local clients.
pub struct Server {
    handler: Arc<RequestHandler>,
    transport: UnixSocketTransport,
}

impl Server {
    /// Creates a server on the socket path from the engine's configuration.
    pub fn new(engine: RagEngine) -> Self {
        let socket_path = PathBuf::from(&engine.config().server.socket_path);
        Self::with_socket_path(engine, socket_path)
    }

    pub fn with_socket_path(engine: RagEngine, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(engine)),
            transport: UnixSocketTransport::new(socket_path),
        }
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Accepts connections until Ctrl-C, then removes the socket file.
    pub async fn start(&self) -> Result<(), TransportError> {
        let listener = self.transport.bind().await?;
        info!(socket = %self.transport.socket_path().display(), "server listening");

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = transport::serve_connection(stream, &handler).await {
                            warn!(error = %e, "connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutting down");
                    self.transport.cleanup();
                    break;
                }
            }
        }

        Ok(())
    }
}
