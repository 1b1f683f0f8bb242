use std::{future::Future, io, net::SocketAddr};

use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    http::{json_response, read_request},
    responder::Responder,
};

/// Accepts connections one at a time and answers each of them with the
/// body produced by the [Responder].
pub struct Server<R> {
    listener: TcpListener,
    responder: R,
    config: Config,
}

impl<R: Responder> Server<R> {
    pub fn new(listener: TcpListener, responder: R, config: Config) -> Server<R> {
        Server {
            listener,
            responder,
            config,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Every connection is fully handled before the next accept, so a
    /// connection in progress is finished before shutdown is noticed.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            mut responder,
            config,
        } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Shutdown requested, leaving the accept loop");
                    return;
                }
                result = listener.accept() => match result {
                    Ok((mut stream, peer)) => {
                        handle_connection(&mut responder, &config, &mut stream, peer).await;
                    }
                    Err(e) => warn!("Error accepting connection. {e}"),
                }
            }
        }
    }
}

/// Reads the request, builds the response and writes it back. Failures
/// are logged and end the connection, they never stop the server.
async fn handle_connection<R: Responder>(
    responder: &mut R,
    config: &Config,
    stream: &mut TcpStream,
    peer: SocketAddr,
) {
    let request_id = Uuid::new_v4();
    trace!("Accepted connection, peer={peer}, request_id={request_id}");

    // A silent or broken client is answered as an empty request.
    let request = match timeout(config.read_timeout(), read_request(stream)).await {
        Ok(Ok(request)) => {
            trace!(
                "Successfully read request, size={}, request_id={request_id}",
                request.len()
            );
            request
        }
        Ok(Err(e)) => {
            debug!("Unable to read request, request_id={request_id}, error={e}");
            Vec::new()
        }
        Err(e) => {
            debug!("Read request timed out, request_id={request_id}, error={e}");
            Vec::new()
        }
    };

    let response = json_response(&responder.respond(&request));

    match timeout(config.write_timeout(), stream.write_all(response.as_bytes())).await {
        Ok(Ok(())) => info!(
            "{} request answered, peer={peer}, request_id={request_id}",
            responder.name()
        ),
        Ok(Err(e)) => {
            debug!("Unable to send response to the client, request_id={request_id}, error={e}")
        }
        Err(e) => debug!("Write response timed out, request_id={request_id}, error={e}"),
    }
}
