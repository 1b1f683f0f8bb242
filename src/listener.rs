use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid host {0} in the configuration")]
    InvalidHost(String),
    #[error("Socket creation failed. {0}")]
    Socket(std::io::Error),
    #[error("Setsockopt failed. {0}")]
    ReuseAddress(std::io::Error),
    #[error("Bind failed. {0}")]
    Bind(std::io::Error),
    #[error("Listen failed. {0}")]
    Listen(std::io::Error),
    #[error("Unable to register the listener with the runtime. {0}")]
    Register(std::io::Error),
}

/// Creates the listening socket for `port` on the configured host, with
/// `SO_REUSEADDR` enabled and the configured backlog.
pub fn bind(config: &Config, port: u16) -> Result<TcpListener, ServerError> {
    let ip: IpAddr = config
        .host
        .parse()
        .map_err(|_| ServerError::InvalidHost(config.host.clone()))?;
    let addr = SocketAddr::new(ip, port);
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket =
        Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(ServerError::Socket)?;
    socket
        .set_reuse_address(true)
        .map_err(ServerError::ReuseAddress)?;
    socket.bind(&addr.into()).map_err(ServerError::Bind)?;
    socket
        .listen(config.backlog)
        .map_err(ServerError::Listen)?;
    socket
        .set_nonblocking(true)
        .map_err(ServerError::Register)?;

    TcpListener::from_std(socket.into()).map_err(ServerError::Register)
}
