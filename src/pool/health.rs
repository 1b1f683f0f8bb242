use std::{io, net::SocketAddr, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::http::{CRLF, HTTP_VERSION};

use super::config::PoolConfig;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Timeout connecting to the process")]
    ConnectTimeout,
    #[error("Unable to connect to the process. {0}")]
    Connect(io::Error),
    #[error("Timeout sending the health check request")]
    WriteTimeout,
    #[error("Unable to send the health check request. {0}")]
    Write(io::Error),
    #[error("Timeout reading the health check response")]
    ReadTimeout,
    #[error("Unable to read the health check response. {0}")]
    Read(io::Error),
    #[error("Unexpected health check response {0:?}")]
    UnexpectedResponse(String),
}

/// Timeouts applied to every step of a health check.
#[derive(Debug, Clone, Copy)]
pub struct HealthCheck {
    pub connection_timeout: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl HealthCheck {
    pub fn from_config(config: &PoolConfig) -> HealthCheck {
        HealthCheck {
            connection_timeout: Duration::from_millis(config.connection_timeout as u64),
            write_timeout: Duration::from_millis(config.write_timeout as u64),
            read_timeout: Duration::from_millis(config.read_timeout as u64),
        }
    }

    /// Sends `GET /?q=<query>` to `addr` and expects a `200` status line.
    pub async fn check(&self, addr: SocketAddr, query: &str) -> Result<(), HealthError> {
        let mut stream = match timeout(self.connection_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result.map_err(HealthError::Connect)?,
            Err(_) => return Err(HealthError::ConnectTimeout),
        };

        let request = format!("GET /?q={query} {HTTP_VERSION}{CRLF}{CRLF}");
        match timeout(self.write_timeout, stream.write_all(request.as_bytes())).await {
            Ok(result) => result.map_err(HealthError::Write)?,
            Err(_) => return Err(HealthError::WriteTimeout),
        }

        // Enough for "HTTP/1.1 200".
        let mut buf = [0_u8; 12];
        match timeout(self.read_timeout, stream.read_exact(&mut buf)).await {
            Ok(result) => {
                result.map_err(HealthError::Read)?;
            }
            Err(_) => return Err(HealthError::ReadTimeout),
        }

        let response = String::from_utf8_lossy(&buf);
        let ok_response = format!("{HTTP_VERSION} 200");
        if response.starts_with(&ok_response) {
            Ok(())
        } else {
            Err(HealthError::UnexpectedResponse(response.into_owned()))
        }
    }
}
