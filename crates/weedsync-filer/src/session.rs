//! Transfer sessions
//!
//! Version-delta operations run over a pair of TCP connections to the
//! filer: a line-framed control socket and a raw data socket. Each
//! operation opens a fresh pair.

use tokio::net::TcpStream;
use tracing::debug;
use weedsync_transfer::{ControlLink, Dialect, LineChannel, Operation};

use crate::FilerError;

/// Where and how to open transfer sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEndpoints {
    /// Control socket address (`host:port`)
    pub control_addr: String,
    /// Data socket address (`host:port`)
    pub data_addr: String,
    /// Control channel dialect the filer speaks
    pub dialect: Dialect,
}

/// An open control/data connection pair
pub struct TransferSession {
    pub link: ControlLink<LineChannel<TcpStream>>,
    pub data: TcpStream,
}

impl TransferEndpoints {
    pub fn new(
        control_addr: impl Into<String>,
        data_addr: impl Into<String>,
        dialect: Dialect,
    ) -> Self {
        Self {
            control_addr: control_addr.into(),
            data_addr: data_addr.into(),
            dialect,
        }
    }

    /// Connect both sockets and announce `operation`
    ///
    /// The control socket is connected first so the filer can pair the data
    /// connection with it.
    pub async fn connect(&self, operation: Operation) -> Result<TransferSession, FilerError> {
        let control = TcpStream::connect(&self.control_addr).await?;
        let data = TcpStream::connect(&self.data_addr).await?;
        data.set_nodelay(true)?;

        let mut link = ControlLink::new(LineChannel::new(control), self.dialect);
        link.open(operation).await?;

        debug!(
            control = %self.control_addr,
            data = %self.data_addr,
            ?operation,
            dialect = ?self.dialect,
            "Transfer session opened"
        );
        Ok(TransferSession { link, data })
    }
}
