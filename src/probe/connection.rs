use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{
    md5_password, parse_data_row, password_message, query_message, startup_message, tags,
    terminate_message, AuthRequest, ErrorFields, MessageCodec,
};

/// A short-lived connection to one PostgreSQL node.
///
/// Opened for a single probe battery and dropped afterwards; there is no
/// pooling: each cycle owns its own connections.
pub struct NodeConnection {
    framed: Framed<TcpStream, MessageCodec>,
}

impl NodeConnection {
    /// Connect and authenticate (trust, cleartext or md5)
    pub async fn connect(
        addr: &str,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Self, ConnectionError> {
        debug!(addr = %addr, "Connecting to node");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        let mut framed = Framed::new(stream, MessageCodec);

        framed
            .send(startup_message(user, database))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        // Drive the startup flow until ReadyForQuery
        loop {
            let msg = framed
                .next()
                .await
                .ok_or(ConnectionError::Disconnected)?
                .map_err(|e| ConnectionError::Io(e.to_string()))?;

            match msg.tag {
                tags::AUTHENTICATION => {
                    let request = AuthRequest::parse(&msg.payload)
                        .ok_or_else(|| ConnectionError::Protocol("bad auth request".into()))?;
                    match request {
                        AuthRequest::Ok => {}
                        AuthRequest::CleartextPassword => {
                            framed
                                .send(password_message(password))
                                .await
                                .map_err(|e| ConnectionError::Io(e.to_string()))?;
                        }
                        AuthRequest::Md5Password { salt } => {
                            let digest = md5_password(user, password, salt);
                            framed
                                .send(password_message(&digest))
                                .await
                                .map_err(|e| ConnectionError::Io(e.to_string()))?;
                        }
                        AuthRequest::Unsupported(code) => {
                            return Err(ConnectionError::Auth(format!(
                                "unsupported authentication method {code}"
                            )));
                        }
                    }
                }
                tags::ERROR_RESPONSE => {
                    let fields = ErrorFields::parse(&msg.payload);
                    // Class 28 = invalid authorization specification
                    if fields.code.starts_with("28") {
                        return Err(ConnectionError::Auth(fields.message));
                    }
                    return Err(ConnectionError::Protocol(fields.message));
                }
                tags::PARAMETER_STATUS | tags::BACKEND_KEY_DATA | tags::NOTICE_RESPONSE => {}
                tags::READY_FOR_QUERY => break,
                other => {
                    return Err(ConnectionError::Protocol(format!(
                        "unexpected message {:?} during startup",
                        other as char
                    )));
                }
            }
        }

        debug!(addr = %addr, "Node authentication successful");
        Ok(Self { framed })
    }

    /// Run one simple-protocol query, collecting all data rows
    pub async fn simple_query(
        &mut self,
        sql: &str,
    ) -> Result<Vec<Vec<Option<String>>>, ConnectionError> {
        self.framed
            .send(query_message(sql))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut rows = Vec::new();
        let mut error: Option<ErrorFields> = None;

        // The backend always finishes the cycle with ReadyForQuery, even
        // after an error, so drain until then before reporting.
        loop {
            let msg = self
                .framed
                .next()
                .await
                .ok_or(ConnectionError::Disconnected)?
                .map_err(|e| ConnectionError::Io(e.to_string()))?;

            match msg.tag {
                tags::DATA_ROW => {
                    let row = parse_data_row(&msg.payload)
                        .ok_or_else(|| ConnectionError::Protocol("bad data row".into()))?;
                    rows.push(row);
                }
                tags::ERROR_RESPONSE => {
                    error = Some(ErrorFields::parse(&msg.payload));
                }
                tags::READY_FOR_QUERY => break,
                tags::ROW_DESCRIPTION
                | tags::COMMAND_COMPLETE
                | tags::EMPTY_QUERY_RESPONSE
                | tags::NOTICE_RESPONSE
                | tags::PARAMETER_STATUS => {}
                other => {
                    return Err(ConnectionError::Protocol(format!(
                        "unexpected message {:?} in query response",
                        other as char
                    )));
                }
            }
        }

        match error {
            Some(fields) => Err(ConnectionError::Query(fields.message)),
            None => Ok(rows),
        }
    }

    /// Run a query expected to return a single value
    pub async fn query_single_value(
        &mut self,
        sql: &str,
    ) -> Result<Option<String>, ConnectionError> {
        let rows = self.simple_query(sql).await?;
        let first = rows
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::Query(format!("no rows from: {sql}")))?;
        Ok(first.into_iter().next().flatten())
    }

    /// Polite shutdown; errors are irrelevant at this point
    pub async fn close(mut self) {
        let _ = self.framed.send(terminate_message()).await;
    }
}

/// Connection errors, classified so the prober can distinguish
/// "unreachable" from "reachable but confused"
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("connection closed by server")]
    Disconnected,
}
