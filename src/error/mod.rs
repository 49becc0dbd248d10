use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fatal admission errors. Each one rejects the connection attempt at
/// handshake time; none of them is ever surfaced mid-connection.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing authentication token")]
    NoToken,

    #[error("authentication token mismatch")]
    AuthFailed,

    #[error("too many connections from {addr}")]
    TooManyConnections { addr: std::net::IpAddr },
}

impl AppError {
    /// Short machine-readable rejection reason. This is the only detail a
    /// client ever sees.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::NoToken => "NO_TOKEN",
            AppError::AuthFailed => "AUTH_FAILED",
            AppError::TooManyConnections { .. } => "TOO_MANY_CONNECTIONS",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NoToken | AppError::AuthFailed => StatusCode::UNAUTHORIZED,
            AppError::TooManyConnections { .. } => StatusCode::TOO_MANY_REQUESTS,
        };

        // The detailed cause stays server-side
        tracing::warn!(
            code = %self.reason(),
            status = %status.as_u16(),
            message = %self,
            "Handshake rejected"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.reason().to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Recoverable per-event failures: the offending event is dropped, the
/// connection stays open, and the client gets no feedback frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown event type `{0}`")]
    UnknownEvent(String),

    #[error("store id missing or not a string/number")]
    InvalidStoreId,

    #[error("sync payload is not an object")]
    InvalidPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(AppError::NoToken.reason(), "NO_TOKEN");
        assert_eq!(AppError::AuthFailed.reason(), "AUTH_FAILED");
        let err = AppError::TooManyConnections {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        assert_eq!(err.reason(), "TOO_MANY_CONNECTIONS");
    }
}
