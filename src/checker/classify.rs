// src/checker/classify.rs
// =============================================================================
// This module turns the low-level cause of a failed probe into one of a fixed
// set of named outcomes.
//
// The taxonomy:
// - 404              -> the final response was HTTP 404
// - RESPONSE_ERROR   -> malformed or protocol-level response failure
// - SSL_ERROR        -> TLS / certificate negotiation failed
// - CONNECTION_ERROR -> refused, DNS failure, reset, unreachable
// - TIMEOUT          -> the probe ran past its deadline
// - anything else    -> the stringified cause
//
// There is exactly one entry point, classify(), and it works by inspecting
// the error value (reqwest's flags and the std::error::Error source chain)
// instead of branching on error types at every call site.
//
// Rust concepts:
// - Enums with data: Other(String) carries the raw detail
// - Trait objects: &dyn Error for walking source() chains
// - downcast_ref: recovering a concrete io::Error from a trait object
// =============================================================================

use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::io;

/// The fixed set of per-URL probe outcomes that count as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Final status was 404
    NotFound,
    /// Malformed response, protocol failure, bad or endless redirects
    Response,
    /// TLS handshake or certificate failure
    Ssl,
    /// Connection refused, reset, DNS failure and friends
    Connection,
    /// The probe exceeded its timeout
    Timeout,
    /// Anything we could not place, with the raw cause
    Other(String),
}

impl ProbeError {
    /// The string reported to API clients under `errors.http`.
    pub fn detail(&self) -> &str {
        match self {
            ProbeError::NotFound => "404",
            ProbeError::Response => "RESPONSE_ERROR",
            ProbeError::Ssl => "SSL_ERROR",
            ProbeError::Connection => "CONNECTION_ERROR",
            ProbeError::Timeout => "TIMEOUT",
            ProbeError::Other(detail) => detail,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.detail())
    }
}

// Serialized as its plain detail string, e.g. "TIMEOUT"
impl Serialize for ProbeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.detail())
    }
}

// Why a probe did not produce a usable final response.
//
// This is internal to the checker: the prober builds one of these, and
// classify() reduces it to a ProbeError.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Failure {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("redirect target could not be resolved: {0}")]
    BadLocation(String),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("probe timed out")]
    TimedOut,
}

// Substrings that identify a TLS failure somewhere in the cause chain.
// rustls reports these through io::Error(InvalidData), so the kind alone
// is not enough.
const TLS_MARKERS: &[&str] = &["certificate", "tls", "ssl", "handshake"];

// Substrings hyper uses for responses it could not parse
const PROTOCOL_MARKERS: &[&str] = &[
    "invalid http",
    "invalid status",
    "invalid header",
    "message head is too large",
    "unexpected message",
    "chunk size",
];

// Maps a failure cause to the fixed taxonomy
pub(crate) fn classify(failure: &Failure) -> ProbeError {
    match failure {
        Failure::TimedOut => ProbeError::Timeout,
        Failure::TooManyRedirects(_) | Failure::BadLocation(_) => ProbeError::Response,
        Failure::InvalidUrl(_) => ProbeError::Other(failure.to_string()),
        Failure::Transport(err) => classify_transport(err),
    }
}

fn classify_transport(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout;
    }

    // Start below the top-level error: reqwest's own message embeds the URL,
    // and a host like "ssl.example.com" must not read as a TLS failure.
    let from_causes = err.source().and_then(inspect_causes);

    match from_causes {
        Some(found @ (ProbeError::Ssl | ProbeError::Timeout)) => found,
        _ if err.is_connect() => ProbeError::Connection,
        Some(found) => found,
        None if err.is_redirect() || err.is_body() || err.is_decode() || err.is_status() => {
            ProbeError::Response
        }
        None => ProbeError::Other(err.to_string()),
    }
}

// Walks a source() chain looking for something we can name.
//
// TLS and timeouts win as soon as they are seen. Connection and protocol
// findings are remembered (first one wins) and returned if nothing more
// specific turns up further down.
pub(crate) fn inspect_causes(err: &(dyn Error + 'static)) -> Option<ProbeError> {
    let mut found = None;
    let mut cause = Some(err);

    while let Some(current) = cause {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut => return Some(ProbeError::Timeout),
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::BrokenPipe => {
                    found.get_or_insert(ProbeError::Connection);
                }
                _ => {}
            }
        }

        let text = current.to_string().to_ascii_lowercase();
        if TLS_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Some(ProbeError::Ssl);
        }
        if text.contains("connection closed before message completed") {
            found.get_or_insert(ProbeError::Connection);
        }
        if PROTOCOL_MARKERS.iter().any(|marker| text.contains(marker)) {
            found.get_or_insert(ProbeError::Response);
        }

        cause = current.source();
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal error with an optional source, for building cause chains
    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        source: Option<Box<dyn Error + Send + Sync + 'static>>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            self.source.as_deref().map(|e| e as &(dyn Error + 'static))
        }
    }

    fn wrap(message: &'static str, inner: impl Error + Send + Sync + 'static) -> Wrapped {
        Wrapped {
            message,
            source: Some(Box::new(inner)),
        }
    }

    #[test]
    fn test_detail_strings() {
        assert_eq!(ProbeError::NotFound.detail(), "404");
        assert_eq!(ProbeError::Response.detail(), "RESPONSE_ERROR");
        assert_eq!(ProbeError::Ssl.detail(), "SSL_ERROR");
        assert_eq!(ProbeError::Connection.detail(), "CONNECTION_ERROR");
        assert_eq!(ProbeError::Timeout.detail(), "TIMEOUT");
        assert_eq!(ProbeError::Other("boom".into()).detail(), "boom");
    }

    #[test]
    fn test_serializes_as_detail() {
        let json = serde_json::to_string(&ProbeError::Timeout).unwrap();
        assert_eq!(json, "\"TIMEOUT\"");
    }

    #[test]
    fn test_non_transport_failures() {
        assert_eq!(classify(&Failure::TimedOut), ProbeError::Timeout);
        assert_eq!(classify(&Failure::TooManyRedirects(10)), ProbeError::Response);
        assert_eq!(
            classify(&Failure::BadLocation("http://[::1".into())),
            ProbeError::Response
        );

        match classify(&Failure::InvalidUrl("relative URL without a base".into())) {
            ProbeError::Other(detail) => assert!(detail.contains("relative URL")),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn test_refused_connection_in_chain() {
        let err = wrap(
            "error trying to connect",
            io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused"),
        );
        assert_eq!(inspect_causes(&err), Some(ProbeError::Connection));
    }

    #[test]
    fn test_certificate_failure_beats_connection() {
        let err = wrap(
            "error trying to connect",
            io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate: UnknownIssuer",
            ),
        );
        assert_eq!(inspect_causes(&err), Some(ProbeError::Ssl));
    }

    #[test]
    fn test_timed_out_io_error() {
        let err = wrap(
            "operation failed",
            io::Error::new(io::ErrorKind::TimedOut, "deadline has elapsed"),
        );
        assert_eq!(inspect_causes(&err), Some(ProbeError::Timeout));
    }

    #[test]
    fn test_parse_failure_is_response_error() {
        let err = Wrapped {
            message: "invalid HTTP version parsed",
            source: None,
        };
        assert_eq!(inspect_causes(&err), Some(ProbeError::Response));
    }

    #[test]
    fn test_unknown_chain_yields_nothing() {
        let err = Wrapped {
            message: "something odd happened",
            source: None,
        };
        assert_eq!(inspect_causes(&err), None);
    }
}
