use std::time::Duration;

use dns_types::protocol::deserialise;
use dns_types::protocol::serialise;
use dns_types::protocol::types::{Question, Rcode};

use crate::util::net::TransportError;

/// Options controlling a single `resolve` call.  Every field has a
/// documented default, so callers can start from `Default::default()`
/// and override what they need.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ResolveOptions {
    /// Consult the cache before going to the network.  Defaults to
    /// true.
    pub use_cache: bool,

    /// Deadline for each UDP exchange.  Defaults to 5 seconds.
    pub timeout: Duration,

    /// How many referrals a single query loop will follow before
    /// giving up.  Defaults to 16.
    pub max_hops: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            timeout: Duration::from_secs(5),
            max_hops: 16,
        }
    }
}

/// An error that aborts the current resolution.  There is no silent
/// recovery: every variant is surfaced to the caller.
#[derive(Debug)]
pub enum ResolutionError {
    /// A response could not be parsed.
    Decode(deserialise::Error),

    /// A query could not be serialised.
    Encode(serialise::Error),

    /// The exchange with the nameserver failed.
    Transport(TransportError),

    /// The nameserver signalled an error.
    ServerError { rcode: Rcode },

    /// The queried domain does not exist.
    NameError { question: Question },

    /// The reply has the QR bit clear, so it is not a response at
    /// all.
    NotAResponse,

    /// The response carries no answer, no usable glue, and no
    /// delegation.
    NoAnswer { question: Question },

    /// A referral revisited a server, a glueless referral recursed
    /// into the server it came from, or an alias or
    /// nameserver-address chain exceeded its depth allowance.
    LoopDetected { question: Question },
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolutionError::Decode(error) => write!(f, "could not parse response: {error}"),
            ResolutionError::Encode(error) => write!(f, "could not serialise query: {error}"),
            ResolutionError::Transport(error) => error.fmt(f),
            ResolutionError::ServerError { rcode } => write!(f, "nameserver error: {rcode}"),
            ResolutionError::NameError { question } => {
                write!(f, "'{question}' does not exist")
            }
            ResolutionError::NotAResponse => write!(f, "reply is not a response"),
            ResolutionError::NoAnswer { question } => {
                write!(f, "no answer for '{question}'")
            }
            ResolutionError::LoopDetected { question } => {
                write!(f, "loop detected while answering '{question}'")
            }
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolutionError::Decode(error) => Some(error),
            ResolutionError::Encode(error) => Some(error),
            ResolutionError::Transport(error) => Some(error),
            _ => None,
        }
    }
}

impl From<deserialise::Error> for ResolutionError {
    fn from(error: deserialise::Error) -> Self {
        ResolutionError::Decode(error)
    }
}

impl From<serialise::Error> for ResolutionError {
    fn from(error: serialise::Error) -> Self {
        ResolutionError::Encode(error)
    }
}

impl From<TransportError> for ResolutionError {
    fn from(error: TransportError) -> Self {
        ResolutionError::Transport(error)
    }
}
