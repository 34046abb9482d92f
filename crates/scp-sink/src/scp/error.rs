//! SCP-specific error type.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Status byte the remote source attached to an error message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScpRemoteSeverity {
    /// `\x01` – the source could not send a file.
    Error,
    /// `\x02` – the source gave up on the whole transfer.
    Fatal,
}

impl ScpRemoteSeverity {
    pub fn from_status(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Error),
            2 => Some(Self::Fatal),
            _ => None,
        }
    }

    pub fn status_byte(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Fatal => 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScpError {
    /// Connect, authenticate, or exec on the transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed header, premature end of stream, or short payload.
    #[error("SCP protocol error: {0}")]
    Protocol(String),

    /// The source sent status 1 or 2; the message is carried verbatim.
    #[error("{message}")]
    Remote {
        severity: ScpRemoteSeverity,
        message: String,
    },

    /// The local destination could not be created or written.
    #[error("Local I/O error{}: {source}", describe_path(.path))]
    LocalIo {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" on '{}'", p.display()))
        .unwrap_or_default()
}

/// Flat tag for an [`ScpError`], for callers that only branch on category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScpErrorKind {
    Transport,
    Protocol,
    Remote,
    LocalIo,
}

pub type ScpResult<T> = Result<T, ScpError>;

impl ScpError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn remote(severity: ScpRemoteSeverity, msg: impl Into<String>) -> Self {
        Self::Remote {
            severity,
            message: msg.into(),
        }
    }

    pub fn local_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }

    pub fn kind(&self) -> ScpErrorKind {
        match self {
            Self::Transport(_) => ScpErrorKind::Transport,
            Self::Protocol(_) => ScpErrorKind::Protocol,
            Self::Remote { .. } => ScpErrorKind::Remote,
            Self::LocalIo { .. } => ScpErrorKind::LocalIo,
        }
    }

    /// Severity of a remote-reported error, `None` for every other kind.
    pub fn remote_severity(&self) -> Option<ScpRemoteSeverity> {
        match self {
            Self::Remote { severity, .. } => Some(*severity),
            _ => None,
        }
    }

    /// Map an I/O error on the remote stream. A truncated stream is a
    /// protocol violation; anything else is the transport failing.
    pub(crate) fn from_stream(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::protocol(format!("{}: connection closed by source", context))
        } else {
            Self::transport(format!("{}: {}", context, err))
        }
    }
}

impl From<ssh2::Error> for ScpError {
    fn from(e: ssh2::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
