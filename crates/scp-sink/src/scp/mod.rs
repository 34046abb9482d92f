// ── scp-sink / scp module ─────────────────────────────────────────────────────
//
// SCP sink engine:
//   • types        – connection descriptor, engine options, results
//   • error        – ScpError taxonomy (transport / protocol / remote / local)
//   • ack          – one-byte acknowledgment protocol
//   • header       – bounded byte-level `C` header line parser
//   • destination  – local target resolution and remote name policy
//   • sink         – explicit protocol state machine
//   • transport    – Transport Adapter trait + ssh2 implementation
//   • client       – retrieval entry point (`scp -f` + cleanup)

pub mod types;
pub mod error;
pub mod ack;
pub mod header;
pub mod destination;
pub mod sink;
pub mod transport;
pub mod client;

pub use types::*;
pub use error::{ScpError, ScpErrorKind, ScpRemoteSeverity, ScpResult};
pub use sink::ScpSink;
pub use transport::{ScpTransport, Ssh2Stream, Ssh2Transport};
pub use client::{scp_source_command, ScpClient};
