//! # scp-sink
//!
//! Client ("sink") side of the legacy SCP wire protocol:
//!   • Runs `scp -f <path>` on an already established SSH exec channel
//!   • Parses `C<mode> <size> <name>` header lines byte by byte
//!   • Streams exactly `size` payload bytes per file to local storage
//!   • Exchanges the one-byte acknowledgments after every protocol phase
//!   • Surfaces remote `\x01` / `\x02` status messages as typed errors
//!   • ssh2-backed transport adapter (password / key / agent auth)

pub mod scp;
