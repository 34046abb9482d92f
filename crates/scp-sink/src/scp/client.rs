// ── ScpClient – one `scp -f` retrieval per call ──────────────────────────────

use crate::scp::error::ScpResult;
use crate::scp::sink::ScpSink;
use crate::scp::transport::{ScpTransport, Ssh2Transport};
use crate::scp::types::*;
use chrono::Utc;
use log::{info, warn};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Remote command that turns the peer into an SCP source for `remote_path`.
///
/// Unquoted by default so the remote shell can expand globs into several
/// files.
pub fn scp_source_command(remote_path: &str, quote: bool) -> String {
    if quote {
        format!("scp -f {}", shell_escape(remote_path))
    } else {
        format!("scp -f {}", remote_path)
    }
}

pub(crate) fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[derive(Debug, Clone, Default)]
pub struct ScpClient {
    options: ScpSinkOptions,
}

impl ScpClient {
    pub fn new(options: ScpSinkOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScpSinkOptions {
        &self.options
    }

    /// Connect over SSH and fetch `remote_path` into `local_path`
    /// (a file, or a directory to receive files under their remote names).
    pub fn get_file(
        &self,
        config: &ScpConnectionConfig,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> ScpResult<ScpFetchResult> {
        let transport = Ssh2Transport::connect(config)?;
        self.fetch(transport, remote_path, local_path)
    }

    /// Run one retrieval over an already connected transport.
    ///
    /// The transport is disconnected before returning, on success and on
    /// every error path alike.
    pub fn fetch<T: ScpTransport>(
        &self,
        mut transport: T,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> ScpResult<ScpFetchResult> {
        let transfer_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let local_path = local_path.as_ref();

        info!(
            "SCP fetch {} started: {} -> {}",
            transfer_id,
            remote_path,
            local_path.display()
        );

        let outcome = self.receive(&mut transport, remote_path, local_path);
        transport.disconnect();

        match outcome {
            Ok(files) => {
                let bytes_transferred = files.iter().map(|f| f.size).sum();
                let duration_ms = clock.elapsed().as_millis() as u64;
                info!(
                    "SCP fetch {} complete: {} file(s), {} bytes in {} ms",
                    transfer_id,
                    files.len(),
                    bytes_transferred,
                    duration_ms
                );
                Ok(ScpFetchResult {
                    transfer_id,
                    remote_path: remote_path.to_string(),
                    files,
                    bytes_transferred,
                    started_at,
                    duration_ms,
                })
            }
            Err(e) => {
                warn!("SCP fetch {} failed: {}", transfer_id, e);
                Err(e)
            }
        }
    }

    fn receive<T: ScpTransport>(
        &self,
        transport: &mut T,
        remote_path: &str,
        local_path: &Path,
    ) -> ScpResult<Vec<ScpReceivedFile>> {
        let command = scp_source_command(remote_path, self.options.quote_remote_path);
        let stream = transport.exec(&command)?;

        let mut sink = ScpSink::new(stream, self.options.clone());
        let outcome = sink.run(local_path);
        transport.close_stream(sink.into_inner());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_command_unquoted() {
        assert_eq!(scp_source_command("/var/log/*.log", false), "scp -f /var/log/*.log");
    }

    #[test]
    fn test_source_command_quoted() {
        assert_eq!(
            scp_source_command("/path/to/my file.txt", true),
            "scp -f '/path/to/my file.txt'"
        );
    }

    #[test]
    fn test_shell_escape_single_quotes() {
        assert_eq!(shell_escape("it's a file"), "'it'\\''s a file'");
    }

    #[test]
    fn test_shell_escape_special_chars() {
        assert_eq!(shell_escape("/path/$HOME/file"), "'/path/$HOME/file'");
    }

    #[test]
    fn test_client_default_options() {
        let client = ScpClient::default();
        assert!(!client.options().quote_remote_path);
        assert_eq!(client.options().buffer_size, 65_536);
    }
}
