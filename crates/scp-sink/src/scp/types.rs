// ── Types ─────────────────────────────────────────────────────────────────────

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_scp_port() -> u16 {
    22
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_buffer_size() -> usize {
    65_536 // 64 KiB
}
fn default_max_name_length() -> usize {
    4096
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_keepalive_secs() -> u64 {
    60
}

// ── Connection & Authentication ──────────────────────────────────────────────

/// Everything the transport adapter needs to reach the remote source.
///
/// The sink engine never looks inside; it is handed to [`Ssh2Transport`]
/// as-is.
///
/// [`Ssh2Transport`]: crate::scp::transport::Ssh2Transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpConnectionConfig {
    pub host: String,
    #[serde(default = "default_scp_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Base64-encoded private key (PEM / OpenSSH text, base64 wrapped once more).
    #[serde(default)]
    pub private_key_data: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default = "default_false")]
    pub use_agent: bool,
    #[serde(default)]
    pub known_hosts_policy: ScpKnownHostsPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
}

impl ScpConnectionConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_scp_port(),
            username: username.into(),
            password: None,
            private_key_data: None,
            private_key_path: None,
            private_key_passphrase: None,
            use_agent: false,
            known_hosts_policy: ScpKnownHostsPolicy::default(),
            timeout_secs: default_timeout_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key_data(mut self, base64_key: impl Into<String>) -> Self {
        self.private_key_data = Some(base64_key.into());
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ScpKnownHostsPolicy {
    /// Do not check the host key at all.
    #[default]
    Ignore,
    /// Accept and record unknown hosts, refuse changed keys.
    AcceptNew,
    /// Refuse anything not already in `~/.ssh/known_hosts`.
    Strict,
}

// ── Engine options ───────────────────────────────────────────────────────────

/// How remote-supplied file names are treated before joining them onto a
/// local directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ScpNamePolicy {
    /// Refuse names that could escape the destination directory.
    #[default]
    Reject,
    /// Use the raw bytes exactly as received.
    Verbatim,
}

/// What happens when more than one file arrives for a non-directory
/// destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ScpMultiFileTarget {
    /// Each file replaces the previous one at the same local path.
    #[default]
    Overwrite,
    /// The second header aborts the run with a protocol error.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpSinkOptions {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Upper bound on the size announced in a header. `None` rejects only
    /// values that do not fit in a `u64`.
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default)]
    pub name_policy: ScpNamePolicy,
    #[serde(default)]
    pub multi_file_target: ScpMultiFileTarget,
    /// Accept a closed stream in place of the trailing status byte after a
    /// payload, as older clients did.
    #[serde(default = "default_false")]
    pub eof_as_final_ack: bool,
    #[serde(default = "default_false")]
    pub preserve_mode: bool,
    #[serde(default = "default_false")]
    pub remove_partial_on_error: bool,
    #[serde(default = "default_false")]
    pub compute_checksum: bool,
    #[serde(default = "default_false")]
    pub quote_remote_path: bool,
    /// Send `\x01<reason>\n` to the source when a local file cannot be created.
    #[serde(default = "default_true")]
    pub report_local_errors: bool,
}

impl Default for ScpSinkOptions {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_file_size: None,
            max_name_length: default_max_name_length(),
            name_policy: ScpNamePolicy::default(),
            multi_file_target: ScpMultiFileTarget::default(),
            eof_as_final_ack: false,
            preserve_mode: false,
            remove_partial_on_error: false,
            compute_checksum: false,
            quote_remote_path: false,
            report_local_errors: true,
        }
    }
}

// ── Protocol data ────────────────────────────────────────────────────────────

/// One parsed `C<mode> <size> <name>\n` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Permission string as transmitted, e.g. `0644`.
    pub mode: String,
    pub size: u64,
    /// Raw name bytes, no encoding normalisation.
    pub name: Vec<u8>,
}

impl FileHeader {
    /// Permission bits parsed as octal; `None` if the string is not octal.
    pub fn mode_bits(&self) -> Option<u32> {
        u32::from_str_radix(&self.mode, 8).ok().map(|m| m & 0o7777)
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

// ── Transfer result ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScpReceivedFile {
    pub path: PathBuf,
    pub size: u64,
    pub mode: String,
    /// Hex SHA-256 of the payload when checksums are enabled.
    pub checksum: Option<String>,
}

/// Files materialised by one retrieval, in the order the source sent them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpFetchResult {
    pub transfer_id: String,
    pub remote_path: String,
    pub files: Vec<ScpReceivedFile>,
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScpFetchResult {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_defaults() {
        let cfg: ScpConnectionConfig =
            serde_json::from_str(r#"{"host":"example.com","username":"deploy"}"#).unwrap();
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.keepalive_interval_secs, 60);
        assert!(!cfg.use_agent);
        assert_eq!(cfg.known_hosts_policy, ScpKnownHostsPolicy::Ignore);
        assert_eq!(cfg.address(), "example.com:22");
    }

    #[test]
    fn test_connection_config_camel_case() {
        let cfg: ScpConnectionConfig = serde_json::from_str(
            r#"{"host":"h","username":"u","privateKeyData":"QUJD","knownHostsPolicy":"strict"}"#,
        )
        .unwrap();
        assert_eq!(cfg.private_key_data.as_deref(), Some("QUJD"));
        assert_eq!(cfg.known_hosts_policy, ScpKnownHostsPolicy::Strict);
    }

    #[test]
    fn test_sink_options_defaults_match_empty_json() {
        let parsed: ScpSinkOptions = serde_json::from_str("{}").unwrap();
        let built = ScpSinkOptions::default();
        assert_eq!(parsed.buffer_size, built.buffer_size);
        assert_eq!(parsed.max_name_length, 4096);
        assert_eq!(parsed.name_policy, ScpNamePolicy::Reject);
        assert_eq!(parsed.multi_file_target, ScpMultiFileTarget::Overwrite);
        assert!(!parsed.eof_as_final_ack);
        assert!(parsed.report_local_errors);
    }

    #[test]
    fn test_mode_bits() {
        let header = FileHeader {
            mode: "0644".into(),
            size: 0,
            name: b"a".to_vec(),
        };
        assert_eq!(header.mode_bits(), Some(0o644));

        let bogus = FileHeader {
            mode: "09zz".into(),
            ..header
        };
        assert_eq!(bogus.mode_bits(), None);
    }

    #[test]
    fn test_name_policy_serialization() {
        let json = serde_json::to_string(&ScpNamePolicy::Verbatim).unwrap();
        assert_eq!(json, "\"verbatim\"");
    }
}
