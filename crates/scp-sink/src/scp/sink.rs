// ── Sink engine – SCP receive state machine ──────────────────────────────────
//
//   Start ─▶ AwaitHeader ─▶ ReadingMode ─▶ ReadingSize ─▶ ReadingName
//                ▲                                             │
//                │                                             ▼
//          AwaitFinalAck ◀──────────────────────────── StreamingPayload
//
// AwaitHeader ends in Done on anything but `C`. Every transition returns
// `Err` for the failed state; the open payload file lives inside the
// StreamingPayload state and is closed when that state is dropped.

use crate::scp::ack::{self, Ack};
use crate::scp::destination::ScpDestination;
use crate::scp::error::{ScpError, ScpResult};
use crate::scp::header::{self, HeaderLimits, HEADER_FILE};
use crate::scp::types::*;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// A file being filled from the payload stream.
struct PayloadTarget {
    header: FileHeader,
    path: PathBuf,
    file: File,
    remaining: u64,
    hasher: Option<Sha256>,
}

enum SinkState {
    Start,
    AwaitHeader,
    ReadingMode,
    ReadingSize { mode: String },
    ReadingName { mode: String, size: u64 },
    StreamingPayload(Box<PayloadTarget>),
    AwaitFinalAck,
    Done,
}

impl SinkState {
    fn name(&self) -> &'static str {
        match self {
            SinkState::Start => "start",
            SinkState::AwaitHeader => "await-header",
            SinkState::ReadingMode => "reading-mode",
            SinkState::ReadingSize { .. } => "reading-size",
            SinkState::ReadingName { .. } => "reading-name",
            SinkState::StreamingPayload(_) => "streaming-payload",
            SinkState::AwaitFinalAck => "await-final-ack",
            SinkState::Done => "done",
        }
    }
}

/// Per-run bookkeeping that outlives individual states.
struct RunContext {
    destination: ScpDestination,
    received: Vec<ScpReceivedFile>,
}

/// Drives one `scp -f` conversation over a duplex stream.
///
/// Header bytes and payload bytes are read through the same buffered
/// reader, so nothing read ahead is ever lost between phases.
pub struct ScpSink<S: Read + Write> {
    stream: BufReader<S>,
    options: ScpSinkOptions,
    limits: HeaderLimits,
    buffer: Vec<u8>,
}

impl<S: Read + Write> ScpSink<S> {
    pub fn new(stream: S, options: ScpSinkOptions) -> Self {
        let buffer_size = options.buffer_size.max(1);
        Self {
            stream: BufReader::with_capacity(buffer_size, stream),
            limits: HeaderLimits::from_options(&options),
            buffer: vec![0u8; buffer_size],
            options,
        }
    }

    /// Give back the underlying stream (any read-ahead is discarded).
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Receive every file the source sends and write it under `local`.
    ///
    /// Returns the files in the order received, or the first error.
    pub fn run(&mut self, local: impl AsRef<Path>) -> ScpResult<Vec<ScpReceivedFile>> {
        let mut ctx = RunContext {
            destination: ScpDestination::probe(
                local.as_ref(),
                self.options.name_policy,
                self.options.multi_file_target,
            ),
            received: Vec::new(),
        };

        let mut state = SinkState::Start;
        loop {
            let from = state.name();
            state = match self.step(state, &mut ctx) {
                Ok(SinkState::Done) => break,
                Ok(next) => next,
                Err(e) => {
                    debug!("SCP sink failed in {}: {}", from, e);
                    return Err(e);
                }
            };
            debug!("SCP sink {} -> {}", from, state.name());
        }

        info!(
            "SCP sink received {} file(s) into {}",
            ctx.received.len(),
            ctx.destination.local().display()
        );
        Ok(ctx.received)
    }

    fn step(&mut self, state: SinkState, ctx: &mut RunContext) -> ScpResult<SinkState> {
        match state {
            SinkState::Start => self.start(),
            SinkState::AwaitHeader => self.await_header(),
            SinkState::ReadingMode => self.reading_mode(),
            SinkState::ReadingSize { mode } => self.reading_size(mode),
            SinkState::ReadingName { mode, size } => self.reading_name(mode, size, ctx),
            SinkState::StreamingPayload(target) => self.streaming_payload(*target, ctx),
            SinkState::AwaitFinalAck => self.await_final_ack(),
            SinkState::Done => Ok(SinkState::Done),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn start(&mut self) -> ScpResult<SinkState> {
        ack::send_ready(self.stream.get_mut())?;
        Ok(SinkState::AwaitHeader)
    }

    fn await_header(&mut self) -> ScpResult<SinkState> {
        match ack::read_ack(&mut self.stream)? {
            Ack::Other(HEADER_FILE) => Ok(SinkState::ReadingMode),
            Ack::Eof => {
                debug!("SCP source closed the stream, transfer complete");
                Ok(SinkState::Done)
            }
            other => {
                debug!("SCP source sent {:?} instead of a header, transfer complete", other);
                Ok(SinkState::Done)
            }
        }
    }

    fn reading_mode(&mut self) -> ScpResult<SinkState> {
        let mode = header::read_mode(&mut self.stream)?;
        Ok(SinkState::ReadingSize { mode })
    }

    fn reading_size(&mut self, mode: String) -> ScpResult<SinkState> {
        let size = header::read_size(&mut self.stream, self.limits.max_file_size)?;
        Ok(SinkState::ReadingName { mode, size })
    }

    fn reading_name(
        &mut self,
        mode: String,
        size: u64,
        ctx: &mut RunContext,
    ) -> ScpResult<SinkState> {
        let name = header::read_name(&mut self.stream, self.limits.max_name_length)?;
        let header = FileHeader { mode, size, name };
        debug!(
            "SCP header: mode={} size={} name={}",
            header.mode,
            header.size,
            header.name_lossy()
        );

        let path = ctx.destination.resolve(&header.name)?;
        let file = match File::create(&path) {
            Ok(f) => f,
            Err(e) => {
                if self.options.report_local_errors {
                    let reason = format!("scp: {}: {}", path.display(), e);
                    if let Err(notify) = ack::send_error(self.stream.get_mut(), &reason) {
                        warn!("Could not report local error to SCP source: {}", notify);
                    }
                }
                return Err(ScpError::local_io(&path, e));
            }
        };

        // Acknowledge the header only once the target exists.
        ack::send_ready(self.stream.get_mut())?;

        let hasher = self.options.compute_checksum.then(|| Sha256::new());
        Ok(SinkState::StreamingPayload(Box::new(PayloadTarget {
            remaining: header.size,
            header,
            path,
            file,
            hasher,
        })))
    }

    fn streaming_payload(
        &mut self,
        mut target: PayloadTarget,
        ctx: &mut RunContext,
    ) -> ScpResult<SinkState> {
        if let Err(e) = self.copy_payload(&mut target) {
            let PayloadTarget { file, path, .. } = target;
            drop(file);
            if self.options.remove_partial_on_error {
                if let Err(rm) = std::fs::remove_file(&path) {
                    warn!("Could not remove partial file '{}': {}", path.display(), rm);
                }
            }
            return Err(e);
        }

        let PayloadTarget {
            header,
            path,
            file,
            hasher,
            ..
        } = target;
        drop(file);

        if self.options.preserve_mode {
            apply_mode(&path, &header)?;
        }

        let checksum = hasher.map(|h| hex::encode(h.finalize()));
        info!("SCP received {} ({} bytes)", path.display(), header.size);
        ctx.received.push(ScpReceivedFile {
            path,
            size: header.size,
            mode: header.mode,
            checksum,
        });

        Ok(SinkState::AwaitFinalAck)
    }

    fn await_final_ack(&mut self) -> ScpResult<SinkState> {
        match ack::read_ack(&mut self.stream)? {
            Ack::Ok => {
                ack::send_ready(self.stream.get_mut())?;
                Ok(SinkState::AwaitHeader)
            }
            Ack::Eof if self.options.eof_as_final_ack => {
                warn!("SCP source closed the stream without a final acknowledgment");
                Ok(SinkState::Done)
            }
            Ack::Eof => Err(ScpError::protocol(
                "Stream ended before the acknowledgment that follows the payload",
            )),
            Ack::Other(byte) => Err(ScpError::protocol(format!(
                "Expected acknowledgment after payload, got byte 0x{:02x}",
                byte
            ))),
        }
    }

    // ── Payload copy ─────────────────────────────────────────────────────────

    fn copy_payload(&mut self, target: &mut PayloadTarget) -> ScpResult<()> {
        while target.remaining > 0 {
            let want = (self.buffer.len() as u64).min(target.remaining) as usize;
            let n = match self.stream.read(&mut self.buffer[..want]) {
                Ok(0) => {
                    return Err(ScpError::protocol(format!(
                        "Stream ended with {} of {} payload bytes outstanding for '{}'",
                        target.remaining,
                        target.header.size,
                        target.header.name_lossy()
                    )))
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScpError::from_stream("Failed to read payload", e)),
            };

            let chunk = &self.buffer[..n];
            target
                .file
                .write_all(chunk)
                .map_err(|e| ScpError::local_io(&target.path, e))?;
            if let Some(hasher) = target.hasher.as_mut() {
                hasher.update(chunk);
            }
            target.remaining -= n as u64;
        }

        target
            .file
            .flush()
            .map_err(|e| ScpError::local_io(&target.path, e))
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, header: &FileHeader) -> ScpResult<()> {
    use std::os::unix::fs::PermissionsExt;
    match header.mode_bits() {
        Some(bits) => std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
            .map_err(|e| ScpError::local_io(path, e)),
        None => {
            warn!("Ignoring non-octal mode '{}' for {}", header.mode, path.display());
            Ok(())
        }
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _header: &FileHeader) -> ScpResult<()> {
    Ok(())
}
