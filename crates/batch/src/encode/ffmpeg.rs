//! External encoder supervision for vidshrink
//!
//! Builds the encoder command line, runs exactly one child process per call,
//! drains its status stream into progress samples and reports the outcome.

use crate::config::EncoderConfig;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

/// Marker for the encoded-time field of a status line
const TIME_MARKER: &str = "time=";
/// Marker for the bitrate field of a status line
const BITRATE_MARKER: &str = "bitrate=";

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder exited with non-zero status
    #[error("encoder exited with code {0}")]
    Failed(i32),

    /// Encoder process was terminated by a signal
    #[error("encoder was terminated by a signal")]
    Terminated,

    /// Encoder could not be started
    #[error("could not launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Status stream or exit status could not be read
    #[error("lost contact with the encoder: {0}")]
    Stream(io::Error),
}

impl EncodeError {
    /// Failure class shown to the operator
    pub fn kind(&self) -> &'static str {
        match self {
            EncodeError::Failed(_) | EncodeError::Terminated => "encode failure",
            EncodeError::Launch { .. } | EncodeError::Stream(_) => "launch failure",
        }
    }
}

/// One progress line reported by the encoder.
///
/// Both values are kept as the encoder printed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProgressSample {
    /// Amount of media encoded so far, e.g. `00:01:02.50`
    pub elapsed: String,
    /// Current output bitrate, e.g. `1234.5kbits/s`
    pub bitrate: String,
}

/// Result of a successful encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutcome {
    /// Wall-clock time the child ran for
    pub elapsed: Duration,
    /// Number of progress samples observed
    pub samples: usize,
    /// Most recent progress sample, if any
    pub last_sample: Option<EncodeProgressSample>,
}

/// Parameters for a single encode
#[derive(Debug, Clone)]
pub struct EncodeParams {
    /// Path to the input video file
    pub input_path: PathBuf,
    /// Path for the encoded output file
    pub output_path: PathBuf,
    /// Constant rate factor handed to the encoder
    pub quality: u32,
}

impl EncodeParams {
    /// Create new encoding parameters
    pub fn new(input_path: PathBuf, output_path: PathBuf, quality: u32) -> Self {
        Self {
            input_path,
            output_path,
            quality,
        }
    }
}

/// Extract a progress sample from one status line.
///
/// Returns `None` unless the line carries both a time and a bitrate field.
pub fn parse_progress_line(line: &str) -> Option<EncodeProgressSample> {
    let elapsed = field_value(line, TIME_MARKER)?;
    let bitrate = field_value(line, BITRATE_MARKER)?;
    Some(EncodeProgressSample {
        elapsed: elapsed.to_string(),
        bitrate: bitrate.to_string(),
    })
}

/// Value following `marker`, skipping the padding the encoder inserts after `=`.
fn field_value<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    line[start..].split_whitespace().next()
}

/// Build the encoder command for one input/output pair
///
/// Shape: `<program> <program_args…> -i <input> -c:v <codec> -preset <preset>
/// -crf <quality> -c:a <audio codec> -strict experimental -n <output>`
pub fn build_encoder_command(config: &EncoderConfig, params: &EncodeParams) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.program_args);

    cmd.arg("-i").arg(&params.input_path);
    cmd.arg("-c:v").arg(&config.video_codec);
    cmd.arg("-preset").arg(&config.preset);
    cmd.arg("-crf").arg(params.quality.to_string());

    // Audio is always re-encoded
    cmd.arg("-c:a").arg(&config.audio_codec);
    cmd.arg("-strict").arg("experimental");

    // Never overwrite an existing artifact
    cmd.arg("-n");
    cmd.arg(&params.output_path);

    cmd
}

/// Runs one encoder child at a time and watches its status stream
#[derive(Debug, Clone)]
pub struct EncodeSupervisor {
    config: EncoderConfig,
}

impl EncodeSupervisor {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `params.input_path` into `params.output_path`.
    ///
    /// Every status line with a time and a bitrate field is handed to
    /// `on_progress` as it arrives. The child is always reaped before this
    /// returns. A partial output is left in place on failure.
    pub async fn encode<F>(
        &self,
        params: &EncodeParams,
        mut on_progress: F,
    ) -> Result<EncodeOutcome, EncodeError>
    where
        F: FnMut(&EncodeProgressSample),
    {
        let started = Instant::now();

        let mut cmd = build_encoder_command(&self.config, params);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            input = %params.input_path.display(),
            output = %params.output_path.display(),
            quality = params.quality,
            "launching encoder"
        );

        let mut child = cmd.spawn().map_err(|source| EncodeError::Launch {
            program: self.config.program.clone(),
            source,
        })?;

        let drained = match child.stderr.take() {
            Some(stderr) => drain_status(stderr, &mut on_progress).await,
            None => Err(io::Error::other("encoder stderr was not captured")),
        };

        let (samples, last_sample) = match drained {
            Ok(drained) => drained,
            Err(e) => {
                // kill() also waits, so the child is reaped either way
                let _ = child.kill().await;
                return Err(EncodeError::Stream(e));
            }
        };

        let status = child.wait().await.map_err(EncodeError::Stream)?;
        let elapsed = started.elapsed();
        debug!(?status, samples, ?elapsed, "encoder exited");

        if status.success() {
            Ok(EncodeOutcome {
                elapsed,
                samples,
                last_sample,
            })
        } else {
            match status.code() {
                Some(code) => Err(EncodeError::Failed(code)),
                None => Err(EncodeError::Terminated),
            }
        }
    }
}

/// Longest status line kept; the rest of an oversized line is dropped.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Read the status stream until the child closes it.
///
/// Lines end at `\n` or `\r` and are handed on as soon as their terminator
/// arrives. Only progress lines are kept, and only the last one.
async fn drain_status<R, F>(
    reader: R,
    on_progress: &mut F,
) -> io::Result<(usize, Option<EncodeProgressSample>)>
where
    R: AsyncRead + Unpin,
    F: FnMut(&EncodeProgressSample),
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut samples = 0;
    let mut last_sample = None;

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let consumed = chunk.len();

        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                handle_status_line(&line, on_progress, &mut samples, &mut last_sample);
                line.clear();
            } else if line.len() < MAX_LINE_LEN {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }

    // unterminated tail
    handle_status_line(&line, on_progress, &mut samples, &mut last_sample);

    Ok((samples, last_sample))
}

fn handle_status_line<F>(
    raw: &[u8],
    on_progress: &mut F,
    samples: &mut usize,
    last_sample: &mut Option<EncodeProgressSample>,
) where
    F: FnMut(&EncodeProgressSample),
{
    let line = String::from_utf8_lossy(raw);
    match parse_progress_line(&line) {
        Some(sample) => {
            on_progress(&sample);
            *samples += 1;
            *last_sample = Some(sample);
        }
        None => {
            if !line.trim().is_empty() {
                trace!(line = %line.trim_end(), "encoder");
            }
        }
    }
}
