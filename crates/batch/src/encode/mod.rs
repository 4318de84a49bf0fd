//! Encoding modules for vidshrink

pub mod ffmpeg;

pub use ffmpeg::{
    build_encoder_command, parse_progress_line, EncodeError, EncodeOutcome, EncodeParams,
    EncodeProgressSample, EncodeSupervisor,
};
