#![deny(unreachable_patterns)]
//! Composition planning and FFmpeg CLI wrapper.
//!
//! This crate provides:
//! - A pure composition planner producing frame-accurate filter graphs
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Timeout and cancellation for renders
//! - Materialization of remote or inline content into local files

pub mod command;
pub mod error;
pub mod fetch;
pub mod planner;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fetch::{decode_data_url, materialize};
pub use planner::{
    escape_drawtext, plan, plan_with_style, AudioMux, CompositionPlan, JoinStep, PlannedInput,
    TransitionOp,
};
pub use progress::{parse_progress_line, FfmpegProgress};
