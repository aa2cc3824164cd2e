//! Enumerated settings parsed from files, the environment and flags.
//!
//! Every enum accepts its snake_case name in any letter case.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Scheduling of the calls that make up one batch.
///
/// Either mode returns responses in request order; the choice only affects
/// whether independent calls may overlap in time.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DispatchMode {
    /// Calls run one after another on the connection thread.
    #[default]
    Sequential,
    /// Calls run on scoped worker threads, a bounded number at a time.
    Parallel,
}

/// Errors encountered while parsing a [`DispatchMode`] from text.
pub type DispatchModeParseError = strum::ParseError;

/// Rendering of daemon log events.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event.
    #[default]
    Json,
    /// Terse human-readable lines.
    Compact,
}

/// Error returned when a log format name is not recognised.
pub type LogFormatParseError = strum::ParseError;
