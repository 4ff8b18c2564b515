//! Health state enumeration

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Visual indicator of a service's health. Any state may follow any other.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum HealthState {
    /// Starting up or shutting down
    #[default]
    #[serde(rename = "blue")]
    #[strum(serialize = "blue")]
    Initializing,

    /// Operating normally
    #[serde(rename = "green")]
    #[strum(serialize = "green")]
    Healthy,

    /// May need assistance
    #[serde(rename = "yellow")]
    #[strum(serialize = "yellow")]
    Degraded,

    /// Needs help now
    #[serde(rename = "red")]
    #[strum(serialize = "red")]
    Critical,

    /// Maintenance mode, or stopped
    #[serde(rename = "gray")]
    #[strum(serialize = "gray")]
    Maintenance,
}
