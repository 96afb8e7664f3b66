/* Shared keylightd error definitions: LightingError aggregates snapshot validation, encoding and
 * transport failures for callers that need a single error type. */
use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;

/* Step of an update sequence a transport failure happened in. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Effect { id: u8 },
    Region { id: u8 },
    Commit { status: u8 },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Effect { id } => write!(f, "effect {id}"),
            Stage::Region { id } => write!(f, "region {id:#04x}"),
            Stage::Commit { status } => write!(f, "commit (status {status:#04x})"),
        }
    }
}

/* Errors that may occur while applying a lighting update. */
#[derive(Debug, Error)]
pub enum LightingError {
    #[error("Snapshot has {actual} keys, model {model} expects {expected}")]
    InputMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Effect {id} has no transitions")]
    EmptyEffect { id: u8 },

    #[error("Effect {id} has {count} transitions, at most {max} fit a packet")]
    TooManyTransitions { id: u8, count: usize, max: usize },

    #[error("{count} distinct effects in one update, at most {max} slots exist")]
    TooManyEffects { count: usize, max: usize },

    #[error("Region {region:#04x} needs {needed} bytes, package size is {package_size}")]
    PacketOverflow {
        region: u8,
        needed: usize,
        package_size: usize,
    },

    #[error("Package size {package_size} is below the minimum of {min}")]
    PackageTooSmall { package_size: usize, min: usize },

    #[error("Transport failed during {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: DriverError,
    },

    #[error("Update queue for {0} is full")]
    QueueFull(String),

    #[error("Device actor for {0} is no longer running")]
    ActorStopped(String),
}
