//! The alert domain model.
//!
//! An alert is a banner with a scheduled visibility window. The window is
//! stored in UTC and interpreted as the half-open interval `[from, to)`:
//! an alert becomes visible exactly at `from` and stops being visible
//! exactly at `to`. Storage never expires, only visibility does.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::ConfigurationError;

/// A scheduled alert as the store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub window: VisibleWindow,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}

impl Alert {
    /// The representation served by the listing endpoint.
    pub fn to_wire(&self) -> WireAlert {
        WireAlert {
            id: self.id.to_string(),
            title: self.title.clone(),
            message: self.message.clone(),
            interval: self.window,
        }
    }
}

/// The half-open interval `[from, to)` during which an alert is shown.
///
/// Both bounds are UTC. `from == to` is a valid zero-length window; a
/// window whose end precedes its start never constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl VisibleWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::EndBeforeStart { from, to });
        }
        Ok(VisibleWindow { from, to })
    }

    /// Whether the window covers `at`: inclusive of `from`, exclusive of `to`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }

    /// Both bounds rendered in `tz`. Pure; the stored UTC bounds are untouched.
    pub fn localized(&self, tz: Tz) -> (DateTime<Tz>, DateTime<Tz>) {
        (self.from.with_timezone(&tz), self.to.with_timezone(&tz))
    }
}

/// One element of the listing payload, shared by the server (serialize) and
/// the polling client (deserialize). Timestamps are always UTC on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAlert {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub interval: VisibleWindow,
}

/// Resolve the timezone for a request context.
///
/// An explicit timezone wins when it parses; a malformed one falls back to
/// the configured site default so that a broken preference still yields
/// site-local times. With no resolvable default the caller gets an error
/// rather than a silently assumed zone.
pub fn resolve_timezone(
    requested: Option<&str>,
    default: Option<&str>,
) -> Result<Tz, ConfigurationError> {
    if let Some(name) = requested {
        match name.parse::<Tz>() {
            Ok(tz) => return Ok(tz),
            Err(_) => {
                tracing::warn!("unknown timezone {name:?} requested, falling back to the default")
            }
        }
    }
    let name = default.ok_or(ConfigurationError::MissingTimezone)?;
    name.parse::<Tz>()
        .map_err(|_| ConfigurationError::InvalidTimezone(name.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyTitle,
    EndBeforeStart {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::EmptyTitle => write!(f, "alerts require a non-empty title"),
            ValidationError::EndBeforeStart { from, to } => write!(
                f,
                "the visibility window ends ({to}) before it starts ({from})"
            ),
        }
    }
}
