use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of an observed unit of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Commit,
    Keyboard,
    Pointer,
    FileSystem,
    /// Keyboard or pointer input reported by a platform idle probe, which can't tell them apart.
    Input,
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityKind::Commit => write!(f, "commit"),
            ActivityKind::Keyboard => write!(f, "keyboard"),
            ActivityKind::Pointer => write!(f, "pointer"),
            ActivityKind::FileSystem => write!(f, "filesystem"),
            ActivityKind::Input => write!(f, "input"),
        }
    }
}

/// A single timestamped activity observation. Created by a VCS reader or a device listener and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub moment: DateTime<Utc>,
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Arc<str>>,
}

impl ActivityEvent {
    pub fn new(moment: DateTime<Utc>, kind: ActivityKind) -> Self {
        Self {
            moment,
            kind,
            author: None,
        }
    }

    pub fn commit(moment: DateTime<Utc>, author: impl Into<Arc<str>>) -> Self {
        Self {
            moment,
            kind: ActivityKind::Commit,
            author: Some(author.into()),
        }
    }
}
