use chrono::NaiveDate;
use thiserror::Error;

/// Failures surfaced by the tracking core. Each variant carries enough context to be shown to
/// the user verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    /// The VCS history or the recorded device pulses could not be read. An unreadable source is
    /// never reported as an empty one.
    #[error("activity source {source_name} is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("invalid schedule{}: {reason}", .date.map(|d| format!(" for {d}")).unwrap_or_default())]
    InvalidSchedule {
        date: Option<NaiveDate>,
        reason: String,
    },

    /// Lunch was already claimed for the day. Callers usually treat it as "done today".
    #[error("lunch for {date} is already claimed")]
    AlreadyClaimed { date: NaiveDate },

    #[error("lunch ledger is unavailable: {reason}")]
    LedgerUnavailable { reason: String },
}

impl TrackerError {
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_schedule(date: Option<NaiveDate>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            date,
            reason: reason.into(),
        }
    }

    pub fn ledger_unavailable(reason: impl ToString) -> Self {
        Self::LedgerUnavailable {
            reason: reason.to_string(),
        }
    }

    /// Attaches a date to a schedule error raised before the date was known.
    pub fn on_date(self, date: NaiveDate) -> Self {
        match self {
            Self::InvalidSchedule { reason, .. } => Self::InvalidSchedule {
                date: Some(date),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::TrackerError;

    #[test]
    fn test_messages_carry_context() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let error = TrackerError::invalid_schedule(None, "work_end must be after work_start")
            .on_date(date);
        assert_eq!(
            error.to_string(),
            "invalid schedule for 2025-03-04: work_end must be after work_start"
        );

        let error = TrackerError::source_unavailable("git /tmp/repo", "not a git repository");
        assert_eq!(
            error.to_string(),
            "activity source git /tmp/repo is unavailable: not a git repository"
        );
    }
}
