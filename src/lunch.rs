//! Once-per-day lunch claims.
//!
//! A claim records the moment lunch started. The break always lasts [LUNCH_DURATION] and, for
//! the claimed day, replaces the lunch window configured in the schedule.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::{
    error::TrackerError,
    storage::json_store::{JsonStore, StoreError},
    utils::time::{date_to_record_name, parse_record_name},
};

pub const LUNCH_DURATION: Duration = Duration::hours(1);

/// Claimed lunch starts as epoch seconds keyed by `YYYY-MM-DD`.
type LedgerDocument = BTreeMap<String, i64>;

/// Claims read from the ledger in one go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LunchClaims {
    claims: BTreeMap<NaiveDate, DateTime<Utc>>,
}

impl LunchClaims {
    fn from_document(document: LedgerDocument) -> Self {
        let claims = document
            .into_iter()
            .filter_map(|(key, seconds)| {
                let date = parse_record_name(&key);
                let start = DateTime::from_timestamp(seconds, 0);
                if date.is_none() || start.is_none() {
                    warn!("Ignoring malformed lunch claim {key:?}: {seconds}");
                }
                Some((date?, start?))
            })
            .collect();
        Self { claims }
    }

    /// `[start, start + 1h)` of the claim for `date`, if any.
    pub fn period(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.claims
            .get(&date)
            .map(|start| (*start, *start + LUNCH_DURATION))
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LunchLedger {
    store: JsonStore<LedgerDocument>,
}

impl LunchLedger {
    pub fn new(store: JsonStore<LedgerDocument>) -> Self {
        Self { store }
    }

    pub fn at(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(JsonStore::new(path))
    }

    pub async fn load(&self) -> Result<LunchClaims, TrackerError> {
        let document = self.store.load().await.map_err(ledger_error)?;
        Ok(LunchClaims::from_document(document))
    }

    pub async fn can_claim(&self, date: NaiveDate) -> Result<bool, TrackerError> {
        Ok(self.load().await?.period(date).is_none())
    }

    /// Records lunch for `date` starting at `start`. The check and the write happen under one
    /// lock, so two concurrent claims for the same day can't both succeed.
    #[instrument(skip(self))]
    pub async fn claim(&self, date: NaiveDate, start: DateTime<Utc>) -> Result<(), TrackerError> {
        let key = date_to_record_name(date);
        let inserted = self
            .store
            .update(|document| -> Result<bool, StoreError> {
                if document.contains_key(&key) {
                    return Ok(false);
                }
                document.insert(key.clone(), start.timestamp());
                Ok(true)
            })
            .await
            .map_err(ledger_error)?;

        if !inserted {
            return Err(TrackerError::AlreadyClaimed { date });
        }
        info!("Lunch claimed for {date} at {start}");
        Ok(())
    }

    pub async fn resolve_period(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, TrackerError> {
        Ok(self.load().await?.period(date))
    }
}

fn ledger_error(error: StoreError) -> TrackerError {
    TrackerError::ledger_unavailable(error)
}
