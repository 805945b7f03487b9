//! Fan-out of one status report into independent table inserts.
//!
//! Inserts are best effort: each entity kind is attempted on its own, a
//! failure is logged and recorded in the [`DispatchReport`], and the other
//! kinds are still written. Nothing here returns an error to the caller.

use heater_common::{EntityKind, Record, StatusReport};
use tracing::{info, warn};

use crate::store::{insert_record, RecordStore, StoreError};

#[derive(Debug)]
pub struct InsertOutcome {
    pub kind: EntityKind,
    pub result: Result<(), StoreError>,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<InsertOutcome>,
}

impl DispatchReport {
    pub fn attempted(&self) -> Vec<EntityKind> {
        self.outcomes.iter().map(|outcome| outcome.kind).collect()
    }

    pub fn inserted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.inserted()
    }
}

/// Writes every complete entity in `report`, tagged with `owner`.
pub async fn dispatch(
    store: &dyn RecordStore,
    report: &StatusReport,
    owner: Option<&str>,
) -> DispatchReport {
    let (reading, setting, status, history) = tokio::join!(
        attempt_insert(store, report.reading(), owner),
        attempt_insert(store, report.setting(), owner),
        attempt_insert(store, report.heater_status(), owner),
        attempt_insert(store, report.history(), owner),
    );

    let outcomes: Vec<InsertOutcome> = [reading, setting, status, history]
        .into_iter()
        .flatten()
        .collect();
    let summary = DispatchReport { outcomes };

    if summary.failed() == 0 {
        info!(
            "stored {} record(s) from status report: {:?}",
            summary.inserted(),
            summary.attempted()
        );
    } else {
        warn!(
            "stored {} of {} record(s) from status report",
            summary.inserted(),
            summary.outcomes.len()
        );
    }
    summary
}

/// Inserts `record` if the report produced one and records what happened.
/// Failures stop here.
async fn attempt_insert<R: Record>(
    store: &dyn RecordStore,
    record: Option<R>,
    owner: Option<&str>,
) -> Option<InsertOutcome> {
    let record = record?;
    let result = insert_record(store, &record, owner).await;
    if let Err(err) = &result {
        warn!("failed to store {} record: {err}", R::KIND);
    }
    Some(InsertOutcome {
        kind: R::KIND,
        result,
    })
}
