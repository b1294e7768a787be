use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{JournalError, Result};
use crate::performance::{
    GradeEvent, NewGradeEvent, PointTable, Snapshot, DEFAULT_TARGET_POINTS,
};
use crate::store::{GradeStore, Recorded};

/// A grade as supplied by a caller, before points are assigned.
#[derive(Debug, Clone)]
pub struct GradeInput {
    pub student_id: i64,
    pub subject_id: i64,
    pub kind: String,
    pub raw_value: Option<String>,
    pub occurred_on: NaiveDate,
    pub comment: String,
    pub source_key: Option<String>,
}

impl GradeInput {
    pub fn new(student_id: i64, subject_id: i64, kind: &str, occurred_on: NaiveDate) -> Self {
        Self {
            student_id,
            subject_id,
            kind: kind.to_string(),
            raw_value: None,
            occurred_on,
            comment: String::new(),
            source_key: None,
        }
    }
}

/// Turns grade events into per-(student, subject) point totals.
pub struct PerformanceAggregator<S> {
    store: S,
    points: PointTable,
    target_points: f64,
}

impl<S: GradeStore> PerformanceAggregator<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, PointTable::default(), DEFAULT_TARGET_POINTS)
    }

    pub fn with_config(store: S, points: PointTable, target_points: f64) -> Self {
        Self {
            store,
            points,
            target_points,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target_points(&self) -> f64 {
        self.target_points
    }

    pub async fn record_event(
        &self,
        student_id: i64,
        subject_id: i64,
        kind: &str,
        occurred_on: NaiveDate,
    ) -> Result<GradeEvent> {
        let recorded = self
            .record(GradeInput::new(student_id, subject_id, kind, occurred_on))
            .await?;
        Ok(recorded.event)
    }

    pub async fn record(&self, input: GradeInput) -> Result<Recorded> {
        let kind = input.kind.trim().to_string();
        if kind.is_empty() {
            return Err(JournalError::Invalid("grade kind must not be empty".into()));
        }

        let points = self.points.points_for(&kind);
        let event = NewGradeEvent {
            student_id: input.student_id,
            subject_id: input.subject_id,
            raw_value: input.raw_value.unwrap_or_else(|| kind.clone()),
            kind,
            points,
            occurred_on: input.occurred_on,
            comment: input.comment,
            source_key: input.source_key,
        };

        let recorded = self.store.record(event, self.target_points).await?;
        info!(
            event_id = recorded.event.id,
            student_id = recorded.event.student_id,
            subject_id = recorded.event.subject_id,
            kind = %recorded.event.kind,
            points = recorded.event.points,
            total = recorded.aggregate.total_points,
            "grade recorded"
        );
        Ok(recorded)
    }

    pub async fn remove_event(&self, event_id: i64) -> Result<Recorded> {
        let removed = self.store.remove(event_id, self.target_points).await?;
        info!(
            event_id,
            student_id = removed.event.student_id,
            subject_id = removed.event.subject_id,
            total = removed.aggregate.total_points,
            "grade removed"
        );
        Ok(removed)
    }

    /// A pair without any recorded grade reports zero points.
    pub async fn snapshot(&self, student_id: i64, subject_id: i64) -> Result<Snapshot> {
        let snapshot = match self.store.aggregate(student_id, subject_id).await? {
            Some(aggregate) => Snapshot::from(&aggregate),
            None => Snapshot::compute(0.0, self.target_points),
        };
        debug!(student_id, subject_id, total = snapshot.total, status = %snapshot.status, "snapshot");
        Ok(snapshot)
    }

    pub async fn rebuild(&self) -> Result<usize> {
        let count = self.store.rebuild(self.target_points).await?;
        info!(aggregates = count, "aggregates rebuilt from grade events");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::performance::{total_points, Status};
    use crate::store::MemoryGradeStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    async fn aggregator() -> PerformanceAggregator<MemoryGradeStore> {
        let store = MemoryGradeStore::new();
        for id in [1, 2] {
            store.add_student(id).await;
            store.add_subject(id).await;
        }
        PerformanceAggregator::new(store)
    }

    async fn assert_total_matches_events(agg: &PerformanceAggregator<MemoryGradeStore>, student: i64, subject: i64) {
        let events = agg.store().events(student, subject).await.unwrap();
        let snapshot = agg.snapshot(student, subject).await.unwrap();
        assert_eq!(snapshot.total, total_points(&events));
    }

    #[tokio::test]
    async fn grade_scenario_moves_through_status_bands() {
        let agg = aggregator().await;
        for kind in ["numeric_5", "numeric_4", "plus"] {
            agg.record_event(1, 1, kind, day(2)).await.unwrap();
        }
        let snap = agg.snapshot(1, 1).await.unwrap();
        assert_eq!(snap.total, 10.0);
        assert_eq!(snap.remaining, 11.0);
        assert!((snap.progress_pct - 47.6).abs() < 0.05);
        assert_eq!(snap.status, Status::Danger);

        agg.record_event(1, 1, "numeric_5", day(3)).await.unwrap();
        let snap = agg.snapshot(1, 1).await.unwrap();
        assert_eq!(snap.total, 15.0);
        assert!((snap.progress_pct - 71.4).abs() < 0.05);
        assert_eq!(snap.status, Status::Warning);

        agg.record_event(1, 1, "numeric_4", day(4)).await.unwrap();
        agg.record_event(1, 1, "numeric_4", day(5)).await.unwrap();
        let snap = agg.snapshot(1, 1).await.unwrap();
        assert_eq!(snap.total, 23.0);
        assert_eq!(snap.remaining, 0.0);
        assert_eq!(snap.progress_pct, 100.0);
        assert_eq!(snap.status, Status::Success);
    }

    #[tokio::test]
    async fn recorded_event_carries_table_points() {
        let agg = aggregator().await;
        let event = agg.record_event(1, 2, "minus", day(2)).await.unwrap();
        assert_eq!(event.points, 0.0);
        assert_eq!(event.raw_value, "minus");

        let event = agg.record_event(1, 2, "custom", day(2)).await.unwrap();
        assert_eq!(event.points, 1.0);
    }

    #[tokio::test]
    async fn removal_recomputes_from_remaining_events() {
        let agg = aggregator().await;
        let first = agg.record_event(1, 1, "numeric_5", day(2)).await.unwrap();
        agg.record_event(1, 1, "numeric_3", day(3)).await.unwrap();
        agg.record_event(2, 1, "numeric_4", day(3)).await.unwrap();

        let removed = agg.remove_event(first.id).await.unwrap();
        assert_eq!(removed.event.id, first.id);
        assert_eq!(removed.aggregate.total_points, 3.0);

        assert_total_matches_events(&agg, 1, 1).await;
        assert_eq!(agg.snapshot(2, 1).await.unwrap().total, 4.0);
    }

    #[tokio::test]
    async fn totals_track_events_across_mixed_mutations() {
        let agg = aggregator().await;
        let kinds = ["numeric_5", "plus", "minus", "question", "numeric_2", "other"];
        let mut ids = Vec::new();
        for (i, kind) in kinds.iter().enumerate() {
            let subject = if i % 2 == 0 { 1 } else { 2 };
            let event = agg.record_event(1, subject, kind, day(2)).await.unwrap();
            ids.push(event.id);
        }
        agg.remove_event(ids[0]).await.unwrap();
        agg.remove_event(ids[3]).await.unwrap();
        agg.record_event(1, 1, "numeric_3", day(9)).await.unwrap();

        assert_total_matches_events(&agg, 1, 1).await;
        assert_total_matches_events(&agg, 1, 2).await;
        assert_eq!(agg.snapshot(1, 1).await.unwrap().total, 3.0 + 0.0 + 2.0);
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let agg = aggregator().await;
        let err = agg.record_event(9, 1, "plus", day(2)).await.unwrap_err();
        assert!(matches!(err, JournalError::NotFound { entity: "student", id: 9 }));

        let err = agg.record_event(1, 9, "plus", day(2)).await.unwrap_err();
        assert!(matches!(err, JournalError::NotFound { entity: "subject", id: 9 }));

        let err = agg.remove_event(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_pair_snapshot_is_zero() {
        let agg = aggregator().await;
        let snap = agg.snapshot(2, 2).await.unwrap();
        assert_eq!(snap.total, 0.0);
        assert_eq!(snap.target, 21.0);
        assert_eq!(snap.remaining, 21.0);
        assert_eq!(snap.status, Status::Danger);
    }

    #[tokio::test]
    async fn duplicate_source_key_is_rejected() {
        let agg = aggregator().await;
        let mut input = GradeInput::new(1, 1, "plus", day(2));
        input.source_key = Some("import-1".into());
        agg.record(input.clone()).await.unwrap();

        let err = agg.record(input).await.unwrap_err();
        assert!(matches!(err, JournalError::Duplicate(_)));
        assert_eq!(agg.snapshot(1, 1).await.unwrap().total, 1.0);
    }

    #[tokio::test]
    async fn rebuild_repairs_drifted_cache() {
        let agg = aggregator().await;
        agg.record_event(1, 1, "numeric_4", day(2)).await.unwrap();
        agg.store().overwrite_total(1, 1, 99.0).await;
        assert_eq!(agg.snapshot(1, 1).await.unwrap().total, 99.0);

        assert_eq!(agg.rebuild().await.unwrap(), 1);
        assert_eq!(agg.snapshot(1, 1).await.unwrap().total, 4.0);
    }

    #[tokio::test]
    async fn custom_target_changes_bands() {
        let store = MemoryGradeStore::new();
        store.add_student(1).await;
        store.add_subject(1).await;
        let agg = PerformanceAggregator::with_config(store, PointTable::default(), 10.0);

        agg.record_event(1, 1, "numeric_5", day(2)).await.unwrap();
        agg.record_event(1, 1, "numeric_2", day(2)).await.unwrap();
        let snap = agg.snapshot(1, 1).await.unwrap();
        assert_eq!(snap.target, 10.0);
        assert_eq!(snap.status, Status::Warning);
    }

    #[tokio::test]
    async fn blank_kind_is_invalid() {
        let agg = aggregator().await;
        let err = agg.record_event(1, 1, "  ", day(2)).await.unwrap_err();
        assert!(matches!(err, JournalError::Invalid(_)));
    }

    #[tokio::test]
    async fn rebuild_applies_new_target() {
        let store = MemoryGradeStore::new();
        store.add_student(1).await;
        store.add_subject(1).await;
        let agg = PerformanceAggregator::new(store);
        agg.record_event(1, 1, "numeric_5", day(2)).await.unwrap();
        assert_eq!(agg.snapshot(1, 1).await.unwrap().target, 21.0);

        let PerformanceAggregator { store, points, .. } = agg;
        let agg = PerformanceAggregator::with_config(store, points, 10.0);
        assert_eq!(agg.rebuild().await.unwrap(), 1);

        let snap = agg.snapshot(1, 1).await.unwrap();
        assert_eq!(snap.target, 10.0);
        assert_eq!(snap.remaining, 5.0);
        assert_eq!(snap.status, Status::Warning);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_keep_total_consistent() {
        let agg = Arc::new(aggregator().await);
        let kinds = ["numeric_5", "numeric_4", "plus", "minus", "question", "numeric_3"];

        let mut tasks = Vec::new();
        for i in 0..48 {
            let agg = Arc::clone(&agg);
            let kind = kinds[i % kinds.len()];
            tasks.push(tokio::spawn(async move {
                let event = agg.record_event(1, 1, kind, day(2)).await.unwrap();
                if i % 3 == 0 {
                    agg.remove_event(event.id).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let events = agg.store().events(1, 1).await.unwrap();
        assert_eq!(events.len(), 32);
        assert_total_matches_events(&agg, 1, 1).await;
    }
}
