use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::Mutex;

use crate::error::{JournalError, Result};
use crate::performance::{total_points, GradeEvent, NewGradeEvent, PerformanceAggregate};

/// Outcome of a grade mutation: the event touched and the recomputed aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub event: GradeEvent,
    pub aggregate: PerformanceAggregate,
}

/// Persistence for grade events and their per-pair aggregates.
///
/// `record` and `remove` must apply the event change and the recomputed
/// aggregate atomically, serialised per (student, subject) pair. The
/// aggregate is always rebuilt from the full event list of the pair.
#[allow(async_fn_in_trait)]
pub trait GradeStore {
    async fn record(&self, event: NewGradeEvent, target_points: f64) -> Result<Recorded>;

    async fn remove(&self, event_id: i64, target_points: f64) -> Result<Recorded>;

    async fn aggregate(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<PerformanceAggregate>>;

    async fn events(&self, student_id: i64, subject_id: i64) -> Result<Vec<GradeEvent>>;

    /// Recomputes every aggregate from its events and resets its target to
    /// `target_points`; returns how many were written.
    async fn rebuild(&self, target_points: f64) -> Result<usize>;
}

#[derive(Debug, Default)]
struct MemoryState {
    students: HashSet<i64>,
    subjects: HashSet<i64>,
    events: BTreeMap<i64, GradeEvent>,
    source_keys: HashMap<String, i64>,
    aggregates: HashMap<(i64, i64), PerformanceAggregate>,
    next_id: i64,
}

impl MemoryState {
    fn recompute(&mut self, student_id: i64, subject_id: i64, target: f64) -> PerformanceAggregate {
        let total = total_points(
            self.events
                .values()
                .filter(|e| e.student_id == student_id && e.subject_id == subject_id),
        );
        let aggregate = self
            .aggregates
            .entry((student_id, subject_id))
            .or_insert(PerformanceAggregate {
                student_id,
                subject_id,
                total_points: 0.0,
                target_points: target,
            });
        aggregate.total_points = total;
        *aggregate
    }
}

/// Process-local store; one lock covers every pair.
#[derive(Debug, Default)]
pub struct MemoryGradeStore {
    state: Mutex<MemoryState>,
}

impl MemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, id: i64) {
        self.state.lock().await.students.insert(id);
    }

    pub async fn add_subject(&self, id: i64) {
        self.state.lock().await.subjects.insert(id);
    }

    /// Overwrites a cached total without touching events.
    #[cfg(test)]
    pub(crate) async fn overwrite_total(&self, student_id: i64, subject_id: i64, total: f64) {
        let mut state = self.state.lock().await;
        if let Some(aggregate) = state.aggregates.get_mut(&(student_id, subject_id)) {
            aggregate.total_points = total;
        }
    }
}

impl GradeStore for MemoryGradeStore {
    async fn record(&self, event: NewGradeEvent, target_points: f64) -> Result<Recorded> {
        let mut state = self.state.lock().await;
        if !state.students.contains(&event.student_id) {
            return Err(JournalError::not_found("student", event.student_id));
        }
        if !state.subjects.contains(&event.subject_id) {
            return Err(JournalError::not_found("subject", event.subject_id));
        }
        if let Some(key) = &event.source_key {
            if state.source_keys.contains_key(key) {
                return Err(JournalError::Duplicate(key.clone()));
            }
        }

        state.next_id += 1;
        if let Some(key) = event.source_key {
            let id = state.next_id;
            state.source_keys.insert(key, id);
        }
        let stored = GradeEvent {
            id: state.next_id,
            student_id: event.student_id,
            subject_id: event.subject_id,
            kind: event.kind,
            raw_value: event.raw_value,
            points: event.points,
            occurred_on: event.occurred_on,
            comment: event.comment,
        };
        state.events.insert(stored.id, stored.clone());
        let aggregate = state.recompute(stored.student_id, stored.subject_id, target_points);

        Ok(Recorded {
            event: stored,
            aggregate,
        })
    }

    async fn remove(&self, event_id: i64, target_points: f64) -> Result<Recorded> {
        let mut state = self.state.lock().await;
        let removed = state
            .events
            .remove(&event_id)
            .ok_or_else(|| JournalError::not_found("grade event", event_id))?;
        state.source_keys.retain(|_, id| *id != event_id);
        let aggregate = state.recompute(removed.student_id, removed.subject_id, target_points);

        Ok(Recorded {
            event: removed,
            aggregate,
        })
    }

    async fn aggregate(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<PerformanceAggregate>> {
        let state = self.state.lock().await;
        Ok(state.aggregates.get(&(student_id, subject_id)).copied())
    }

    async fn events(&self, student_id: i64, subject_id: i64) -> Result<Vec<GradeEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|e| e.student_id == student_id && e.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn rebuild(&self, target_points: f64) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut pairs: HashSet<(i64, i64)> = state.aggregates.keys().copied().collect();
        pairs.extend(state.events.values().map(|e| (e.student_id, e.subject_id)));

        for (student_id, subject_id) in pairs.iter().copied() {
            state.recompute(student_id, subject_id, target_points);
            if let Some(aggregate) = state.aggregates.get_mut(&(student_id, subject_id)) {
                aggregate.target_points = target_points;
            }
        }
        Ok(pairs.len())
    }
}
