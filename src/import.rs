use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::aggregator::{GradeInput, PerformanceAggregator};
use crate::error::{JournalError, Result};
use crate::store::GradeStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

#[derive(Deserialize)]
struct GradeRow {
    student_id: i64,
    subject_id: i64,
    kind: String,
    raw_value: Option<String>,
    occurred_on: NaiveDate,
    comment: Option<String>,
    source_key: Option<String>,
}

pub async fn import_csv<S: GradeStore>(
    aggregator: &PerformanceAggregator<S>,
    csv_path: &Path,
) -> Result<ImportSummary> {
    let reader = csv::Reader::from_path(csv_path)?;
    import_reader(aggregator, reader).await
}

/// Rows with an already-imported `source_key` are skipped; rows without one
/// get a fresh key.
pub async fn import_reader<S: GradeStore, R: Read>(
    aggregator: &PerformanceAggregator<S>,
    mut reader: csv::Reader<R>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for result in reader.deserialize::<GradeRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let input = GradeInput {
            student_id: row.student_id,
            subject_id: row.subject_id,
            kind: row.kind,
            raw_value: row.raw_value.filter(|value| !value.is_empty()),
            occurred_on: row.occurred_on,
            comment: row.comment.unwrap_or_default(),
            source_key: Some(source_key),
        };

        match aggregator.record(input).await {
            Ok(_) => summary.inserted += 1,
            Err(JournalError::Duplicate(key)) => {
                warn!(source_key = %key, "skipping already imported grade");
                summary.duplicates += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGradeStore;

    async fn aggregator() -> PerformanceAggregator<MemoryGradeStore> {
        let store = MemoryGradeStore::new();
        store.add_student(1).await;
        store.add_subject(1).await;
        PerformanceAggregator::new(store)
    }

    #[tokio::test]
    async fn imports_rows_and_skips_repeated_keys() {
        let agg = aggregator().await;
        let data = "\
student_id,subject_id,kind,raw_value,occurred_on,comment,source_key
1,1,numeric_5,5,2026-02-02,,row-1
1,1,plus,,2026-02-03,good answer,row-2
1,1,plus,,2026-02-03,,row-2
1,1,question,,2026-02-04,,
";
        let summary = import_reader(&agg, csv::Reader::from_reader(data.as_bytes()))
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { inserted: 3, duplicates: 1 });

        let events = agg.store().events(1, 1).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].raw_value, "5");
        assert_eq!(events[1].raw_value, "plus");
        assert_eq!(events[1].comment, "good answer");
        assert_eq!(agg.snapshot(1, 1).await.unwrap().total, 7.0);
    }

    #[tokio::test]
    async fn unknown_student_aborts_import() {
        let agg = aggregator().await;
        let data = "\
student_id,subject_id,kind,raw_value,occurred_on,comment,source_key
2,1,plus,,2026-02-02,,
";
        let err = import_reader(&agg, csv::Reader::from_reader(data.as_bytes()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
