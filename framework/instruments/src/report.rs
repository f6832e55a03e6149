mod operations_table;

use crate::OperationRecord;
use operations_table::OperationRow;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tabled::settings::Style;
use tabled::Table;

/// Keeps every remote call of an invocation in memory and logs a summary table of them when the
/// invocation finishes.
#[derive(Debug, Default)]
pub struct Reporter {
    operation_records: Mutex<Vec<OperationRecord>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&self, operation_record: OperationRecord) {
        self.operation_records.lock().push(operation_record);
    }

    /// Number of recorded calls for an operation, successful or not.
    pub fn operation_count(&self, operation_id: &str) -> usize {
        self.operation_records
            .lock()
            .iter()
            .filter(|record| record.operation_id == operation_id)
            .count()
    }

    /// Number of recorded calls for an operation that failed.
    pub fn failure_count(&self, operation_id: &str) -> usize {
        self.operation_records
            .lock()
            .iter()
            .filter(|record| record.operation_id == operation_id && record.is_error())
            .count()
    }

    pub fn finalize(&self) {
        let rows = self.summary_rows();
        if rows.is_empty() {
            return;
        }

        let mut table = Table::new(rows);
        table.with(Style::modern());

        log::info!("Summary of remote operations\n{table}");
    }

    fn summary_rows(&self) -> Vec<OperationRow> {
        self.operation_records
            .lock()
            .iter()
            .fold(BTreeMap::new(), |mut acc: BTreeMap<String, Vec<&OperationRecord>>, record| {
                acc.entry(record.operation_id.clone()).or_default().push(record);
                acc
            })
            .into_iter()
            .map(|(operation_id, operations)| {
                let durations_ms = operations
                    .iter()
                    .map(|record| record.duration().as_micros() as f64 / 1000.0)
                    .collect::<Vec<_>>();
                let total_duration_ms = durations_ms.iter().sum::<f64>();

                OperationRow {
                    operation_id,
                    total_operations: operations.len(),
                    failures: operations.iter().filter(|op| op.is_error()).count(),
                    avg_time_ms: total_duration_ms / operations.len() as f64,
                    max_time_ms: durations_ms.iter().copied().fold(0.0, f64::max),
                    total_duration_ms,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_operation;

    #[test]
    fn counts_operations_and_failures() {
        let reporter = Reporter::new();

        let ok: Result<(), ()> = Ok(());
        let failed: Result<(), ()> = Err(());
        report_operation(&reporter, OperationRecord::new("fetch test".to_string()), &ok);
        report_operation(&reporter, OperationRecord::new("fetch test".to_string()), &failed);
        report_operation(&reporter, OperationRecord::new("start run".to_string()), &ok);

        assert_eq!(reporter.operation_count("fetch test"), 2);
        assert_eq!(reporter.failure_count("fetch test"), 1);
        assert_eq!(reporter.operation_count("start run"), 1);

        let rows = reporter.summary_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation_id, "fetch test");
        assert_eq!(rows[0].failures, 1);
    }
}
