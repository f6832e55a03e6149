mod report;

use std::time::{Duration, Instant};

pub use report::Reporter;

/// The timing of a single remote call.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation_id: String,
    started: Instant,
    elapsed: Option<Duration>,
    is_error: bool,
}

impl OperationRecord {
    pub fn new(operation_id: String) -> Self {
        Self {
            operation_id,
            started: Instant::now(),
            elapsed: None,
            is_error: false,
        }
    }

    /// Time from creation until the operation was reported, or until now if it has not been.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    fn finish(&mut self, is_error: bool) {
        self.elapsed = Some(self.started.elapsed());
        self.is_error = is_error;
    }
}

/// Complete the record with the outcome of the call and hand it to the reporter.
pub fn report_operation<T, E>(
    reporter: &Reporter,
    mut operation_record: OperationRecord,
    response: &Result<T, E>,
) {
    operation_record.finish(response.is_err());
    log::trace!(
        "Operation {} took {}ms, and failed? {}",
        operation_record.operation_id,
        operation_record.duration().as_millis(),
        operation_record.is_error,
    );
    reporter.add_operation(operation_record);
}
