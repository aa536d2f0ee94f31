use crate::types::{duration_ms, Operation, ServiceResult, TenantResult};
use serde::Serialize;
use std::time::Duration;

/// Caller-facing totals for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub operation: Operation,
    /// Units requested (services, or tenants for a tenant run).
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Requested units that produced no result.
    pub skipped: usize,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl ExecutionSummary {
    pub fn for_services(
        operation: Operation,
        requested: usize,
        results: &[ServiceResult],
        duration: Duration,
    ) -> Self {
        Self::tally(
            operation,
            requested,
            results.iter().map(|r| r.success),
            duration,
        )
    }

    pub fn for_tenants(
        operation: Operation,
        requested: usize,
        results: &[TenantResult],
        duration: Duration,
    ) -> Self {
        Self::tally(
            operation,
            requested,
            results.iter().map(|r| r.success),
            duration,
        )
    }

    fn tally(
        operation: Operation,
        requested: usize,
        outcomes: impl Iterator<Item = bool>,
        duration: Duration,
    ) -> Self {
        let (mut succeeded, mut failed) = (0, 0);
        for ok in outcomes {
            if ok {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }
        Self {
            operation,
            total: requested,
            succeeded,
            failed,
            skipped: requested.saturating_sub(succeeded + failed),
            duration,
        }
    }

    /// True when nothing failed and nothing was skipped.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, success: bool) -> ServiceResult {
        ServiceResult {
            service_name: name.into(),
            success,
            duration: Duration::from_millis(5),
            error: if success { String::new() } else { "boom".into() },
            output: String::new(),
        }
    }

    #[test]
    fn skipped_is_requested_minus_returned() {
        let results = vec![result("a", true), result("b", false)];
        let summary =
            ExecutionSummary::for_services(Operation::Deploy, 4, &results, Duration::from_secs(2));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn serializes_for_json_output() {
        let summary = ExecutionSummary::for_services(
            Operation::Status,
            1,
            &[result("a", true)],
            Duration::from_millis(1500),
        );
        assert!(summary.is_success());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["operation"], "status");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["skipped"], 0);
    }
}
