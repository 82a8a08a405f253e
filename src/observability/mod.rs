//! Observability for query compilation and execution
//!
//! - Structured logging (JSON lines)
//! - Monotonic counters
//! - Scope-based begin/complete events
//!
//! Observability is read-only: nothing here changes how a query is compiled
//! or executed.
//!
//! ```ignore
//! use colquery::observability::{Logger, ObservationScope};
//!
//! Logger::info("QUERY_PLAN", &[("clause", "status = 'active'")]);
//!
//! let scope = ObservationScope::new("QUERY");
//! // ... run the query ...
//! scope.complete();
//! ```

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, QueryMetrics};
pub use scope::ObservationScope;

/// Hex rendering used in diagnostic fields
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "");
        assert_eq!(hex(&[0x00, 0xab, 0xff]), "00abff");
    }
}
