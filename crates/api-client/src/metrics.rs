//! Pipeline metrics
//!
//! Counters recorded by the request pipeline:
//!
//! - `api_requests_total` (counter): labels `status`, `method`
//! - `api_retries_total` (counter): label `reason`
//! - `api_refreshes_total` (counter): label `outcome`
//! - `api_errors_total` (counter): label `kind`
//!
//! No recorder is installed here; the embedding application decides if and
//! how metrics are exported. Without a recorder these calls are no-ops.

/// Record a completed request attempt with its final status.
pub fn record_request(status: u16, method: &str) {
    metrics::counter!(
        "api_requests_total",
        "status" => status.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

/// Record a scheduled retry with a classification label.
pub fn record_retry(reason: &str) {
    metrics::counter!("api_retries_total", "reason" => reason.to_string()).increment(1);
}

/// Record a credential refresh outcome ("ok" or "failed").
pub fn record_refresh(outcome: &str) {
    metrics::counter!("api_refreshes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a normalized error leaving the pipeline.
pub fn record_error(kind: &str) {
    metrics::counter!("api_errors_total", "kind" => kind.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_request(200, "GET");
        record_retry("transport");
        record_refresh("ok");
        record_error("validation");
    }

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() because only one
    /// global recorder can exist per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn request_counter_carries_status_and_method() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET");
        record_request(503, "POST");

        let output = handle.render();
        assert!(output.contains("api_requests_total"));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("status=\"503\""));
        assert!(output.contains("method=\"POST\""));
    }

    #[test]
    fn retry_refresh_and_error_counters_render_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_retry("server_error");
        record_refresh("failed");
        record_error("auth_expired");

        let output = handle.render();
        assert!(output.contains("api_retries_total"));
        assert!(output.contains("reason=\"server_error\""));
        assert!(output.contains("api_refreshes_total"));
        assert!(output.contains("outcome=\"failed\""));
        assert!(output.contains("api_errors_total"));
        assert!(output.contains("kind=\"auth_expired\""));
    }
}
