//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_tasks_submitted_total` (counter): tasks admitted, by pool
//! - `dispatch_tasks_rejected_total` (counter): saturation/closed rejections, by pool
//! - `dispatch_tasks_completed_total` (counter): by pool and status
//! - `dispatch_task_duration_seconds` (histogram): execution time, by pool
//! - `dispatch_pool_active` (gauge): computations currently holding a slot
//! - `dispatch_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `dispatch_backpressure_dropped_total` (counter)
//! - `dispatch_resource_cleanup_failures_total` (counter)
//! - `dispatch_timeouts_total` (counter): by operation
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_task_submitted(pool: &str) {
    counter!("dispatch_tasks_submitted_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_task_rejected(pool: &str, reason: &'static str) {
    counter!("dispatch_tasks_rejected_total", "pool" => pool.to_string(), "reason" => reason)
        .increment(1);
}

pub fn record_task_completed(pool: &str, status: &'static str, duration: Duration) {
    counter!("dispatch_tasks_completed_total", "pool" => pool.to_string(), "status" => status)
        .increment(1);
    histogram!("dispatch_task_duration_seconds", "pool" => pool.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_pool_active(pool: &str, active: usize) {
    gauge!("dispatch_pool_active", "pool" => pool.to_string()).set(active as f64);
}

pub fn record_circuit_state(operation: &str, state: u8) {
    gauge!("dispatch_circuit_state", "operation" => operation.to_string()).set(state as f64);
}

pub fn record_backpressure_dropped() {
    counter!("dispatch_backpressure_dropped_total").increment(1);
}

pub fn record_resource_cleanup_failure() {
    counter!("dispatch_resource_cleanup_failures_total").increment(1);
}

pub fn record_timeout(operation: &str) {
    counter!("dispatch_timeouts_total", "operation" => operation.to_string()).increment(1);
}
