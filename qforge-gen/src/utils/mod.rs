//! Utility modules for qforge-gen

pub mod db_retry;
pub mod pool_monitor;
pub mod retry_policy;

pub use db_retry::{max_lock_wait_ms, retry_on_lock};
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
pub use retry_policy::RetryPolicy;
