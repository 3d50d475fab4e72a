// Counter names for tiered storage metrics
pub const PROXY_READ_COUNTER: &str = "storage_proxy_read_total";
pub const PROXY_BACKFILL_ERROR_COUNTER: &str = "storage_proxy_backfill_errors_total";
pub const BATCH_SKIPPED_COUNTER: &str = "storage_batch_skipped_total";
