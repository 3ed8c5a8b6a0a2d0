pub const TICKER_PREFIX: &str = "Index_";
pub const ROUNDS: usize = 4;
pub const ROUND_INTERVAL_SECS: i64 = 15;
pub const VOLATILITY: f64 = 0.01;
pub const MAX_BATCH_RECORDS: usize = 500;
pub const STORE_PATH: &str = "ticker_prices.json";
pub const DELIVERY_STREAM: &str = "ticker-delivery-stream";
pub const DELIVERY_PATH: &str = "ticker_delivery.jsonl";
pub const NOTIFY_TOPIC: &str = "ticker-stream-failures";
pub const NOTIFY_OUTBOX_PATH: &str = "ticker_notifications.jsonl";
pub const OPERATOR_NAME: &str = "ticker-stream operator";
pub const SCHEDULE_PERIOD_SECS: u64 = 60;
