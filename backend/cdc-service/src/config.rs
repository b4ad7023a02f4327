use crate::handlers::ClosureWindowPolicy;

/// Service-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct CdcConfig {
    /// Kafka brokers (comma-separated)
    pub brokers: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Max connections for the service pool
    pub max_db_connections: u32,
    /// Window policy applied by the temporal-closure cascade.
    ///
    /// The two observed variants (same-day vs. 5-day window) are both kept
    /// selectable until product settles the discrepancy; the wide window is
    /// the default.
    pub closure_window: ClosureWindowPolicy,
}

impl CdcConfig {
    pub fn from_env() -> Self {
        Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "kafka:9092".to_string()),
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            max_db_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            closure_window: match std::env::var("CDC_CLOSURE_WINDOW").as_deref() {
                Ok("same-day") => ClosureWindowPolicy::SameDay,
                _ => ClosureWindowPolicy::Wide,
            },
        }
    }
}
