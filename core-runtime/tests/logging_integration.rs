//! Global subscriber installation. Kept to a single test since the global
//! subscriber can be set once per process.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn installed_subscriber_forwards_redacted_events() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_pii_redaction(true)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(
        provider = "onedrive",
        refresh_token = "M.R3_BAY.secret",
        email = "grace@contoso.com",
        "Token refreshed"
    );
    tracing::trace!("below the sink level");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.message, "Token refreshed");
        assert_eq!(entry.fields["provider"], "onedrive");
        assert_eq!(entry.fields["refresh_token"], "[REDACTED]");
        assert_eq!(
            entry.fields["email"],
            redact_if_sensitive("email", "grace@contoso.com")
        );
        assert!(!entry.fields["email"].contains("contoso"));
    }

    assert!(matches!(
        init_logging(LoggingConfig::default()),
        Err(Error::Config(_))
    ));
}
