//! Shutdown flag logging as seen by an operator.

mod common;

use haul_telemetry::shutdown::Shutdown;

use common::LogCapture;

#[test]
fn test_exit_after_signal_logs_no_warning() {
    let logs = LogCapture::default();
    {
        let _guard = logs.install();
        let shutdown = Shutdown::new();
        assert!(shutdown.trigger("SIGTERM"));
        shutdown.complete("consumer finished");
        assert!(shutdown.is_triggered());
    }

    assert_eq!(logs.with_message("Shutdown requested, finishing in-flight work").len(), 1);
    let warnings: Vec<_> = logs.lines().into_iter().filter(|l| l["level"] == "WARN").collect();
    assert!(warnings.is_empty(), "{:?}", warnings);
}

#[test]
fn test_repeated_signal_still_warns() {
    let logs = LogCapture::default();
    {
        let _guard = logs.install();
        let shutdown = Shutdown::new();
        shutdown.trigger("SIGTERM");
        shutdown.trigger("SIGINT");
    }

    let repeated = logs.with_message("Shutdown already in progress, ignoring repeated request");
    assert_eq!(repeated.len(), 1);
    assert_eq!(repeated[0]["fields"]["reason"], "SIGINT");
}
