use labspace_core::{init_logging, logging_status};

// One test per binary: the logger is process-global.
#[test]
fn logging_initializes_once_and_rejects_reconfiguration() {
    assert!(logging_status().is_none());
    assert!(init_logging("info", "relative/logs").is_err());
    assert!(init_logging("loud", "/tmp").is_err());

    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let log_dir_str = log_dir.to_str().unwrap();

    init_logging("info", log_dir_str).unwrap();
    init_logging(" INFO ", log_dir_str).unwrap();
    assert!(log_dir.is_dir());

    let (level, active_dir) = logging_status().unwrap();
    assert_eq!(level, "info");
    assert_eq!(active_dir, log_dir);

    let err = init_logging("debug", log_dir_str).unwrap_err();
    assert!(err.contains("level"));
    let other = dir.path().join("elsewhere");
    let err = init_logging("info", other.to_str().unwrap()).unwrap_err();
    assert!(err.contains("refusing to switch"));
}
