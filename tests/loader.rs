use assert_matches::assert_matches;

use datavault_explorer::error::VaultError;
use datavault_explorer::loader::{DatasetLoader, DecodeStrategy, TextEncoding};

#[test]
fn utf8_csv_loads_with_reference_counts() {
    let bytes = b"city,state,count\nseattle,wa,10\nportland,or,7\nboise,id,3\n";

    let loaded = DatasetLoader::new().load(bytes).unwrap();
    assert_eq!(loaded.table.row_count(), 3);
    assert_eq!(loaded.table.column_count(), 3);
    assert_eq!(loaded.table.columns, vec!["city", "state", "count"]);
    assert!(!loaded.strategy.describe().is_empty());
}

#[test]
fn first_successful_rung_wins_deterministically() {
    // plain ASCII parses under every rung; the ladder must still report the
    // first one
    let bytes = b"a,b\n1,2\n";

    let loaded = DatasetLoader::without_detection().load(bytes).unwrap();
    assert_eq!(loaded.strategy, DecodeStrategy::Fallback(TextEncoding::Utf8));
    assert_eq!(loaded.table.row_count(), 1);
}

#[test]
fn latin1_bytes_reject_utf8_and_use_fallback() {
    // "José" in Latin-1: 0xE9 is not valid UTF-8 in this position
    let bytes = b"name,city\nJos\xe9,Paris\n";

    let loaded = DatasetLoader::without_detection().load(bytes).unwrap();
    assert_eq!(
        loaded.strategy,
        DecodeStrategy::Fallback(TextEncoding::Windows1252)
    );
    assert_eq!(loaded.table.rows[0][0], "José");
}

#[test]
fn detection_never_claims_utf8_for_invalid_utf8() {
    let bytes = b"name,city\nJos\xe9,Paris\n";

    let loaded = DatasetLoader::new().load(bytes).unwrap();
    match &loaded.strategy {
        DecodeStrategy::Detected(name) => assert_ne!(name, "UTF-8"),
        DecodeStrategy::Fallback(encoding) => assert_ne!(*encoding, TextEncoding::Utf8),
        DecodeStrategy::Spreadsheet => panic!("text input parsed as spreadsheet"),
    }
    assert_eq!(loaded.table.row_count(), 1);
}

#[test]
fn exhausted_strategies_enumerate_every_attempt() {
    // crafted to fail every rung: 0x81 breaks UTF-8 and windows-1252, 0x98
    // breaks windows-1251, the unpaired surrogate breaks UTF-16LE, high
    // bytes break ASCII, and six bytes of noise are no spreadsheet
    let bytes = [0x00, 0x81, 0x98, 0xD8, 0x00, 0xFF];

    let err = DatasetLoader::without_detection().load(&bytes).unwrap_err();
    assert_matches!(err, VaultError::DecodeExhausted { .. });

    let message = err.to_string();
    for attempt in [
        "utf-8",
        "windows-1252",
        "windows-1251",
        "utf-16le",
        "ascii",
        "spreadsheet",
    ] {
        assert!(message.contains(attempt), "missing attempt {attempt}: {message}");
    }
}

#[test]
fn empty_buffer_yields_zero_row_table() {
    let loaded = DatasetLoader::without_detection().load(b"").unwrap();
    assert_eq!(loaded.strategy, DecodeStrategy::Fallback(TextEncoding::Utf8));
    assert_eq!(loaded.table.row_count(), 0);
}

#[test]
fn malformed_lines_are_skipped_not_fatal() {
    let bytes = b"a,b\n1,2\n3,4,5,6\n7,8\n";

    let loaded = DatasetLoader::without_detection().load(bytes).unwrap();
    assert_eq!(loaded.table.row_count(), 2);
    assert_eq!(loaded.table.rows[1], vec!["7", "8"]);
}
