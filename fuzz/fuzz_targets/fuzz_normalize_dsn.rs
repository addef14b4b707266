#![no_main]

use clickhouse_connector::client::{normalize_dsn, TransportInfo};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let once = normalize_dsn(raw);
    let twice = normalize_dsn(&once.url);

    assert_eq!(once.url, twice.url, "normalization must be idempotent");

    let _ = TransportInfo::parse(&once.url);
});
