#![no_main]

use clickhouse_connector::protocol::decode::decode_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_line(data);
});
