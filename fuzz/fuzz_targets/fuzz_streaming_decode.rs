#![no_main]

use bytes::BytesMut;
use clickhouse_connector::protocol::decode::{decode_line, next_line_from, trailing_line};
use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

#[derive(Debug)]
struct StreamingInput {
    data: Vec<u8>,
    split_points: Vec<u8>,
}

impl<'a> Arbitrary<'a> for StreamingInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        let data: Vec<u8> = u.arbitrary()?;
        let split_points: Vec<u8> = u.arbitrary()?;
        Ok(Self { data, split_points })
    }
}

fuzz_target!(|input: StreamingInput| {
    let mut splits: Vec<usize> = input
        .split_points
        .iter()
        .map(|&b| (b as usize) % (input.data.len() + 1))
        .collect();
    splits.push(0);
    splits.push(input.data.len());
    splits.sort_unstable();
    splits.dedup();

    let mut buf = BytesMut::new();
    let mut scanned = 0;
    for window in splits.windows(2) {
        buf.extend_from_slice(&input.data[window[0]..window[1]]);
        while let Ok(Some(line)) = next_line_from(&mut buf, &mut scanned) {
            let _ = decode_line(&line);
        }
    }
    if let Some(line) = trailing_line(&mut buf) {
        let _ = decode_line(&line);
    }
    assert!(buf.is_empty());
});
