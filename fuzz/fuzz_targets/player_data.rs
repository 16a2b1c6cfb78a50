//! Arbitrary bytes, raw or gzip-framed, must decode to `Ok` or `Err` and
//! never panic.
#![no_main]

use std::path::Path;

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use vanilla_presence_core::PlayerData;

fuzz_target!(|data: &[u8]| {
    let captured = Utc.timestamp_opt(0, 0).single().unwrap_or_default();
    let _ = PlayerData::from_reader(Path::new("fuzz.dat"), data, captured);
});
