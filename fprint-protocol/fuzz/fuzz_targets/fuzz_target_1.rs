#![no_main]

use core::time::Duration;

use fprint_protocol::{ParserConfig, PacketParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // First byte picks the config and the split point, exercising the
    // resumable state machine across arbitrary chunk boundaries rather
    // than only ever feeding one contiguous slice.
    let (control, rest) = data.split_at(1);
    let config = ParserConfig {
        strict_checksum: control[0] & 1 != 0,
    };
    let mut parser = PacketParser::new(config);
    if rest.is_empty() {
        return;
    }
    parser.note_command_sent(fprint_protocol::Opcode::UpChar as u8);

    let split = usize::from(control[0]) % (rest.len() + 1);
    let (first, second) = rest.split_at(split);
    let _ = parser.feed(first, Duration::from_millis(0));
    let _ = parser.feed(second, Duration::from_millis(1));
});
