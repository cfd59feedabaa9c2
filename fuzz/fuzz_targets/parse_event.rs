#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::TableEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Parsing must never panic; a parsed event must survive re-serialization.
    if let Ok(event) = TableEvent::from_json(text) {
        let json = serde_json::to_string(&event).expect("serialize parsed event");
        let again = TableEvent::from_json(&json).expect("reparse serialized event");
        assert_eq!(event, again);
    }
});
