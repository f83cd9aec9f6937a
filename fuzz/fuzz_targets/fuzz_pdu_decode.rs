//! Fuzz target: SMS PDU decoder.
//!
//! Arbitrary bytes must never panic the decoder, and anything it accepts
//! must re-encode to exactly the input.

#![no_main]

use libfuzzer_sys::fuzz_target;

use gsmd::sms::Sms;

fuzz_target!(|data: &[u8]| {
    if let Ok(sms) = Sms::from_bytes(data) {
        let _ = sms.text();
        let _ = sms.concat();
        let bytes = sms.to_bytes().expect("decoded PDU must encode");
        assert_eq!(bytes, data, "re-encoded PDU differs from input");
    }
});
