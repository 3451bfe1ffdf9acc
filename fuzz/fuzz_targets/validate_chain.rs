#![no_main]

use libfuzzer_sys::fuzz_target;
use certprobe_lib::{validate_presented, Verdict, MAX_CHAIN_HOPS};

fuzz_target!(|data: &[u8]| {
    // Split the input into pseudo-certificates on a separator byte so
    // the walker sees multi-element chains, including unparsable ones.
    let ders: Vec<Vec<u8>> = data
        .split(|&b| b == 0xff)
        .map(<[u8]>::to_vec)
        .collect();

    let verdict = Verdict::from(validate_presented(&ders, "www.example.com", 0, MAX_CHAIN_HOPS));
    let _ = verdict.to_string();
    let _ = serde_json::to_string(&verdict.to_response("www.example.com"));
});
