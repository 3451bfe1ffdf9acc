#![no_main]

use libfuzzer_sys::fuzz_target;
use certprobe_lib::{match_hostname, parse_der, parse_pem_chain, dn_equal};

fuzz_target!(|data: &[u8]| {
    // Neither DER nor PEM decoding may panic, regardless of input.
    if let Ok(cert) = parse_der(data) {
        let _ = cert.subject.to_string();
        let _ = cert.issuer.to_string();
        let _ = cert.common_name();
        let _ = cert.is_self_issued();
        let _ = cert.subject.summary();
        let _ = dn_equal(&cert.subject, &cert.issuer);
        let _ = match_hostname(&cert, "www.example.com");
        let _ = match_hostname(&cert, "192.0.2.1");
    }

    if let Ok(ders) = parse_pem_chain(data) {
        for der in &ders {
            let _ = parse_der(der);
        }
    }
});
