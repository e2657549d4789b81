#![no_main]

use std::collections::BTreeSet;

use libfuzzer_sys::fuzz_target;
use ready_env::{normalize_package_name, parse_manifest};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    match parse_manifest(&raw) {
        Ok(manifest) => {
            let mut seen = BTreeSet::new();
            for requirement in &manifest.requirements {
                assert!(!requirement.name.trim().is_empty());
                assert!(requirement.line_number >= 1);
                let normalized = normalize_package_name(&requirement.name);
                assert_eq!(normalized, requirement.normalized_name());
                assert!(seen.insert(normalized));
            }
        }
        Err(error) => {
            assert!(!error.to_string().trim().is_empty());
        }
    }
});
