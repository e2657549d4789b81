#![no_main]

use libfuzzer_sys::fuzz_target;
use ready_migrate::parse_descriptor_header;

fuzz_target!(|data: &[u8]| {
    let sql = String::from_utf8_lossy(data);
    let depends_on = parse_descriptor_header(&sql);
    for (index, dependency) in depends_on.iter().enumerate() {
        assert!(!dependency.is_empty());
        assert_eq!(dependency.trim(), dependency.as_str());
        assert!(!dependency.contains(','));
        assert!(!depends_on[..index].contains(dependency));
    }
});
