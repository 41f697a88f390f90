//! Fuzz target for server version parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rejoin_controller::version::Version;

fuzz_target!(|data: &str| {
    // Should never panic
    if let Ok(version) = data.parse::<Version>() {
        // Display output parses back to the same version
        let reparsed: Version = version.to_string().parse().expect("rendered version parses");
        assert_eq!(reparsed, version);
    }
});
