//! Fuzz target for GTID set parsing and set algebra.
//!
//! Parsing must never panic on arbitrary text, and any set that parses
//! must satisfy the algebra invariants against any other.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rejoin_controller::gtid::GtidSet;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;

    let (Ok(a), Ok(b)) = (a.parse::<GtidSet>(), b.parse::<GtidSet>()) else {
        return;
    };

    // Rendering round-trips
    let reparsed: GtidSet = a.to_string().parse().expect("rendered set parses");
    assert_eq!(reparsed, a);

    let diff = a.difference(&b);
    assert!(diff.is_subset(&a));
    assert!(diff.intersection(&b).is_empty());

    let union = a.union(&b);
    assert!(a.is_subset(&union) && b.is_subset(&union));

    let inter = a.intersection(&b);
    assert!(inter.is_subset(&a) && inter.is_subset(&b));

    // Every errant entry renders as one "uuid:interval" line
    for entry in diff.entries() {
        assert!(!entry.to_string().contains(','));
    }
});
