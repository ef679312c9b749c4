// Shared criterion settings, included from each benchmark file so the
// configuration is typed in exactly one place.

use criterion::Criterion;
use std::time::Duration;

pub fn get_criterion() -> Criterion {
    Criterion::default()
        .sample_size(60)
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2))
}
