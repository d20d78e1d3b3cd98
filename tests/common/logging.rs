use std::sync::Once;

use tracing::level_filters::LevelFilter;

#[allow(dead_code)]
pub static INIT: Once = Once::new();

/// Routes library logs through the test harness so they show up for failing tests.
#[allow(dead_code)]
pub fn tracing_test_init(filter: LevelFilter) {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(filter)
            .with_test_writer()
            .init();
    });
}
