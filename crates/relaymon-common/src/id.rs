use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, OnceLock};

static GENERATOR: OnceLock<Mutex<SnowflakeIdBucket>> = OnceLock::new();

/// Install the generator coordinates, normally from service config.
/// The first installation wins; later calls are ignored, as is a call
/// arriving after an id has already been handed out.
pub fn init(machine_id: i32, node_id: i32) {
    let _ = GENERATOR.set(Mutex::new(SnowflakeIdBucket::new(machine_id, node_id)));
}

/// Generate one snowflake id as a string. Usable without `init`; an
/// uninitialized generator runs with coordinates (0, 0).
pub fn next_id() -> String {
    GENERATOR
        .get_or_init(|| Mutex::new(SnowflakeIdBucket::new(0, 0)))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get_id()
        .to_string()
}
