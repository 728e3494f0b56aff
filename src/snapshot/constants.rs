pub const KEY_PREFIX: &str = "leakr_db_";
pub const KEY_EXTENSION: &str = ".sqlite";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
