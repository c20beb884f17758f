//! Mandatory result columns an analysis control always carries, even when
//! no `result_config` is configured.

pub const RESULT_KEY: &str = "rapo_result_key";
pub const RESULT_VALUE: &str = "rapo_result_value";
pub const RESULT_TYPE: &str = "rapo_result_type";

pub fn mandatory_columns() -> &'static [&'static str] {
    &[RESULT_KEY, RESULT_VALUE, RESULT_TYPE]
}
