//! Configuration access port trait.
//!
//! Sections and keys follow the INI layout: `[backtest]`, `[universe]`,
//! `[scoring]`, `[orders]`, `[margin]`, `[schedule]`, `[data]`, `[report]`,
//! `[indicators]` and `[logging]`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Typed getters return `default` when the key is absent or does not parse.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
