//! Configuration access port trait.

pub trait ConfigPort {
    /// Trimmed value of `[section] key`; `None` when missing or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// All `key = value` pairs of a section, sorted by key. Keys without a
    /// value are skipped.
    fn section_entries(&self, section: &str) -> Vec<(String, String)>;
}
