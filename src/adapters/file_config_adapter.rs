//! INI file configuration adapter.
//!
//! Keys are case-sensitive so `[redirects]` ticker names survive as written.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new_cs();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new_cs();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn section_entries(&self, section: &str) -> Vec<(String, String)> {
        let Some(map) = self.config.get_map_ref().get(section) else {
            return Vec::new();
        };
        let mut entries: Vec<(String, String)> = map
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.trim().to_string())))
            .collect();
        entries.sort();
        entries
    }
}
