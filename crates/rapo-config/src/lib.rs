pub mod error;
pub mod section;
pub mod value;

use std::path::{Path, PathBuf};

use ini::Ini;

pub use error::{ConfigError, Result};
pub use section::Section;
pub use value::Value;

pub const SECTIONS: &[&str] = &["SCHEDULER", "DATABASE", "LOGGING", "API"];

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub scheduler: Section,
    pub database: Section,
    pub logging: Section,
    pub api: Section,
}

impl Config {
    pub fn section(&self, name: &str) -> Option<&Section> {
        match name.to_ascii_uppercase().as_str() {
            "SCHEDULER" => Some(&self.scheduler),
            "DATABASE" => Some(&self.database),
            "LOGGING" => Some(&self.logging),
            "API" => Some(&self.api),
            _ => None,
        }
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        match name.to_ascii_uppercase().as_str() {
            "SCHEDULER" => Some(&mut self.scheduler),
            "DATABASE" => Some(&mut self.database),
            "LOGGING" => Some(&mut self.logging),
            "API" => Some(&mut self.api),
            _ => None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Config::default();
        for (section_name, properties) in ini.iter() {
            let Some(section_name) = section_name else { continue };
            let Some(section) = config.section_mut(section_name) else { continue };
            for (key, raw) in properties.iter() {
                section.insert(key, value::normalize(Some(raw)));
            }
        }
        Ok(config)
    }

    /// Resolve the configuration file path: `--config` flag, then
    /// `RAPO_CONFIG`, then `~/.rapo/rapo.ini` (§6.3, Open Question 3).
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Ok(path) = std::env::var("RAPO_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(".rapo").join("rapo.ini"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_sections_and_normalizes_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[DATABASE]\nvendor_name = postgres\npool_size = 5\npool_pre_ping = TRUE\n"
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database.get_str("vendor_name"), Some("postgres"));
        assert_eq!(config.database.get_i64("pool_size"), Some(5));
        assert_eq!(config.database.get_bool("pool_pre_ping"), Some(true));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Config::load(Path::new("/nonexistent/rapo.ini"));
        assert!(result.is_err());
    }
}
