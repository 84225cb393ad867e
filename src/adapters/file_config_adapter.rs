//! INI file configuration adapter.

use crate::domain::error::SentinelError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SentinelError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| SentinelError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, SentinelError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| SentinelError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[database]
backend = postgres
conninfo = host=localhost dbname=sentinel
pool_size = 6

[web]
listen = 0.0.0.0:8080

[rules]
default_timezone = America/New_York
trust_client_time = yes

[market_data]
finnhub_api_key =
timeout_secs = slow
"#;

    #[test]
    fn from_string_parses_all_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("database", "conninfo"),
            Some("host=localhost dbname=sentinel".to_string())
        );
        assert_eq!(adapter.get_int("database", "pool_size", 4), 6);
        assert_eq!(
            adapter.get_string("web", "listen"),
            Some("0.0.0.0:8080".to_string())
        );
        assert!(adapter.get_bool("rules", "trust_client_time", false));
    }

    #[test]
    fn missing_keys_and_sections_return_none() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("web", "missing"), None);
        assert_eq!(adapter.get_string("auth", "session_secret"), None);
    }

    #[test]
    fn non_numeric_values_fall_back_to_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("market_data", "timeout_secs", 5), 5);
        assert_eq!(adapter.get_double("database", "backend", 1.5), 1.5);
    }

    #[test]
    fn blank_values_use_string_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string_or("market_data", "finnhub_api_key", "none"),
            "none"
        );
        assert_eq!(
            adapter.get_string_or("rules", "default_timezone", "UTC"),
            "America/New_York"
        );
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[rules]\na = true\nb = On\nc = 0\nd = maybe\n")
                .unwrap();
        assert!(adapter.get_bool("rules", "a", false));
        assert!(adapter.get_bool("rules", "b", false));
        assert!(!adapter.get_bool("rules", "c", true));
        assert!(adapter.get_bool("rules", "d", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[database]\nsqlite_path = /tmp/sentinel.db\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("database", "sqlite_path"),
            Some("/tmp/sentinel.db".to_string())
        );
    }

    #[test]
    fn from_file_reports_the_path_on_error() {
        match FileConfigAdapter::from_file("/nonexistent/path/sentinel.ini") {
            Err(SentinelError::ConfigParse { file, .. }) => {
                assert_eq!(file, "/nonexistent/path/sentinel.ini");
            }
            Err(other) => panic!("expected ConfigParse, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
