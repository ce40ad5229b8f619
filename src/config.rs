use std::path::PathBuf;

use crate::error::{ReportError, Result};

/// Process configuration, read once at startup and shared read-only with every request.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signs the flash-notice cookie.
    pub secret_key: String,

    /// Link to the inspection sheet shown on the input form (may be empty).
    pub night_check_sheet_url: String,

    /// Address the web server listens on.
    pub bind_addr: String,

    /// Template used when the operator does not upload one.
    pub template_path: PathBuf,

    /// Host serving `/spreadsheets/d/<id>/export`.
    pub sheets_base_url: String,

    /// Host serving `/uc?export=download`.
    pub drive_base_url: String,
}

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_TEMPLATE_PATH: &str = "template.docx";
const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com";
const DEFAULT_DRIVE_BASE_URL: &str = "https://drive.google.com";

impl Config {
    /// Load the configuration from the process environment
    ///
    /// # Errors
    /// * `ReportError::Config` if `SECRET_KEY` is unset or empty
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Blank values count as unset, so the defaults apply to them too.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let secret_key = get("SECRET_KEY").ok_or(ReportError::Config("SECRET_KEY"))?;

        Ok(Config {
            secret_key,
            night_check_sheet_url: get("NIGHT_CHECK_SHEET_URL").unwrap_or_default(),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            template_path: get("TEMPLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_PATH)),
            sheets_base_url: trim_base(
                get("SHEETS_BASE_URL").unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.to_string()),
            ),
            drive_base_url: trim_base(
                get("DRIVE_BASE_URL").unwrap_or_else(|| DEFAULT_DRIVE_BASE_URL.to_string()),
            ),
        })
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = Config::from_lookup(lookup(&[("NIGHT_CHECK_SHEET_URL", "x")])).unwrap_err();
        assert!(matches!(err, ReportError::Config("SECRET_KEY")));

        let err = Config::from_lookup(lookup(&[("SECRET_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, ReportError::Config("SECRET_KEY")));
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(&[("SECRET_KEY", "s3cret")])).unwrap();
        assert_eq!(config.secret_key, "s3cret");
        assert_eq!(config.night_check_sheet_url, "");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.template_path, PathBuf::from("template.docx"));
        assert_eq!(config.sheets_base_url, "https://docs.google.com");
        assert_eq!(config.drive_base_url, "https://drive.google.com");
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        let config = Config::from_lookup(lookup(&[
            ("SECRET_KEY", "k"),
            ("SHEETS_BASE_URL", "http://127.0.0.1:9000/"),
            ("DRIVE_BASE_URL", "http://127.0.0.1:9001//"),
        ]))
        .unwrap();
        assert_eq!(config.sheets_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.drive_base_url, "http://127.0.0.1:9001");
    }
}
