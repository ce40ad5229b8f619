use crate::sheet::extract_sheet_id;

/// CSV export URL for a sheet
///
/// # Arguments
/// * `base_url` - Host serving `/spreadsheets/d/<id>/export`, without a trailing slash
/// * `sheet_input` - A full sheet URL or a bare sheet ID
/// * `gid` - Worksheet tab ID; blank means the first tab
///
/// # Examples
/// ```
/// use night_checks::loader::export_url;
///
/// assert_eq!(
///     export_url("https://docs.google.com", "https://docs.google.com/spreadsheets/d/abc123/edit", " 42 "),
///     "https://docs.google.com/spreadsheets/d/abc123/export?format=csv&gid=42"
/// );
/// assert_eq!(
///     export_url("https://docs.google.com", "abc123", ""),
///     "https://docs.google.com/spreadsheets/d/abc123/export?format=csv"
/// );
/// ```
pub fn export_url(base_url: &str, sheet_input: &str, gid: &str) -> String {
    let sheet_id = extract_sheet_id(sheet_input);
    let mut url = format!("{}/spreadsheets/d/{}/export?format=csv", base_url, sheet_id);
    let gid = gid.trim();
    if !gid.is_empty() {
        url.push_str("&gid=");
        url.push_str(&urlencoding::encode(gid));
    }
    url
}

#[cfg(feature = "web")]
pub use remote::SheetLoader;

#[cfg(feature = "web")]
mod remote {
    use log::info;
    use reqwest::Client;

    use super::export_url;
    use crate::error::{ReportError, Result};
    use crate::sheet::Sheet;

    /// Fetches published sheets as CSV.
    #[derive(Debug, Clone)]
    pub struct SheetLoader {
        client: Client,
        base_url: String,
    }

    impl SheetLoader {
        pub fn new(client: Client, base_url: impl Into<String>) -> Self {
            SheetLoader {
                client,
                base_url: base_url.into(),
            }
        }

        /// Download and parse one worksheet
        ///
        /// # Errors
        /// * `ReportError::Fetch` on a transport failure, a non-success status,
        ///   or a body that is not CSV
        pub async fn load(&self, sheet_input: &str, gid: &str) -> Result<Sheet> {
            let url = export_url(&self.base_url, sheet_input, gid);
            info!("Fetching sheet export {}", url);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ReportError::Fetch(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ReportError::Fetch(format!("HTTP status {}", status)));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| ReportError::Fetch(e.to_string()))?;
            let sheet = Sheet::from_csv(&body)?;
            info!(
                "Sheet export has {} rows and {} columns",
                sheet.rows.len(),
                sheet.headers.len()
            );
            Ok(sheet)
        }
    }
}
