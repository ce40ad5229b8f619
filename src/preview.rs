use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;

use crate::context::RenderContext;

/// Query string of `GET /preview`. Every parameter may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreviewQuery {
    pub sheet_input: String,
    pub gid: String,
    pub date: String,
    pub idx: String,
}

/// Position of the previewed row within the filtered rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageNav {
    pub current_index: usize,
    pub total: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

impl PageNav {
    /// Clamp a requested index into `[0, total - 1]`
    ///
    /// # Returns
    /// * `None` if there are no rows to page through
    pub fn clamp(requested: i64, total: usize) -> Option<PageNav> {
        let last = total.checked_sub(1)?;
        let current_index = usize::try_from(requested.max(0)).unwrap_or(last).min(last);
        Some(PageNav {
            current_index,
            total,
            has_prev: current_index > 0,
            has_next: current_index < last,
        })
    }
}

/// Parse the `idx` parameter; anything that is not an integer is 0
///
/// Integers too large for `i64` saturate, so they still clamp to the last row.
pub fn parse_index(idx: &str) -> i64 {
    match idx.trim().parse::<i64>() {
        Ok(idx) => idx,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 0,
        },
    }
}

/// Link to the preview page of one row
pub fn preview_url(sheet_input: &str, gid: &str, date: &str, idx: usize) -> String {
    format!(
        "/preview?sheet_input={}&gid={}&date={}&idx={}",
        urlencoding::encode(sheet_input),
        urlencoding::encode(gid),
        urlencoding::encode(date),
        idx
    )
}

/// Everything the preview page shows for one row.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewPage {
    #[serde(flatten)]
    pub context: RenderContext,
    pub images_html: Vec<String>,
    #[serde(flatten)]
    pub nav: PageNav,
    /// 1-based position for display
    pub position: usize,
    pub sheet_input: String,
    pub gid: String,
    pub date_str: String,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl PreviewPage {
    pub fn new(
        context: RenderContext,
        images_html: Vec<String>,
        nav: PageNav,
        sheet_input: &str,
        gid: &str,
        date_str: &str,
    ) -> Self {
        let link = |idx| preview_url(sheet_input, gid, date_str, idx);
        PreviewPage {
            context,
            images_html,
            nav,
            position: nav.current_index + 1,
            sheet_input: sheet_input.to_string(),
            gid: gid.to_string(),
            date_str: date_str.to_string(),
            prev_url: nav.has_prev.then(|| link(nav.current_index - 1)),
            next_url: nav.has_next.then(|| link(nav.current_index + 1)),
        }
    }
}

#[cfg(feature = "web")]
pub use remote::build_preview;

#[cfg(feature = "web")]
mod remote {
    use log::info;

    use super::{PageNav, PreviewPage, PreviewQuery, parse_index};
    use crate::context::{IMAGES_COLUMN, RenderContext};
    use crate::drive::ImageFetcher;
    use crate::error::{ReportError, Result};
    use crate::loader::SheetLoader;
    use crate::sheet::parse_target_date;

    /// Load the sheet and assemble the preview of the requested row
    ///
    /// # Errors
    /// * `ReportError::MissingPreviewInput` if the sheet or the date is blank
    /// * `ReportError::InvalidDate`, `ReportError::Fetch`, `ReportError::MissingColumn`
    ///   as for the download
    /// * `ReportError::NoRecords` if no row falls on the date
    pub async fn build_preview(
        loader: &SheetLoader,
        fetcher: &ImageFetcher,
        query: &PreviewQuery,
    ) -> Result<PreviewPage> {
        let sheet_input = query.sheet_input.trim();
        let gid = query.gid.trim();
        let date_str = query.date.trim();
        if sheet_input.is_empty() || date_str.is_empty() {
            return Err(ReportError::MissingPreviewInput);
        }

        let target = parse_target_date(date_str)?;
        let rows = loader.load(sheet_input, gid).await?.into_rows_for_date(target)?;

        let nav = PageNav::clamp(parse_index(&query.idx), rows.len())
            .ok_or(ReportError::NoRecords(target))?;
        let Some(row) = rows.into_iter().nth(nav.current_index) else {
            return Err(ReportError::NoRecords(target));
        };
        info!("Previewing row {} of {} for {}", nav.current_index + 1, nav.total, target);

        let images_html = fetcher
            .fetch_all(&row.text_or(IMAGES_COLUMN, ""))
            .await
            .iter()
            .map(|image| image.to_data_uri())
            .collect();

        Ok(PreviewPage::new(
            RenderContext::from_row(&row),
            images_html,
            nav,
            sheet_input,
            gid,
            date_str,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_at_both_ends() {
        let low = PageNav::clamp(-5, 3).unwrap();
        assert_eq!(low.current_index, 0);
        assert!(!low.has_prev);
        assert!(low.has_next);

        let high = PageNav::clamp(99, 3).unwrap();
        assert_eq!(high.current_index, 2);
        assert!(high.has_prev);
        assert!(!high.has_next);

        let middle = PageNav::clamp(1, 3).unwrap();
        assert!(middle.has_prev && middle.has_next);
    }

    #[test]
    fn single_row_has_no_neighbours() {
        let nav = PageNav::clamp(0, 1).unwrap();
        assert_eq!(nav.current_index, 0);
        assert!(!nav.has_prev && !nav.has_next);
    }

    #[test]
    fn nothing_to_page_through() {
        assert_eq!(PageNav::clamp(0, 0), None);
    }

    #[test]
    fn non_numeric_index_is_zero() {
        assert_eq!(parse_index("abc"), 0);
        assert_eq!(parse_index(""), 0);
        assert_eq!(parse_index(" 4 "), 4);
        assert_eq!(parse_index("-2"), -2);
    }

    #[test]
    fn oversized_index_clamps_to_the_ends() {
        assert_eq!(parse_index("99999999999999999999"), i64::MAX);
        assert_eq!(PageNav::clamp(parse_index("99999999999999999999"), 3).unwrap().current_index, 2);
        assert_eq!(PageNav::clamp(parse_index("-99999999999999999999"), 3).unwrap().current_index, 0);
        assert_eq!(parse_index("1e3"), 0);
    }

    #[test]
    fn urls_are_encoded() {
        assert_eq!(
            preview_url("https://x/spreadsheets/d/a b/edit", "", "2024-03-05", 2),
            "/preview?sheet_input=https%3A%2F%2Fx%2Fspreadsheets%2Fd%2Fa%20b%2Fedit&gid=&date=2024-03-05&idx=2"
        );
    }

    #[test]
    fn page_links_neighbours() {
        let nav = PageNav::clamp(1, 3).unwrap();
        let page = PreviewPage::new(RenderContext::default(), Vec::new(), nav, "S", "7", "2024-03-05");
        assert_eq!(page.position, 2);
        assert_eq!(
            page.prev_url.as_deref(),
            Some("/preview?sheet_input=S&gid=7&date=2024-03-05&idx=0")
        );
        assert_eq!(
            page.next_url.as_deref(),
            Some("/preview?sheet_input=S&gid=7&date=2024-03-05&idx=2")
        );

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["current_index"], 1);
        assert_eq!(value["total"], 3);
        assert_eq!(value["site_name"], "");
    }
}
