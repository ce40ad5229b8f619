use log::info;
use std::path::Path;

use crate::docx::DocxTemplate;
use crate::error::{ReportError, Result};

/// Pick the template for a request
///
/// An uploaded template wins; otherwise the default file is read from disk.
///
/// # Errors
/// * `ReportError::MissingTemplate` when nothing was uploaded and `default_path` does not exist
/// * `ReportError::Zip` or `ReportError::Template` when the bytes are not a usable `.docx`
pub fn load_template(uploaded: Option<&[u8]>, default_path: &Path) -> Result<DocxTemplate> {
    match uploaded {
        Some(bytes) => DocxTemplate::from_bytes(bytes),
        None if default_path.is_file() => {
            info!("Using default template {}", default_path.display());
            DocxTemplate::from_path(default_path)
        }
        None => Err(ReportError::MissingTemplate),
    }
}

#[cfg(feature = "web")]
pub use pipeline::{build_report_archive, render_row};

#[cfg(feature = "web")]
mod pipeline {
    use chrono::NaiveDate;
    use log::{debug, info};

    use crate::archive::build_archive;
    use crate::context::{IMAGES_COLUMN, RenderContext};
    use crate::docx::{DocxTemplate, IMAGE_WIDTH_INCHES, InlineImage};
    use crate::drive::ImageFetcher;
    use crate::error::Result;
    use crate::sheet::Row;

    /// Render one row into a finished `.docx`
    ///
    /// Images that fail to download, or download as something other than a
    /// picture Word can embed, are left out of the document.
    pub async fn render_row(
        fetcher: &ImageFetcher,
        template: &DocxTemplate,
        row: &Row,
    ) -> Result<Vec<u8>> {
        let context = RenderContext::from_row(row);
        let links = row.text_or(IMAGES_COLUMN, "");

        let mut images = Vec::new();
        for fetched in fetcher.fetch_all(&links).await {
            match InlineImage::new(fetched.bytes, IMAGE_WIDTH_INCHES) {
                Ok(image) => images.push(image),
                Err(e) => debug!("Dropping {} download: {}", fetched.content_type, e),
            }
        }

        template.render(&context, &images)
    }

    /// Render every row and zip the documents
    ///
    /// # Arguments
    /// * `fetcher` - Image downloader shared across rows
    /// * `template` - The template each row is rendered into
    /// * `rows` - Rows already filtered to `date`, in sheet order
    /// * `date` - The target date, used for entry names
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - The ZIP archive bytes
    pub async fn build_report_archive(
        fetcher: &ImageFetcher,
        template: &DocxTemplate,
        rows: Vec<Row>,
        date: NaiveDate,
    ) -> Result<Vec<u8>> {
        info!("Rendering {} night check reports for {}", rows.len(), date);

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let document = render_row(fetcher, template, &row).await?;
            documents.push((row, document));
        }

        build_archive(&documents, date)
    }
}
