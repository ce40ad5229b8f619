/*!
# Night Check Reports

Turns the rows of a night-inspection Google Sheet into Word reports, one per
inspected site, built in Rust.

## Overview

Security supervisors record their night rounds in a shared Google Sheet: one
row per site visit with the site, date, time, register checks, performance
ratings, an observation and links to photos on Google Drive. An operator picks
a date, and the application renders every row of that date into a copy of a
DOCX template and hands the documents back as one ZIP archive, or pages
through the rows in the browser first.

## Architecture

### Data Layer
- **sheet**: CSV export parsing, date parsing and filtering
- **site**: `zone-unit-sitename` splitting
- **context**: Row to template-field mapping

### Rendering Layer
- **drive**: Drive share-link resolution and image download
- **docx**: DOCX template rendering with embedded images
- **archive**: ZIP packaging of the rendered documents
- **report**: Template selection and the row-by-row render pipeline

### Web Layer
- **loader**: Sheet CSV export download
- **preview**: Paged single-row preview
- **app**: Routing, form handling and flash notices

## Request Flow

1. Validate the sheet identifier and the `YYYY-MM-DD` date
2. Download the sheet as CSV and keep the rows that fall on the date
3. Map each row to its template fields and download its images
4. Render one document per row and zip them, or show one row at a time

## Routes

- `GET /` - Input form and pending notices
- `POST /` - Multipart form; ZIP download or redirect to the preview
- `GET /preview?sheet_input&gid&date&idx` - One row with previous/next links
- `/static/...` - Stylesheet
*/

pub mod archive;
pub mod config;
pub mod context;
pub mod docx;
pub mod drive;
pub mod error;
pub mod loader;
pub mod preview;
pub mod report;
pub mod sheet;
pub mod site;

#[cfg(feature = "web")]
pub mod app;

pub use config::Config;
pub use context::RenderContext;
pub use docx::{DocxTemplate, InlineImage};
pub use error::{ReportError, Result};
pub use sheet::{Row, Sheet};
