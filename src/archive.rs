use chrono::NaiveDate;
use log::{info, warn};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::context::SITE_COLUMN;
use crate::error::Result;
use crate::sheet::Row;
use crate::site::parse_site_name;

/// Download name of the archive for `date`
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("night_checks_{}.zip", date)
}

/// Parsed site name with spaces as underscores, or `Site`
pub fn site_slug(row: &Row) -> String {
    let site = parse_site_name(row.get(SITE_COLUMN));
    let name = if site.site_name.is_empty() {
        "Site"
    } else {
        site.site_name.as_str()
    };
    name.replace(' ', "_")
}

/// `<date>_<site-slug>.docx`
pub fn entry_name(date: NaiveDate, row: &Row) -> String {
    format!("{}_{}.docx", date, site_slug(row))
}

/// Zip one rendered document per row
///
/// Entries keep the order in which their names first appear. Two rows with
/// the same site name share one entry name; the later document replaces the
/// earlier one, leaving a single entry.
///
/// # Arguments
/// * `documents` - Rows paired with their rendered `.docx` bytes, in sheet order
/// * `date` - The target date used in every entry name
///
/// # Returns
/// * `Result<Vec<u8>>` - The deflate-compressed ZIP archive
pub fn build_archive(documents: &[(Row, Vec<u8>)], date: NaiveDate) -> Result<Vec<u8>> {
    let mut entries: Vec<(String, &[u8])> = Vec::with_capacity(documents.len());

    for (row, document) in documents {
        let name = entry_name(date, row);
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                warn!("Archive entry {} appears more than once; keeping the last document", name);
                entry.1 = document;
            }
            None => entries.push((name, document)),
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, document) in &entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(document)?;
    }

    let bytes = writer.finish()?.into_inner();
    info!(
        "Built {} with {} entries ({} bytes)",
        archive_file_name(date),
        entries.len(),
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn row(site: &str) -> Row {
        Row::new().with("Site Name", site)
    }

    fn entries(zip: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(zip)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn names_come_from_date_and_site() {
        assert_eq!(archive_file_name(date()), "night_checks_2024-03-05.zip");
        assert_eq!(entry_name(date(), &row("N-U1-Main Gate Two")), "2024-03-05_Main_Gate_Two.docx");
        assert_eq!(entry_name(date(), &row("Warehouse")), "2024-03-05_Warehouse.docx");
        assert_eq!(entry_name(date(), &Row::new()), "2024-03-05_Site.docx");
        assert_eq!(entry_name(date(), &row("77")), "2024-03-05_Site.docx");
        assert_eq!(entry_name(date(), &row("N-U1-")), "2024-03-05_Site.docx");
    }

    #[test]
    fn distinct_sites_get_distinct_entries() {
        let docs = vec![(row("A-1-North Gate"), b"one".to_vec()), (row("A-2-South Gate"), b"two".to_vec())];
        let zip = build_archive(&docs, date()).unwrap();
        assert_eq!(
            entries(&zip),
            vec![
                ("2024-03-05_North_Gate.docx".to_string(), b"one".to_vec()),
                ("2024-03-05_South_Gate.docx".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn same_site_twice_keeps_only_the_last_document() {
        // Colliding names are not de-duplicated: the later row overwrites the earlier entry.
        let docs = vec![(row("A-1-Depot"), b"first".to_vec()), (row("B-2-Depot"), b"second".to_vec())];
        let zip = build_archive(&docs, date()).unwrap();
        assert_eq!(
            entries(&zip),
            vec![("2024-03-05_Depot.docx".to_string(), b"second".to_vec())]
        );
    }

    #[test]
    fn empty_input_gives_empty_archive() {
        let zip = build_archive(&[], date()).unwrap();
        assert!(entries(&zip).is_empty());
    }
}
