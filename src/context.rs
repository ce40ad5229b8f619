use serde::Serialize;

use crate::sheet::{DATE_COLUMN, Row};
use crate::site::parse_site_name;

/// Column holding the `zone-unit-sitename` string
pub const SITE_COLUMN: &str = "Site Name";

/// Column holding comma-separated image share links
pub const IMAGES_COLUMN: &str = "Images";

/// The text fields a report template can reference.
///
/// Every field is always present; a missing cell is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    pub zone: String,
    pub unit_code: String,
    pub site_name: String,
    pub date: String,
    pub time: String,
    pub attendance_register: String,
    pub handling_register: String,
    pub material_register: String,
    pub grooming: String,
    pub alertness: String,
    pub post_discipline: String,
    pub overall_rating: String,
    pub observation: String,
    pub inspected_by: String,
}

impl RenderContext {
    /// Map one sheet row onto the template fields
    ///
    /// `site_name` falls back to the raw `Site Name` cell when splitting leaves
    /// it empty. `date` is `DD/MM/YYYY` when the row's date parsed, otherwise
    /// the raw `Date` cell.
    pub fn from_row(row: &Row) -> Self {
        let site = parse_site_name(row.get(SITE_COLUMN));
        let site_name = if site.site_name.is_empty() {
            row.text_or(SITE_COLUMN, "")
        } else {
            site.site_name
        };

        let date = match row.parsed_date() {
            Some(parsed) => parsed.format("%d/%m/%Y").to_string(),
            None => row.text_or(DATE_COLUMN, ""),
        };

        RenderContext {
            zone: site.zone,
            unit_code: site.unit_code,
            site_name,
            date,
            time: row.text_or("Time", ""),
            attendance_register: row.text_or("Documentation Check [Attendance Register]", ""),
            handling_register: row
                .text_or("Documentation Check [Handling / Taking Over Register]", ""),
            material_register: row.text_or("Documentation Check [Visitor Log Register]", ""),
            grooming: row.text_or("Performance Check [Grooming]", ""),
            alertness: row.text_or("Performance Check [Alertness]", ""),
            post_discipline: row.text_or("Performance Check [Post Discipline]", ""),
            overall_rating: row.text_or("Performance Check [Overall Rating]", ""),
            observation: row.text_or("Observation", ""),
            inspected_by: row.text_or("Inspected By", ""),
        }
    }

    /// Field name and value pairs, in template order
    pub fn fields(&self) -> [(&'static str, &str); 14] {
        [
            ("zone", self.zone.as_str()),
            ("unit_code", self.unit_code.as_str()),
            ("site_name", self.site_name.as_str()),
            ("date", self.date.as_str()),
            ("time", self.time.as_str()),
            ("attendance_register", self.attendance_register.as_str()),
            ("handling_register", self.handling_register.as_str()),
            ("material_register", self.material_register.as_str()),
            ("grooming", self.grooming.as_str()),
            ("alertness", self.alertness.as_str()),
            ("post_discipline", self.post_discipline.as_str()),
            ("overall_rating", self.overall_rating.as_str()),
            ("observation", self.observation.as_str()),
            ("inspected_by", self.inspected_by.as_str()),
        ]
    }
}
