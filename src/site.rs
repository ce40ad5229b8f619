use crate::sheet::CellValue;

/// The three parts of a `zone-unit-sitename` cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteName {
    pub zone: String,
    pub unit_code: String,
    pub site_name: String,
}

/// Split a `Site Name` cell
///
/// Anything that is not text (a number, or a missing cell) yields three
/// empty parts.
pub fn parse_site_name(raw: Option<&CellValue>) -> SiteName {
    match raw.and_then(CellValue::as_text) {
        Some(text) => split_site_name(text),
        None => SiteName::default(),
    }
}

/// Split `zone-unit-sitename` on the first two hyphens
///
/// The site name keeps any further hyphens. With fewer than two hyphens the
/// whole (trimmed) input is the site name.
///
/// # Examples
/// ```
/// use night_checks::site::split_site_name;
///
/// let site = split_site_name("North - U07 - Gate-2 Warehouse");
/// assert_eq!(site.zone, "North");
/// assert_eq!(site.unit_code, "U07");
/// assert_eq!(site.site_name, "Gate-2 Warehouse");
/// ```
pub fn split_site_name(raw: &str) -> SiteName {
    let parts: Vec<&str> = raw.splitn(3, '-').collect();
    match parts.as_slice() {
        [zone, unit_code, site_name] => SiteName {
            zone: zone.trim().to_string(),
            unit_code: unit_code.trim().to_string(),
            site_name: site_name.trim().to_string(),
        },
        _ => SiteName {
            site_name: raw.trim().to_string(),
            ..SiteName::default()
        },
    }
}
