#![allow(dead_code)]

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use night_checks::app::{AppState, router};
use night_checks::config::Config;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const SECRET: &str = "integration-test-secret";
pub const BOUNDARY: &str = "night-check-boundary";

/// What the fake Google host serves.
#[derive(Default)]
pub struct Fixtures {
    /// Sheet ID (or `id:gid`) to CSV body
    pub sheets: HashMap<String, String>,
    /// Drive file ID to (content type, body)
    pub files: HashMap<String, (String, Vec<u8>)>,
}

impl Fixtures {
    pub fn sheet(mut self, id: &str, csv: &str) -> Self {
        self.sheets.insert(id.to_string(), csv.to_string());
        self
    }

    pub fn file(mut self, id: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.files
            .insert(id.to_string(), (content_type.to_string(), body));
        self
    }
}

async fn export(
    State(fixtures): State<Arc<Fixtures>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let keyed = params.get("gid").map(|gid| format!("{}:{}", id, gid));
    let body = keyed
        .and_then(|key| fixtures.sheets.get(&key))
        .or_else(|| fixtures.sheets.get(&id));
    match body {
        Some(csv) => ([(header::CONTENT_TYPE, "text/csv")], csv.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn download(
    State(fixtures): State<Arc<Fixtures>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let file = params.get("id").and_then(|id| fixtures.files.get(id));
    match file {
        Some((content_type, body)) => {
            ([(header::CONTENT_TYPE, content_type.clone())], body.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve `fixtures` on an ephemeral local port; returns the base URL
pub async fn spawn_fake_google(fixtures: Fixtures) -> String {
    let app = Router::new()
        .route("/spreadsheets/d/:id/export", get(export))
        .route("/uc", get(download))
        .with_state(Arc::new(fixtures));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// The report router wired to a fake Google host
pub fn app(base_url: &str, template_path: &std::path::Path) -> Router {
    let template_path = template_path.to_string_lossy().to_string();
    let config = Config::from_lookup(|key| match key {
        "SECRET_KEY" => Some(SECRET.to_string()),
        "NIGHT_CHECK_SHEET_URL" => Some("https://docs.google.com/spreadsheets/d/night/edit".to_string()),
        "SHEETS_BASE_URL" | "DRIVE_BASE_URL" => Some(base_url.to_string()),
        "TEMPLATE_PATH" => Some(template_path.clone()),
        _ => None,
    })
    .unwrap();
    router(AppState::new(config).unwrap())
}

/// A template showing the site, date and observation, then every image
pub fn template_docx() -> Vec<u8> {
    let document = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>",
        "<w:p><w:r><w:t>Site: {{ site_name }} ({{ zone }}/{{ unit_code }})</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>Date: {{ date }}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>Observation: {{ observation }}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{%p for img in images %}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{{ img }}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p>",
        "</w:body></w:document>"
    );
    let content_types = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
        "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
        "</Types>"
    );
    let rels = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"></Relationships>"
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in [
        ("[Content_Types].xml", content_types),
        ("word/document.xml", document),
        ("word/_rels/document.xml.rels", rels),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A `multipart/form-data` body with text fields and an optional `template_file`
pub fn multipart(fields: &[(&str, &str)], template: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        write!(
            body,
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        )
        .unwrap();
    }
    if let Some((file_name, bytes)) = template {
        write!(
            body,
            "--{}\r\nContent-Disposition: form-data; name=\"template_file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, file_name
        )
        .unwrap();
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{}--\r\n", BOUNDARY).unwrap();
    body
}

/// Every entry of a ZIP archive, in archive order
pub fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

/// `word/document.xml` of a rendered report
pub fn document_xml(docx: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut file = archive.by_name("word/document.xml").unwrap();
    let mut xml = String::new();
    file.read_to_string(&mut xml).unwrap();
    xml
}
