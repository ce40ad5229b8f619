use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use handlebars::Handlebars;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::archive::archive_file_name;
use crate::config::Config;
use crate::drive::ImageFetcher;
use crate::error::{ReportError, Result};
use crate::loader::SheetLoader;
use crate::preview::{PreviewQuery, build_preview, preview_url};
use crate::report::{build_report_archive, load_template};
use crate::sheet::parse_target_date;

const FLASH_COOKIE: &str = "night_checks_flash";
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    loader: SheetLoader,
    fetcher: ImageFetcher,
    key: Key,
    pages: Arc<Handlebars<'static>>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.key.clone()
    }
}

impl AppState {
    /// Build the state from the process configuration
    ///
    /// The cookie signing key is the SHA-512 digest of `SECRET_KEY`, so any
    /// non-empty secret is long enough.
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("night-checks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReportError::Fetch(e.to_string()))?;

        let mut pages = Handlebars::new();
        pages
            .register_template_string("index", include_str!("./static/index.html"))
            .map_err(|e| ReportError::Template(e.to_string()))?;
        pages
            .register_template_string("preview", include_str!("./static/preview.html"))
            .map_err(|e| ReportError::Template(e.to_string()))?;

        let key = Key::from(Sha512::digest(config.secret_key.as_bytes()).as_slice());

        Ok(AppState {
            loader: SheetLoader::new(client.clone(), config.sheets_base_url.clone()),
            fetcher: ImageFetcher::new(client, config.drive_base_url.clone()),
            config: Arc::new(config),
            key,
            pages: Arc::new(pages),
        })
    }

    fn render_page<T: Serialize>(&self, name: &str, data: &T) -> Response {
        match self.pages.render(name, data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                warn!("Rendering page {} failed: {}", name, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Unable to render page").into_response()
            }
        }
    }
}

/// Routes of the report generator
///
/// # Routes
/// * `GET /` - input form with pending notices
/// * `POST /` - multipart submission; ZIP download or redirect to the preview
/// * `GET /preview` - one row of the filtered sheet
/// * `/static/*` - stylesheet
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/preview", get(preview))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Serve the report generator until the process is stopped
///
/// # Arguments
/// * `config` - The process configuration
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Error if binding or serving fails
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    let app = router(AppState::new(config)?);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// A one-shot message shown on the next form render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub category: String,
    pub message: String,
}

impl From<&ReportError> for Notice {
    fn from(err: &ReportError) -> Self {
        Notice {
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

fn read_notices(jar: &SignedCookieJar) -> Vec<Notice> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| URL_SAFE_NO_PAD.decode(cookie.value()).ok())
        .and_then(|json| serde_json::from_slice(&json).ok())
        .unwrap_or_default()
}

/// Queue `err` as a notice and send the browser back to the form
fn flash_redirect(jar: SignedCookieJar, err: ReportError) -> Response {
    warn!("{}", err);
    let mut notices = read_notices(&jar);
    notices.push(Notice::from(&err));

    let value = match serde_json::to_vec(&notices) {
        Ok(json) => URL_SAFE_NO_PAD.encode(json),
        Err(_) => return Redirect::to("/").into_response(),
    };
    let cookie = Cookie::build((FLASH_COOKIE, value)).path("/").http_only(true);
    (jar.add(cookie), Redirect::to("/")).into_response()
}

#[derive(Serialize)]
struct IndexPage<'a> {
    night_check_url: &'a str,
    notices: Vec<Notice>,
}

async fn index(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let notices = read_notices(&jar);
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    let page = state.render_page(
        "index",
        &IndexPage {
            night_check_url: &state.config.night_check_sheet_url,
            notices,
        },
    );
    (jar, page).into_response()
}

/// Fields of the `POST /` form.
#[derive(Debug, Default)]
struct SubmitForm {
    sheet_input: String,
    gid: String,
    date: String,
    action: Option<String>,
    template: Option<UploadedTemplate>,
}

#[derive(Debug)]
struct UploadedTemplate {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_form(mut multipart: Multipart) -> Result<SubmitForm> {
    let invalid = |e: axum::extract::multipart::MultipartError| ReportError::InvalidForm(e.to_string());
    let mut form = SubmitForm::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "sheet_input" => form.sheet_input = field.text().await.map_err(invalid)?,
            "gid" => form.gid = field.text().await.map_err(invalid)?,
            "date" => form.date = field.text().await.map_err(invalid)?,
            "action" => form.action = Some(field.text().await.map_err(invalid)?),
            "template_file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(invalid)?;
                // A file input left empty still submits a part with no file name.
                if !file_name.is_empty() {
                    form.template = Some(UploadedTemplate {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn submit(State(state): State<AppState>, jar: SignedCookieJar, multipart: Multipart) -> Response {
    let result = match read_form(multipart).await {
        Ok(form) => handle_submit(&state, form).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(response) => response,
        Err(e) => flash_redirect(jar, e),
    }
}

/// Validate the form, fetch and filter the sheet, then act on `action`
async fn handle_submit(state: &AppState, form: SubmitForm) -> Result<Response> {
    let sheet_input = form.sheet_input.trim();
    let gid = form.gid.trim();
    let date_str = form.date.trim();
    if sheet_input.is_empty() || date_str.is_empty() {
        return Err(ReportError::MissingInput);
    }

    let target = parse_target_date(date_str)?;
    let rows = state
        .loader
        .load(sheet_input, gid)
        .await?
        .into_rows_for_date(target)?;
    if rows.is_empty() {
        return Err(ReportError::NoRecords(target));
    }

    if let Some(upload) = &form.template {
        if !upload.file_name.to_lowercase().ends_with(".docx") {
            return Err(ReportError::TemplateNotDocx);
        }
    }

    match form.action.as_deref().unwrap_or("download_zip") {
        "download_zip" => {
            let uploaded = form.template.as_ref().map(|upload| upload.bytes.as_slice());
            let template = load_template(uploaded, &state.config.template_path)?;
            let zip = build_report_archive(&state.fetcher, &template, rows, target).await?;

            let disposition = format!("attachment; filename=\"{}\"", archive_file_name(target));
            Ok((
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                zip,
            )
                .into_response())
        }
        "preview" => Ok(Redirect::to(&preview_url(sheet_input, gid, date_str, 0)).into_response()),
        _ => Err(ReportError::UnknownAction),
    }
}

async fn preview(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<PreviewQuery>,
) -> Response {
    match build_preview(&state.loader, &state.fetcher, &query).await {
        Ok(page) => state.render_page("preview", &page),
        Err(e) => flash_redirect(jar, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn notice_carries_category_and_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            Notice::from(&ReportError::NoRecords(date)),
            Notice {
                category: "warning".to_string(),
                message: "No records found for 2024-03-05.".to_string(),
            }
        );
        assert_eq!(Notice::from(&ReportError::UnknownAction).category, "error");
    }

    #[test]
    fn failures_redirect_to_the_form_with_a_cookie() {
        let jar = SignedCookieJar::new(Key::from(Sha512::digest(b"test-secret").as_slice()));
        let response = flash_redirect(jar, ReportError::InvalidDate);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with(FLASH_COOKIE));
        assert!(set_cookie.contains("Path=/"));
    }
}
