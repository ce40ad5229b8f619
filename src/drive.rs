use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ID_PARAM: Regex = Regex::new(r"id=([A-Za-z0-9_-]+)").unwrap();
    static ref ID_PATH: Regex = Regex::new(r"/d/([A-Za-z0-9_-]+)/").unwrap();
}

/// Seconds allowed for one image download
pub const IMAGE_TIMEOUT_SECS: u64 = 15;

/// Pull the file ID out of a share link (`...?id=<id>` or `.../d/<id>/...`)
pub fn extract_drive_file_id(url: &str) -> Option<String> {
    [&*ID_PARAM, &*ID_PATH]
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Direct download URL for a file ID on `base_url`
pub fn download_url(base_url: &str, file_id: &str) -> String {
    format!("{}/uc?export=download&id={}", base_url, file_id)
}

/// Split an `Images` cell into its non-empty, trimmed links
pub fn split_image_links(images: &str) -> Vec<&str> {
    images
        .split(',')
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .collect()
}

/// Bytes of a downloaded image and the content type the host declared for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl FetchedImage {
    /// Self-contained `data:` URI for inline display
    pub fn to_data_uri(&self) -> String {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        format!("data:{};base64,{}", mime, STANDARD.encode(&self.bytes))
    }
}

#[cfg(feature = "web")]
pub use fetcher::ImageFetcher;

#[cfg(feature = "web")]
mod fetcher {
    use log::debug;
    use reqwest::Client;
    use reqwest::header::CONTENT_TYPE;
    use std::time::Duration;

    use super::{FetchedImage, IMAGE_TIMEOUT_SECS, download_url, extract_drive_file_id, split_image_links};

    /// Downloads share-link images. Every failure is "no image", never an error.
    #[derive(Debug, Clone)]
    pub struct ImageFetcher {
        client: Client,
        base_url: String,
    }

    impl ImageFetcher {
        pub fn new(client: Client, base_url: impl Into<String>) -> Self {
            ImageFetcher {
                client,
                base_url: base_url.into(),
            }
        }

        /// Download one share link
        ///
        /// Returns `None` when the link has no file ID, the request fails or
        /// times out, the status is not a success, or the declared content
        /// type is not `image/*`.
        pub async fn fetch(&self, link: &str) -> Option<FetchedImage> {
            let Some(file_id) = extract_drive_file_id(link) else {
                debug!("No file id in image link {}", link);
                return None;
            };
            let url = download_url(&self.base_url, &file_id);

            let response = match self
                .client
                .get(&url)
                .timeout(Duration::from_secs(IMAGE_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!("Image download failed for {}: {}", url, e);
                    return None;
                }
            };

            if !response.status().is_success() {
                debug!("Image download for {} returned {}", url, response.status());
                return None;
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !content_type.starts_with("image/") {
                debug!("Skipping {}: content type {:?}", url, content_type);
                return None;
            }

            match response.bytes().await {
                Ok(bytes) => Some(FetchedImage {
                    bytes: bytes.to_vec(),
                    content_type,
                }),
                Err(e) => {
                    debug!("Reading image body from {} failed: {}", url, e);
                    None
                }
            }
        }

        /// Download every link of an `Images` cell, one after another, keeping link order
        pub async fn fetch_all(&self, images: &str) -> Vec<FetchedImage> {
            let mut fetched = Vec::new();
            for link in split_image_links(images) {
                if let Some(image) = self.fetch(link).await {
                    fetched.push(image);
                }
            }
            fetched
        }
    }
}
