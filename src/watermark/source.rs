//! Source image loading.
//!
//! This module turns an image reference into a decoded bitmap plus the
//! *source descriptor*, the string later used to pick the output format.
//!
//! # Supported Sources
//!
//! - In-memory bytes, with an optional content type
//! - `data:` URLs (base64 or percent-encoded payloads)
//! - Local file paths
//! - `http://` and `https://` URLs
//!
//! # Example
//!
//! ```ignore
//! use stampmark::watermark::source::{ImageLoader, ImageSource};
//!
//! let loader = ImageLoader::new(&RendererConfig::default())?;
//! let decoded = loader.load(&ImageSource::parse("data:image/png;base64,...")).await?;
//! assert_eq!(decoded.descriptor, "data:image/png;base64");
//! ```

use super::WatermarkError;
use crate::config::RendererConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

/// A loadable image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw encoded bytes. Without a content type the mime type is sniffed.
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    /// `data:[<mime>][;base64],<payload>`
    DataUrl(String),
    /// Local file path.
    File(PathBuf),
    /// HTTP(S) URL.
    Url(String),
}

impl ImageSource {
    /// Classify a string reference: `data:` URLs, `http(s)://` URLs, and
    /// everything else as a file path.
    pub fn parse(reference: &str) -> Self {
        if reference.starts_with("data:") {
            ImageSource::DataUrl(reference.to_string())
        } else if reference.starts_with("https://") || reference.starts_with("http://") {
            ImageSource::Url(reference.to_string())
        } else {
            ImageSource::File(PathBuf::from(reference))
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        ImageSource::Bytes {
            data: data.into(),
            content_type: None,
        }
    }

    /// Short description for logs. Data URL payloads are left out.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Bytes { data, .. } => format!("{} bytes", data.len()),
            ImageSource::DataUrl(url) => data_url_header(url).to_string(),
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Url(url) => url.clone(),
        }
    }
}

/// A decoded source image.
#[derive(Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Descriptor used for output format inference.
    pub descriptor: String,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("dimensions", &(self.image.width(), self.image.height()))
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl DecodedImage {
    pub fn new(image: DynamicImage, descriptor: impl Into<String>) -> Self {
        Self {
            image,
            descriptor: descriptor.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Loads and decodes image sources.
#[derive(Clone)]
pub struct ImageLoader {
    http_client: reqwest::Client,
    max_source_bytes: usize,
}

impl ImageLoader {
    /// Create a loader.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkError::ConfigError` if the HTTP client cannot be created.
    pub fn new(config: &RendererConfig) -> Result<Self, WatermarkError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| WatermarkError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            max_source_bytes: config.max_source_bytes,
        })
    }

    /// Read the source and decode it.
    ///
    /// Every failure is reported as `WatermarkError::DecodeError`.
    pub async fn load(&self, source: &ImageSource) -> Result<DecodedImage, WatermarkError> {
        let (data, descriptor) = match source {
            ImageSource::Bytes { data, content_type } => {
                let descriptor = content_type
                    .clone()
                    .unwrap_or_else(|| sniff_mime_type(data).to_string());
                (data.clone(), descriptor)
            }
            ImageSource::DataUrl(url) => {
                let data = decode_data_url(url)?;
                (data, data_url_header(url).to_string())
            }
            ImageSource::File(path) => {
                let read_failed = |e: std::io::Error| {
                    WatermarkError::decode(format!("Failed to read {}: {}", path.display(), e))
                };
                let metadata = tokio::fs::metadata(path).await.map_err(read_failed)?;
                self.check_size(metadata.len())?;
                let data = tokio::fs::read(path).await.map_err(read_failed)?;
                (Bytes::from(data), path.display().to_string())
            }
            ImageSource::Url(url) => (self.fetch(url).await?, url.clone()),
        };

        self.check_size(data.len() as u64)?;

        let image = tokio::task::spawn_blocking(move || decode_image(&data))
            .await
            .map_err(|e| WatermarkError::decode(format!("Decode task failed: {}", e)))??;

        Ok(DecodedImage::new(image, descriptor))
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, WatermarkError> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| WatermarkError::decode(format!("HTTP fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WatermarkError::decode(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        // Chunked bodies carry no Content-Length
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WatermarkError::decode(format!("Failed to read HTTP body: {}", e)))?
        {
            self.check_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }

    /// Reject sources larger than `max_source_bytes` before buffering them.
    fn check_size(&self, size: u64) -> Result<(), WatermarkError> {
        if size > self.max_source_bytes as u64 {
            return Err(WatermarkError::decode(format!(
                "Source is {} bytes, limit is {} bytes",
                size, self.max_source_bytes
            )));
        }
        Ok(())
    }
}

/// Decode encoded image bytes, guessing the format from magic bytes.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, WatermarkError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| WatermarkError::decode(e.to_string()))?
        .decode()
        .map_err(|e| WatermarkError::decode(e.to_string()))
}

/// The part of a data URL before the comma, e.g. `data:image/png;base64`.
fn data_url_header(url: &str) -> &str {
    url.split_once(',').map(|(header, _)| header).unwrap_or(url)
}

/// Decode the payload of a `data:` URL.
fn decode_data_url(url: &str) -> Result<Bytes, WatermarkError> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| WatermarkError::decode("Malformed data URL: missing ','"))?;

    if header.ends_with(";base64") {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64
            .decode(cleaned.as_bytes())
            .map(Bytes::from)
            .map_err(|e| WatermarkError::decode(format!("Invalid base64 in data URL: {}", e)))
    } else {
        Ok(Bytes::from(urlencoding::decode_binary(payload.as_bytes()).into_owned()))
    }
}

/// Mime type from magic bytes, or an empty string if unknown.
fn sniff_mime_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 255]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn loader() -> ImageLoader {
        ImageLoader::new(&RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(
            ImageSource::parse("data:image/png;base64,AAAA"),
            ImageSource::DataUrl("data:image/png;base64,AAAA".to_string())
        );
        assert_eq!(
            ImageSource::parse("https://example.com/a.jpg"),
            ImageSource::Url("https://example.com/a.jpg".to_string())
        );
        assert_eq!(
            ImageSource::parse("http://example.com/a.jpg"),
            ImageSource::Url("http://example.com/a.jpg".to_string())
        );
        assert_eq!(
            ImageSource::parse("photos/a.jpg"),
            ImageSource::File(PathBuf::from("photos/a.jpg"))
        );
    }

    #[test]
    fn test_describe_hides_data_url_payload() {
        let source = ImageSource::parse("data:image/webp;base64,UklGRg==");
        assert_eq!(source.describe(), "data:image/webp;base64");
    }

    #[test]
    fn test_sniff_mime_type() {
        assert_eq!(sniff_mime_type(&png_bytes(1, 1)), "image/png");
        assert_eq!(sniff_mime_type(b"GIF89a......"), "image/gif");
        assert_eq!(sniff_mime_type(b"nothing"), "");
    }

    #[test]
    fn test_decode_data_url_base64() {
        let png = png_bytes(3, 2);
        let url = format!("data:image/png;base64,{}", BASE64.encode(&png));
        assert_eq!(decode_data_url(&url).unwrap(), Bytes::from(png));
    }

    #[test]
    fn test_decode_data_url_percent_encoded() {
        let data = decode_data_url("data:text/plain,a%20b").unwrap();
        assert_eq!(&data[..], b"a b");
    }

    #[test]
    fn test_decode_data_url_malformed() {
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn test_load_bytes_sniffs_descriptor() {
        let decoded = loader()
            .load(&ImageSource::from_bytes(png_bytes(7, 5)))
            .await
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
        assert_eq!(decoded.descriptor, "image/png");
    }

    #[tokio::test]
    async fn test_load_bytes_with_content_type() {
        let source = ImageSource::Bytes {
            data: Bytes::from(png_bytes(2, 2)),
            content_type: Some("image/webp".to_string()),
        };
        let decoded = loader().load(&source).await.unwrap();
        assert_eq!(decoded.descriptor, "image/webp");
    }

    #[tokio::test]
    async fn test_load_data_url() {
        let url = format!("data:image/png;base64,{}", BASE64.encode(png_bytes(4, 9)));
        let decoded = loader().load(&ImageSource::parse(&url)).await.unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 9));
        assert_eq!(decoded.descriptor, "data:image/png;base64");
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.png");
        std::fs::write(&path, png_bytes(6, 6)).unwrap();

        let decoded = loader().load(&ImageSource::File(path.clone())).await.unwrap();
        assert_eq!(decoded.width(), 6);
        assert_eq!(decoded.descriptor, path.display().to_string());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_decode_error() {
        let err = loader()
            .load(&ImageSource::parse("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_load_garbage_is_decode_error() {
        let err = loader()
            .load(&ImageSource::from_bytes(&b"not an image"[..]))
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }

    fn small_limit_loader(max_source_bytes: usize) -> ImageLoader {
        let config = RendererConfig {
            max_source_bytes,
            ..RendererConfig::default()
        };
        ImageLoader::new(&config).unwrap()
    }

    /// Serve one canned HTTP response, keeping the socket open for a while.
    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        format!("http://{}/source.png", addr)
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_before_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.png");
        std::fs::write(&path, png_bytes(64, 64)).unwrap();

        let err = small_limit_loader(16)
            .load(&ImageSource::File(path))
            .await
            .unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("limit is 16 bytes"), "{}", err);
    }

    #[tokio::test]
    async fn test_oversized_content_length_rejected_before_body() {
        // Advertises a large body but never sends it
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\n".to_vec()).await;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            small_limit_loader(1024).load(&ImageSource::parse(&url)),
        )
        .await
        .expect("size check should not wait for the body");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Source is 1000000 bytes"), "{}", err);
    }

    #[tokio::test]
    async fn test_oversized_chunked_body_rejected_while_streaming() {
        let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for _ in 0..8 {
            response.extend_from_slice(b"40\r\n");
            response.extend_from_slice(&[0u8; 64]);
            response.extend_from_slice(b"\r\n");
        }
        let url = serve_once(response).await;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            small_limit_loader(100).load(&ImageSource::parse(&url)),
        )
        .await
        .expect("streamed body should be cut off at the limit");

        let err = result.unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("limit is 100 bytes"), "{}", err);
    }

    #[tokio::test]
    async fn test_load_respects_size_limit() {
        let config = RendererConfig {
            max_source_bytes: 16,
            ..RendererConfig::default()
        };
        let loader = ImageLoader::new(&config).unwrap();
        let err = loader
            .load(&ImageSource::from_bytes(png_bytes(10, 10)))
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }
}
