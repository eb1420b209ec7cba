//! File discovery, content hashing and raster preparation for image files.

use crate::storage::CATALOG_FILE_NAME;
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, NaiveDateTime};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hex characters of the blake3 digest used as `file_id`.
const FILE_ID_HEX_LEN: usize = 32;

/// Whether `path` has one of `extensions` (compared case-insensitively).
pub fn is_supported_image(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// The catalog database and its WAL/SHM companions.
pub fn is_catalog_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(CATALOG_FILE_NAME))
}

/// Supported image files under `root`, sorted by path.
///
/// Hidden files and directories are skipped, `.gitignore` rules are not
/// applied since photo folders are rarely repositories.
pub fn discover_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };
        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
        let path = entry.path();
        if is_file && !is_catalog_file(path) && is_supported_image(path, extensions) {
            files.push(entry.into_path());
        }
    }
    debug!("Discovered {} image files under {}", files.len(), root.display());
    files
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    pub file_id: String,
    pub hash: String,
}

pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let hash = hex::encode(blake3::hash(bytes).as_bytes());
    ContentHash {
        file_id: hash[..FILE_ID_HEX_LEN].to_string(),
        hash,
    }
}

/// Decoded image reduced to what the catalog and vision backend need.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// JPEG bounded by the thumbnail size
    pub thumbnail: Vec<u8>,
    /// JPEG bounded by the preview size, sent to the vision backend
    pub preview: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub exif_date: Option<NaiveDateTime>,
}

/// Decode `bytes` and render the thumbnail and preview JPEGs.
///
/// CPU bound; callers on the async runtime should use
/// [`prepare_image_blocking`].
pub fn prepare_image(
    bytes: &[u8],
    thumbnail_size: u32,
    preview_size: u32,
    quality: u8,
) -> Result<PreparedImage> {
    let image = image::load_from_memory(bytes).context("decoding image")?;

    let thumbnail = encode_jpeg(&fit_within(&image, thumbnail_size), quality)?;
    let preview = encode_jpeg(&fit_within(&image, preview_size), quality)?;

    Ok(PreparedImage {
        thumbnail,
        preview,
        width: image.width(),
        height: image.height(),
        exif_date: read_exif_date(bytes),
    })
}

pub async fn prepare_image_blocking(
    bytes: Vec<u8>,
    thumbnail_size: u32,
    preview_size: u32,
    quality: u8,
) -> Result<PreparedImage> {
    tokio::task::spawn_blocking(move || {
        prepare_image(&bytes, thumbnail_size, preview_size, quality)
    })
    .await?
}

/// Downscale to fit a `max_edge` square, never upscaling.
fn fit_within(image: &DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width() <= max_edge && image.height() <= max_edge {
        image.clone()
    } else {
        image.thumbnail(max_edge, max_edge)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .context("encoding JPEG")?;
    Ok(buffer)
}

/// Capture time from EXIF `DateTimeOriginal`, falling back to `DateTime`.
pub fn read_exif_date(bytes: &[u8]) -> Option<NaiveDateTime> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    [exif::Tag::DateTimeOriginal, exif::Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, exif::In::PRIMARY))
        .find_map(|field| match &field.value {
            exif::Value::Ascii(values) => values.first().and_then(|v| parse_exif_datetime(v)),
            _ => None,
        })
}

fn parse_exif_datetime(ascii: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(ascii).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}

pub fn thumbnail_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg))
}

/// Lowercased alphanumeric words of a file name without its extension.
pub fn filename_tokens(path: &Path) -> Vec<String> {
    path.file_stem()
        .map(|stem| tokenize(&stem.to_string_lossy()))
        .unwrap_or_default()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Tokens of the directory directly containing `path`.
pub fn parent_tokens(path: &Path) -> Vec<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|name| tokenize(&name.to_string_lossy()))
        .unwrap_or_default()
}
