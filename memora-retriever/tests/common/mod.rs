//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use memora_embed::HashingEmbedProvider;
use memora_retriever::config::{IndexPolicy, MemoraConfig};
use memora_retriever::session::{MountInfo, Session};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write a small PNG whose pixels depend on `seed`, so every seed hashes differently.
pub fn write_png(path: &Path, seed: u8) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let image = image::RgbImage::from_fn(48, 32, |x, y| {
        image::Rgb([
            seed.wrapping_mul(37).wrapping_add(x as u8),
            seed.wrapping_mul(11).wrapping_add(y as u8),
            seed,
        ])
    });
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    std::fs::write(path, buffer.into_inner())?;
    Ok(path.to_path_buf())
}

/// Populate `root` with descriptively named photos.
pub fn photo_library(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(vec![
        write_png(&root.join("beach_sunset.png"), 1)?,
        write_png(&root.join("birthday_cake_candles.png"), 2)?,
        write_png(&root.join("snowy_mountain_hike.png"), 3)?,
        write_png(&root.join("trips/city_skyline_night.png"), 4)?,
    ])
}

/// Offline configuration: hashing embedder, no OCR.
pub fn offline_config(policy: IndexPolicy) -> MemoraConfig {
    let mut config = MemoraConfig::default();
    config.embedding.model = "hashing".to_string();
    config.indexer.ocr = false;
    config.indexer.max_workers = 2;
    config.indexer.index_policy = policy;
    config
}

pub async fn mount(root: &Path, policy: IndexPolicy) -> Result<(Session, MountInfo)> {
    Ok(Session::mount_with(
        root,
        offline_config(policy),
        Arc::new(HashingEmbedProvider::default()),
        None,
    )
    .await?)
}
