//! End-to-end example: generate a small photo folder, scan it, search it.
//!
//! Uses the offline hashing embedder and no OCR, so it runs without model
//! downloads or external tools.

use anyhow::Result;
use memora_embed::HashingEmbedProvider;
use memora_retriever::config::MemoraConfig;
use memora_retriever::retrieval::SearchRequest;
use memora_retriever::session::Session;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_photo(path: &Path, tint: [u8; 3]) -> Result<()> {
    let image = image::RgbImage::from_fn(320, 240, |x, y| {
        image::Rgb([
            tint[0].wrapping_add((x / 4) as u8),
            tint[1].wrapping_add((y / 4) as u8),
            tint[2],
        ])
    });
    image.save(path)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("holidays"))?;

    write_photo(&root.join("holidays/beach_sunset.png"), [250, 120, 40])?;
    write_photo(&root.join("holidays/ski_slope_snow.png"), [230, 240, 250])?;
    write_photo(&root.join("birthday_cake.png"), [200, 60, 120])?;
    write_photo(&root.join("receipt_groceries.png"), [245, 245, 245])?;
    println!("Created 4 photos in {}", root.display());

    let mut config = MemoraConfig::default();
    config.indexer.ocr = false;
    let (session, info) = Session::mount_with(
        root,
        config,
        Arc::new(HashingEmbedProvider::default()),
        None,
    )
    .await?;
    println!("Catalog at {}", info.db_path.display());

    let summary = session.scan(false).await?;
    println!(
        "Scan: {} added, {} skipped, {} failed",
        summary.added, summary.skipped, summary.failed
    );

    for query in ["sunset at the beach", "snow", "grocery receipt"] {
        println!("\nSearch: {query}");
        for hit in session.search(&SearchRequest::new(query).with_top_k(3)).await? {
            println!("  {:.3}  {}", hit.score, hit.path);
        }
    }

    let again = session.scan(false).await?;
    println!("\nSecond scan: {} added, {} skipped", again.added, again.skipped);
    Ok(())
}
