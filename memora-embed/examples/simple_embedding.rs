//! Embeds a few captions and prints their pairwise similarity.

use memora_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let config = EmbedConfig::all_minilm_l6_v2(temp_dir.path())
        .with_batch_size(2)
        .with_download_progress(true);

    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Loaded {} ({} dimensions)",
        provider.config().model_name(),
        provider.embedding_dimension()
    );

    let captions = vec![
        "Two children building a sandcastle".to_string(),
        "Kids playing on the beach".to_string(),
        "Screenshot of a spreadsheet".to_string(),
    ];
    let result = provider.embed_texts(&captions).await?;

    for (i, a) in result.embeddings.iter().enumerate() {
        for (j, b) in result.embeddings.iter().enumerate().skip(i + 1) {
            let similarity: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            println!("{:?} <-> {:?}: {similarity:.3}", captions[i], captions[j]);
        }
    }

    Ok(())
}
