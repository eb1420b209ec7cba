//! # memora-vision
//!
//! Enrichment collaborators for the memora image index: local OCR through the
//! `tesseract` executable and captioning / query expansion through any
//! OpenAI-compatible multimodal endpoint (LM Studio, Ollama, vLLM).
//!
//! [`EnrichmentPipeline`] ties the two together and absorbs every failure, so
//! indexing and search never abort because a backend is slow or missing.

pub mod client;
pub mod config;
pub mod error;
pub mod ocr;
pub mod pipeline;

pub use client::{ImageDescription, ProbeReport, VisionClient, parse_description, probe};
pub use config::{VisionConfig, VisionTimeouts};
pub use error::{Result, VisionError};
pub use ocr::{OcrEngine, TesseractOcr};
pub use pipeline::{Enrichment, EnrichmentPipeline, VisionStatus, accept_expansion};
