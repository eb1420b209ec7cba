pub mod hybrid;
pub mod indexer;
pub mod media;
pub mod vector_index;

pub use hybrid::{HybridRetriever, ResultView, SearchRequest};
pub use indexer::{Indexer, ScanOutcome, ScanSummary};
pub use vector_index::{SearchHit, VectorIndex};
