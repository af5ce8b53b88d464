pub mod ingestion;
pub mod retrieval;

pub use ingestion::IngestionService;
pub use retrieval::RetrievalService;
