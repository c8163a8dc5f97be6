pub mod catalog;
pub mod engine;
pub mod extraction;
pub mod features;
pub mod images;
pub mod index_store;
pub mod query_vector;
pub mod ranker;
pub mod recommendations;
pub mod text;
pub mod vision;

pub use catalog::Catalog;
pub use engine::{Engine, EngineHandle, EngineStats, ScoredRecipe};
pub use extraction::{AttributeExtractor, DisabledExtractor, OpenAiExtractor};
pub use features::FeatureIndex;
pub use images::ImageSource;
pub use recommendations::EnrichmentOptions;
pub use vision::{DisabledDescriber, GeminiDescriber, ImageDescriber};
