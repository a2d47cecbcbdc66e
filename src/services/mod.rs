pub mod engine_selector;
pub mod image_embedder;
pub mod lang_detector;
pub mod llm_backend;
pub mod mt_backend;
pub mod prompt_builder;

pub use engine_selector::{Engine, EnginePreference, EngineSelection, EngineSelector};
pub use image_embedder::{extract_first_image_ref, HttpImageEmbedder, ImageEmbedder};
pub use lang_detector::{Confidence, DetectionResult, Lang, LangDetector};
pub use llm_backend::{ChatBackend, ChatRequest, OpenAiChatBackend};
pub use mt_backend::{MtBackend, MtranClient};
pub use prompt_builder::{ChatMessage, ContentPart, MessageContent, MessageRole, PromptBuilder};
