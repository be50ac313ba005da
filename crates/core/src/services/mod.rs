pub mod chat_completion;
pub mod document_intelligence;

pub use chat_completion::ChatCompletionClient;
pub use document_intelligence::{DocumentIntelligenceClient, SidecarLayout};
