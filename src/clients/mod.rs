pub mod gemini_client;
pub mod llm_client;
pub mod openai_client;

pub use gemini_client::GeminiProvider;
pub use llm_client::{LlmProvider, ProviderError, ProviderRequest};
pub use openai_client::OpenAiProvider;
