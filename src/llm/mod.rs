//! LLM 层：连接器抽象与实现（Ollama / OpenAI / Anthropic / Mock）

pub mod anthropic;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicConnector;
pub use mock::{MockConnector, MockStep, RecordedCall};
pub use ollama::OllamaConnector;
pub use openai::OpenAiConnector;
pub use registry::{create_connector, RegistryError, AVAILABLE_CONNECTORS};
pub use traits::{Connector, ConnectorError, Response, StopReason, TokenStream, ToolSpec, Usage};
