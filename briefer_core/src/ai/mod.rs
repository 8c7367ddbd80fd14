//! Prompt chains in front of hosted language models.

pub mod chains;
pub mod models;
pub mod parser;
pub mod prompts;
pub mod provider;
pub mod registry;
pub mod testing;

pub use chains::{stream_json_lines, JsonAccumulator, JsonObject, StructuredChain};
pub use models::{
    PythonEditRequest, SqlEditRequest, TextToSqlRequest, VannaRequest, VegaRequest,
};
pub use parser::{parse_partial_json, ResponseSchema, StructuredOutputParser};
pub use provider::{BedrockProvider, ChatEndpoint, LlmError, LlmProvider, OpenAiProvider, TokenStream};
pub use registry::{select_backend, Backend, ModelRegistry, BEDROCK_MODEL_IDS};
