// Claude mapper module
// Anthropic Messages <-> canonical chat conversion

pub mod request;
pub mod response;
pub mod streaming;

pub use request::{transform_claude_request, translate_messages_request, TranslatedRequest};
pub use response::{message_id, transform_response, translate_chat_response};
pub use streaming::AnthropicTranscoder;
