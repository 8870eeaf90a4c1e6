// Mappers module - protocol conversion between the wire formats and the canonical chat request

pub mod claude;
pub mod model_mapping;
pub mod openai;
