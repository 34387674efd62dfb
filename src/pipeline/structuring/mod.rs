pub mod types;
pub mod prompt;
pub mod aggregate;
pub mod parser;
pub mod ollama;
pub mod ollama_types;

pub use types::*;
pub use prompt::*;
pub use aggregate::*;
pub use parser::*;
pub use ollama::*;
pub use ollama_types::*;
