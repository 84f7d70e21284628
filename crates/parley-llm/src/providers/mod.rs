pub mod echo;
pub mod ollama;

pub use echo::EchoProvider;
pub use ollama::OllamaProvider;
