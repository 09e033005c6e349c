pub mod linksynergy;
pub mod ollama;

pub use linksynergy::{Advertiser, LinkSynergyClient, LinkSynergyError, MerchantSummary};
pub use ollama::{GenerationError, OllamaClient};
