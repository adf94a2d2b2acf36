pub mod llm_client;
pub mod mail_client;
pub mod relay_client;

pub use llm_client::{DynScoringBackend, LlmClient, ScoringBackend};
pub use mail_client::{DynMailer, EmailAttachment, Mailer, OutgoingEmail, ResendMailer};
pub use relay_client::{DynRelay, QStashRelay, Relay};
