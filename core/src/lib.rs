pub mod api;
pub mod auth;
pub mod config;
pub mod export;
pub mod notify;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod wizard;

pub use api::{ApiGateway, Backend, MockBackend};
pub use auth::AuthFlow;
pub use config::Settings;
pub use export::ExportFormat;
pub use notify::{Notification, NotificationCenter, Severity};
pub use session::{ChatController, ChatMessage, Citation, MessageRole, Surface};
pub use store::CredentialStore;
pub use wizard::{ProjectWizard, WizardStep};
