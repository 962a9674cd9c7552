//! Client-side hybrid fallback.
//!
//! Runs on whatever agent displays alerts. The local alert built from data in
//! hand is always attempted first; the provider relay is an additional path.
//! Every channel tags its alert with the same dedup tag and the presenter
//! replaces alerts that share a tag, so a logical notification is seen once.

pub mod alert;
pub mod hybrid;
pub mod relay;
pub mod tray;

pub use alert::{Alert, AlertOrigin, click_target, client_tag};
pub use hybrid::{ClientPayload, HybridNotifier, Permission};
pub use relay::{ProviderRelay, Registrar, RelayError, ServerRelay};
pub use tray::{AlertPresenter, AlertState, AlertTray, LoggingPresenter};
