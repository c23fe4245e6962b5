//! # Alert Engine
//!
//! Rule evaluation over the sync execution ledger plus notification
//! dispatch. [`engine`] computes metrics and escalation decisions;
//! [`notifier`] delivers triggered alerts to dashboard, webhook, and email
//! channels.

pub mod engine;
pub mod notifier;

pub use engine::{AlertEngine, AlertError, AlertEvaluation};
pub use notifier::{AlertNotification, Dispatcher, LogMailer, Mailer, NotificationSink, NotifyError};
