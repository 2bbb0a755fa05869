pub mod api;
pub mod clock;
pub mod model;
pub mod notify;
pub mod reconciler;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{initial_billing, next_due_date, BillingCycle, GRACE_PERIOD_DAYS};
pub use model::{BillingError, BillingRecord, BillingStatus, PaymentEntry, TransitionDecision};
pub use notify::{LogNotifier, NotificationGateway, SmtpNotifier};
pub use reconciler::{BillingReconciler, RunSummary};
pub use service::{BillingService, BillingUpdate};
pub use store::{BillingCandidate, PgWebsiteStore, SaveOutcome, StoreError, WebsiteStore};
