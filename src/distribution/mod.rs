//! Distribution engine.
//!
//! Turns one inbound business event into a batch of per-channel notification
//! jobs: pick the rule for the event's metadata, resolve who should hear about
//! it, drop recipients outside their delivery windows, then fan out one job
//! per channel and contact.

mod clock;
mod consumer;
mod eligibility;
mod error;
mod fanout;
mod filter;
mod job;
mod message;
mod resolver;
mod selector;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use consumer::{DistributionConsumer, Outcome};
pub use eligibility::{filter_eligible, has_delivery_methods, has_delivery_window, is_between_times};
pub use error::{ConfigurationError, DistributionError, DistributionResult};
pub use fanout::{
    create_notification_jobs, dedup_recipients, group_by_delivery_method, map_to_notification_jobs,
};
pub use filter::{evaluate_filters, FilterExpr, FilterJoin, FilterOperator};
pub use job::{
    job_id, BackoffKind, BackoffOptions, CallJobData, EmailJobData, JobData, JobDefaults,
    JobOptions, NotificationJob, PushJobData, SmsJobData, WebhookJobData,
};
pub use message::{DistributionMessage, FieldError, ValidationErrors};
pub use resolver::{filter_subscriptions, RecipientResolver, ResolveError, SubscriptionDataSource};
pub use selector::{has_selectors, select_rule};
pub use types::{
    DeliveryMethod, DeliveryWindow, DeviceRecipientEntry, DistributionEvent, DistributionRule,
    GenericRecipientEntry, InvalidRecipient, Recipient, RecipientEntry, RecipientKind,
    Subscription, SubscriptionData,
};
