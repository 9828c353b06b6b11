use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::ConfigurationError;
use super::filter::{FilterExpr, FilterJoin};

/// Delivery channels a rule can enable and a recipient can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Email,
    Sms,
    Call,
    Push,
    Webhook,
}

impl DeliveryMethod {
    pub const ALL: [DeliveryMethod; 5] = [
        DeliveryMethod::Email,
        DeliveryMethod::Sms,
        DeliveryMethod::Call,
        DeliveryMethod::Push,
        DeliveryMethod::Webhook,
    ];

    /// Channel name used as the downstream job name
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Email => "email",
            DeliveryMethod::Sms => "sms",
            DeliveryMethod::Call => "call",
            DeliveryMethod::Push => "push",
            DeliveryMethod::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnsupportedChannel(s.to_string()))
    }
}

/// A recurring weekly time range during which a human recipient may be notified.
///
/// `day_of_week` counts from Monday (0) to Sunday (6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWindow {
    pub day_of_week: u8,
    pub at_hour: u32,
    pub at_minute: u32,
    /// Window length in minutes
    pub duration: u32,
}

/// A registered (queue, event type) pair and everything needed to fan it out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub queue: String,
    pub event_type: String,
    /// Metadata keys that take part in rule selection
    #[serde(default)]
    pub metadata_labels: Vec<String>,
    /// Rules in declaration order
    #[serde(default)]
    pub rules: Vec<DistributionRule>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl DistributionEvent {
    /// Check the rule invariants that storage normally enforces.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let defaults = self.rules.iter().filter(|r| r.is_default()).count();
        if defaults > 1 {
            return Err(ConfigurationError::InvalidRule(format!(
                "queue={} eventType={} has {} default rules, at most one is allowed",
                self.queue, self.event_type, defaults
            )));
        }

        if let Some(rule) = self.rules.iter().find(|r| r.delivery_methods.is_empty()) {
            return Err(ConfigurationError::InvalidRule(format!(
                "queue={} eventType={} has a rule with no delivery methods (metadata={})",
                self.queue,
                self.event_type,
                rule.selector_label()
            )));
        }

        Ok(())
    }
}

/// The policy applied to events whose metadata matches the selector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRule {
    #[serde(default)]
    pub distribution_event_id: Uuid,
    /// Required metadata key/value pairs; `None` marks the default rule
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    pub delivery_methods: Vec<DeliveryMethod>,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub email_template: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sms_template: Option<String>,
    #[serde(default)]
    pub call_template: Option<String>,
    #[serde(default)]
    pub push_template: Option<String>,
    #[serde(default)]
    pub webhook_template: Option<String>,
    #[serde(default)]
    pub check_delivery_window: bool,
    #[serde(default)]
    pub bypass_subscriptions: bool,
}

impl DistributionRule {
    pub fn is_default(&self) -> bool {
        self.metadata.is_none()
    }

    pub fn enables(&self, method: DeliveryMethod) -> bool {
        self.delivery_methods.contains(&method)
    }

    fn selector_label(&self) -> String {
        match &self.metadata {
            Some(selector) => Value::Object(selector.clone()).to_string(),
            None => "null".to_string(),
        }
    }
}

/// A stored recipient registration for a distribution event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub distribution_event_id: Uuid,
    /// Key used to look up the subscriber's contact profile
    pub subscriber_id: String,
    /// Channels this subscription accepts; empty means whatever the profile supports
    #[serde(default)]
    pub delivery_methods: Vec<DeliveryMethod>,
    #[serde(default)]
    pub filter_join: FilterJoin,
    #[serde(default)]
    pub filters: Vec<FilterExpr>,
}

/// Explicit recipient supplied by a message or stored as a subscriber profile.
///
/// The kind is inferred from shape: an entry carrying both `subscription` and
/// `platform` is a device, anything else is a generic contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipientEntry {
    Device(DeviceRecipientEntry),
    Generic(GenericRecipientEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecipientEntry {
    #[serde(default)]
    pub subscriber_id: Option<String>,
    /// Device token or push subscription handle
    pub subscription: String,
    pub platform: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericRecipientEntry {
    #[serde(default)]
    pub subscriber_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Channels the recipient registered for; inferred from contact fields when empty
    #[serde(default)]
    pub delivery_methods: Vec<DeliveryMethod>,
    #[serde(default)]
    pub delivery_windows: Vec<DeliveryWindow>,
}

/// Reasons an entry cannot become a [`SubscriptionData`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecipient {
    #[error("unknown time zone '{0}'")]
    TimeZone(String),
    #[error("time zone is required for contact recipients")]
    MissingTimeZone,
    #[error("no contact value for any delivery method")]
    NoContact,
    #[error("device subscription must not be empty")]
    EmptyDeviceSubscription,
}

/// Recipient kind; only generic recipients carry delivery windows
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientKind {
    Generic {
        email: Option<String>,
        phone: Option<String>,
        webhook_url: Option<String>,
        delivery_windows: Vec<DeliveryWindow>,
    },
    Device {
        subscription: String,
        platform: String,
    },
}

/// A resolved, contact-bearing recipient
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionData {
    pub subscriber_id: Option<String>,
    pub delivery_methods: Vec<DeliveryMethod>,
    pub time_zone: Tz,
    pub kind: RecipientKind,
}

fn parse_time_zone(name: &str) -> Result<Tz, InvalidRecipient> {
    name.parse::<Tz>()
        .map_err(|_| InvalidRecipient::TimeZone(name.to_string()))
}

impl TryFrom<&RecipientEntry> for SubscriptionData {
    type Error = InvalidRecipient;

    fn try_from(entry: &RecipientEntry) -> Result<Self, Self::Error> {
        match entry {
            RecipientEntry::Device(device) => {
                if device.subscription.trim().is_empty() {
                    return Err(InvalidRecipient::EmptyDeviceSubscription);
                }
                Ok(Self {
                    subscriber_id: device.subscriber_id.clone(),
                    delivery_methods: vec![DeliveryMethod::Push],
                    time_zone: device
                        .time_zone
                        .as_deref()
                        .map(parse_time_zone)
                        .transpose()?
                        .unwrap_or(Tz::UTC),
                    kind: RecipientKind::Device {
                        subscription: device.subscription.clone(),
                        platform: device.platform.clone(),
                    },
                })
            }
            RecipientEntry::Generic(generic) => {
                // Delivery windows are evaluated in this zone
                let time_zone = match generic.time_zone.as_deref() {
                    Some(name) => parse_time_zone(name)?,
                    None => return Err(InvalidRecipient::MissingTimeZone),
                };
                let kind = RecipientKind::Generic {
                    email: non_blank(&generic.email),
                    phone: non_blank(&generic.phone),
                    webhook_url: non_blank(&generic.webhook_url),
                    delivery_windows: generic.delivery_windows.clone(),
                };

                let mut data = Self {
                    subscriber_id: generic.subscriber_id.clone(),
                    delivery_methods: generic.delivery_methods.clone(),
                    time_zone,
                    kind,
                };

                if data.delivery_methods.is_empty() {
                    data.delivery_methods = DeliveryMethod::ALL
                        .into_iter()
                        .filter(|m| data.contact_value(*m).is_some())
                        .collect();
                }

                if data.delivery_methods.is_empty() {
                    return Err(InvalidRecipient::NoContact);
                }

                Ok(data)
            }
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SubscriptionData {
    /// Contact value used for `method` when the recipient is registered for it
    pub fn delivery_method(&self, method: DeliveryMethod) -> Option<&str> {
        if !self.delivery_methods.contains(&method) {
            return None;
        }
        self.contact_value(method)
    }

    fn contact_value(&self, method: DeliveryMethod) -> Option<&str> {
        match (&self.kind, method) {
            (RecipientKind::Generic { email, .. }, DeliveryMethod::Email) => email.as_deref(),
            (RecipientKind::Generic { phone, .. }, DeliveryMethod::Sms | DeliveryMethod::Call) => {
                phone.as_deref()
            }
            (RecipientKind::Generic { webhook_url, .. }, DeliveryMethod::Webhook) => {
                webhook_url.as_deref()
            }
            (RecipientKind::Device { subscription, .. }, DeliveryMethod::Push) => {
                Some(subscription.as_str())
            }
            _ => None,
        }
    }

    /// Delivery windows configured for a weekday (0 = Monday)
    pub fn delivery_windows(&self, day_of_week: u8) -> Vec<&DeliveryWindow> {
        match &self.kind {
            RecipientKind::Generic {
                delivery_windows, ..
            } => delivery_windows
                .iter()
                .filter(|w| w.day_of_week == day_of_week)
                .collect(),
            RecipientKind::Device { .. } => Vec::new(),
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, RecipientKind::Device { .. })
    }

    pub fn platform(&self) -> Option<&str> {
        match &self.kind {
            RecipientKind::Device { platform, .. } => Some(platform.as_str()),
            RecipientKind::Generic { .. } => None,
        }
    }

    /// Narrow the registered channels to what a subscription accepts.
    pub fn restrict_to(mut self, subscription: &Subscription) -> Self {
        if !subscription.delivery_methods.is_empty() {
            self.delivery_methods
                .retain(|m| subscription.delivery_methods.contains(m));
        }
        if self.subscriber_id.is_none() {
            self.subscriber_id = Some(subscription.subscriber_id.clone());
        }
        self
    }
}

/// A single contact value paired with the recipient it came from
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub value: &'a str,
    pub subscription: &'a SubscriptionData,
}

impl<'a> Recipient<'a> {
    pub fn new(value: &'a str, subscription: &'a SubscriptionData) -> Self {
        Self {
            value,
            subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_method_round_trip_names() {
        for method in DeliveryMethod::ALL {
            assert_eq!(method.as_str().parse::<DeliveryMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_delivery_method() {
        let err = "radio".parse::<DeliveryMethod>().unwrap_err();
        assert_eq!(err, ConfigurationError::UnsupportedChannel("radio".to_string()));
    }

    #[test]
    fn test_entry_shape_inference() {
        let device: RecipientEntry = serde_json::from_value(json!({
            "subscription": "fcm-token-123",
            "platform": "android"
        }))
        .unwrap();
        assert!(matches!(device, RecipientEntry::Device(_)));

        let generic: RecipientEntry = serde_json::from_value(json!({
            "email": "ops@example.com",
            "timeZone": "Europe/Berlin"
        }))
        .unwrap();
        assert!(matches!(generic, RecipientEntry::Generic(_)));
    }

    #[test]
    fn test_generic_infers_delivery_methods() {
        let entry = RecipientEntry::Generic(GenericRecipientEntry {
            email: Some("ops@example.com".to_string()),
            phone: Some("+15550100".to_string()),
            time_zone: Some("America/Chicago".to_string()),
            ..Default::default()
        });

        let data = SubscriptionData::try_from(&entry).unwrap();
        assert_eq!(
            data.delivery_methods,
            vec![DeliveryMethod::Email, DeliveryMethod::Sms, DeliveryMethod::Call]
        );
        assert_eq!(data.time_zone, chrono_tz::America::Chicago);
        assert_eq!(data.delivery_method(DeliveryMethod::Call), Some("+15550100"));
        assert_eq!(data.delivery_method(DeliveryMethod::Push), None);
    }

    #[test]
    fn test_generic_without_contact_is_invalid() {
        let entry = RecipientEntry::Generic(GenericRecipientEntry {
            email: Some("   ".to_string()),
            time_zone: Some("UTC".to_string()),
            ..Default::default()
        });
        assert_eq!(
            SubscriptionData::try_from(&entry).unwrap_err(),
            InvalidRecipient::NoContact
        );
    }

    #[test]
    fn test_unknown_time_zone_is_invalid() {
        let entry = RecipientEntry::Generic(GenericRecipientEntry {
            email: Some("ops@example.com".to_string()),
            time_zone: Some("Mars/Olympus".to_string()),
            ..Default::default()
        });
        assert_eq!(
            SubscriptionData::try_from(&entry).unwrap_err(),
            InvalidRecipient::TimeZone("Mars/Olympus".to_string())
        );
    }

    #[test]
    fn test_generic_without_time_zone_is_invalid() {
        let entry: RecipientEntry =
            serde_json::from_value(json!({ "email": "a@example.com" })).unwrap();
        assert_eq!(
            SubscriptionData::try_from(&entry).unwrap_err(),
            InvalidRecipient::MissingTimeZone
        );

        let entry: RecipientEntry =
            serde_json::from_value(json!({ "email": "a@example.com", "timeZone": null })).unwrap();
        assert_eq!(
            SubscriptionData::try_from(&entry).unwrap_err(),
            InvalidRecipient::MissingTimeZone
        );
    }

    #[test]
    fn test_device_without_time_zone_defaults_to_utc() {
        let entry: RecipientEntry =
            serde_json::from_value(json!({ "subscription": "fcm-token", "platform": "android" }))
                .unwrap();
        assert_eq!(SubscriptionData::try_from(&entry).unwrap().time_zone, Tz::UTC);
    }

    #[test]
    fn test_device_has_no_windows() {
        let entry = RecipientEntry::Device(DeviceRecipientEntry {
            subscriber_id: None,
            subscription: "apns-token".to_string(),
            platform: "ios".to_string(),
            time_zone: Some("Asia/Tokyo".to_string()),
        });
        let data = SubscriptionData::try_from(&entry).unwrap();

        assert!(data.is_device());
        assert_eq!(data.platform(), Some("ios"));
        assert_eq!(data.delivery_methods, vec![DeliveryMethod::Push]);
        for day in 0..7 {
            assert!(data.delivery_windows(day).is_empty());
        }
    }

    #[test]
    fn test_event_rejects_two_default_rules() {
        let rule = DistributionRule {
            distribution_event_id: Uuid::nil(),
            metadata: None,
            delivery_methods: vec![DeliveryMethod::Email],
            email_subject: None,
            email_template: None,
            html: None,
            text: None,
            sms_template: None,
            call_template: None,
            push_template: None,
            webhook_template: None,
            check_delivery_window: false,
            bypass_subscriptions: false,
        };
        let event = DistributionEvent {
            id: Uuid::nil(),
            queue: "distribution".to_string(),
            event_type: "order.created".to_string(),
            metadata_labels: vec![],
            rules: vec![rule.clone(), rule],
            subscriptions: vec![],
        };

        assert!(matches!(
            event.validate(),
            Err(ConfigurationError::InvalidRule(_))
        ));
    }
}
