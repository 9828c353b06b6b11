//! Outbound notification job model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::types::DeliveryMethod;

/// Namespace for deterministic job ids
const JOB_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9d3e_2a47_4b8e_9c15_d2e0_7a3b_51f4);

/// A single channel delivery job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationJob {
    pub name: DeliveryMethod,
    pub data: JobData,
    pub opts: JobOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobData {
    Email(EmailJobData),
    Sms(SmsJobData),
    Call(CallJobData),
    Push(PushJobData),
    Webhook(WebhookJobData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJobData {
    pub to: String,
    pub time_zone: String,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub template: Option<String>,
    pub html: Option<String>,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsJobData {
    pub to: String,
    pub time_zone: String,
    pub template: Option<String>,
    pub body: Option<String>,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallJobData {
    pub to: String,
    pub time_zone: String,
    pub template: Option<String>,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushJobData {
    pub subscription: String,
    pub template: Option<String>,
    pub platform: String,
    pub time_zone: String,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJobData {
    pub url: String,
    pub time_zone: String,
    pub template: Option<String>,
    pub context: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffOptions {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    /// Base delay in milliseconds
    pub delay: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub job_id: String,
    pub attempts: u32,
    pub backoff: BackoffOptions,
}

/// Retry defaults attached to every emitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    pub attempts: u32,
    pub backoff_delay_ms: u64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_delay_ms: 1000,
        }
    }
}

impl JobDefaults {
    pub fn options_for(&self, message_id: &str, method: DeliveryMethod, value: &str) -> JobOptions {
        JobOptions {
            job_id: job_id(message_id, method, value),
            attempts: self.attempts,
            backoff: BackoffOptions {
                kind: BackoffKind::Exponential,
                delay: self.backoff_delay_ms,
            },
        }
    }
}

/// Stable id for one (message, channel, contact) delivery
pub fn job_id(message_id: &str, method: DeliveryMethod, value: &str) -> String {
    let name = format!("{}:{}:{}", message_id, method.as_str(), value);
    Uuid::new_v5(&JOB_ID_NAMESPACE, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_is_deterministic() {
        let a = job_id("msg-1", DeliveryMethod::Email, "ops@example.com");
        let b = job_id("msg-1", DeliveryMethod::Email, "ops@example.com");
        let other_channel = job_id("msg-1", DeliveryMethod::Sms, "ops@example.com");

        assert_eq!(a, b);
        assert_ne!(a, other_channel);
    }

    #[test]
    fn test_options_serialize_camel_case() {
        let opts = JobDefaults {
            attempts: 5,
            backoff_delay_ms: 2000,
        }
        .options_for("msg-1", DeliveryMethod::Call, "+15550100");

        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value["attempts"], json!(5));
        assert_eq!(value["backoff"], json!({ "type": "exponential", "delay": 2000 }));
        assert!(value["jobId"].is_string());
    }

    #[test]
    fn test_sms_payload_shape() {
        let data = JobData::Sms(SmsJobData {
            to: "+15550100".to_string(),
            time_zone: "UTC".to_string(),
            template: Some("sms-order".to_string()),
            body: None,
            context: json!({ "orderId": 1 }),
        });

        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "to": "+15550100",
                "timeZone": "UTC",
                "template": "sms-order",
                "body": null,
                "context": { "orderId": 1 }
            })
        );
    }
}
