//! Job fan-out: group eligible recipients per channel and build delivery jobs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::eligibility::filter_eligible;
use super::job::{
    CallJobData, EmailJobData, JobData, JobDefaults, NotificationJob, PushJobData, SmsJobData,
    WebhookJobData,
};
use super::message::DistributionMessage;
use super::types::{DeliveryMethod, DistributionRule, Recipient, SubscriptionData};

/// Recipients per channel, in the rule's channel order.
///
/// Channels with no recipients are omitted.
pub fn group_by_delivery_method<'a>(
    methods: &[DeliveryMethod],
    subscriptions: &'a [SubscriptionData],
) -> Vec<(DeliveryMethod, Vec<Recipient<'a>>)> {
    let mut groups: Vec<(DeliveryMethod, Vec<Recipient<'a>>)> = Vec::new();

    for &method in methods {
        if groups.iter().any(|(m, _)| *m == method) {
            continue;
        }
        let recipients: Vec<Recipient<'a>> = subscriptions
            .iter()
            .filter_map(|s| s.delivery_method(method).map(|value| Recipient::new(value, s)))
            .collect();
        if !recipients.is_empty() {
            groups.push((method, recipients));
        }
    }

    groups
}

/// Drop repeated contact values, keeping the first occurrence.
///
/// Only the value is compared, so a duplicate with another time zone is
/// discarded along with its zone.
pub fn dedup_recipients(recipients: Vec<Recipient<'_>>) -> Vec<Recipient<'_>> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.value))
        .collect()
}

/// Build one job per unique recipient for a channel.
pub fn map_to_notification_jobs(
    method: DeliveryMethod,
    recipients: Vec<Recipient<'_>>,
    rule: &DistributionRule,
    message: &DistributionMessage,
    defaults: &JobDefaults,
) -> Vec<NotificationJob> {
    dedup_recipients(recipients)
        .into_iter()
        .map(|recipient| {
            let time_zone = time_zone_name(message.time_zone, recipient.subscription.time_zone);
            let to = recipient.value.to_string();
            let context = message.payload.clone();

            let data = match method {
                DeliveryMethod::Email => JobData::Email(EmailJobData {
                    to,
                    time_zone,
                    subject: rule.email_subject.clone(),
                    text: rule.text.clone(),
                    template: rule.email_template.clone(),
                    html: rule.html.clone(),
                    context,
                }),
                DeliveryMethod::Sms => JobData::Sms(SmsJobData {
                    to,
                    time_zone,
                    template: rule.sms_template.clone(),
                    body: rule.text.clone(),
                    context,
                }),
                DeliveryMethod::Call => JobData::Call(CallJobData {
                    to,
                    time_zone,
                    template: rule.call_template.clone(),
                    context,
                }),
                DeliveryMethod::Push => JobData::Push(PushJobData {
                    subscription: to,
                    template: rule.push_template.clone(),
                    platform: recipient
                        .subscription
                        .platform()
                        .unwrap_or_default()
                        .to_string(),
                    time_zone,
                    context,
                }),
                DeliveryMethod::Webhook => JobData::Webhook(WebhookJobData {
                    url: to,
                    time_zone,
                    template: rule.webhook_template.clone(),
                    context,
                }),
            };

            NotificationJob {
                name: method,
                data,
                opts: defaults.options_for(&message.id, method, recipient.value),
            }
        })
        .collect()
}

fn time_zone_name(message_zone: Option<Tz>, recipient_zone: Tz) -> String {
    message_zone.unwrap_or(recipient_zone).name().to_string()
}

/// Filter, group and map resolved recipients into the outbound batch.
pub fn create_notification_jobs(
    rule: &DistributionRule,
    subscriptions: Vec<SubscriptionData>,
    message: &DistributionMessage,
    defaults: &JobDefaults,
    now: DateTime<Utc>,
) -> Vec<NotificationJob> {
    let eligible = filter_eligible(rule, subscriptions, now);

    group_by_delivery_method(&rule.delivery_methods, &eligible)
        .into_iter()
        .flat_map(|(method, recipients)| {
            map_to_notification_jobs(method, recipients, rule, message, defaults)
        })
        .collect()
}
