//! Channel overlap and delivery window checks

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use super::types::{DeliveryWindow, DistributionRule, SubscriptionData};

/// True when the rule and the recipient share at least one channel
pub fn has_delivery_methods(rule: &DistributionRule, subscription: &SubscriptionData) -> bool {
    rule.delivery_methods
        .iter()
        .any(|method| subscription.delivery_methods.contains(method))
}

/// Inclusive at both `start` and `start + duration`
pub fn is_between_times<Z: TimeZone>(
    time: &DateTime<Z>,
    start: &DateTime<Z>,
    duration: Duration,
) -> bool {
    let end = start.clone() + duration;
    time >= start && *time <= end
}

fn window_start(local_now: &DateTime<Tz>, window: &DeliveryWindow) -> Option<DateTime<Tz>> {
    let naive = local_now
        .date_naive()
        .and_hms_opt(window.at_hour, window.at_minute, 0)?;
    local_now.timezone().from_local_datetime(&naive).earliest()
}

/// Whether `now` falls inside one of the recipient's windows for today.
///
/// Device recipients and rules that skip the check are always eligible. The
/// recipient's own zone is used, never the message override.
pub fn has_delivery_window(
    rule: &DistributionRule,
    subscription: &SubscriptionData,
    now: DateTime<Utc>,
) -> bool {
    if !rule.check_delivery_window || subscription.is_device() {
        return true;
    }

    let local_now = now.with_timezone(&subscription.time_zone);
    let day_of_week = local_now.weekday().num_days_from_monday() as u8;

    subscription
        .delivery_windows(day_of_week)
        .into_iter()
        .any(|window| {
            window_start(&local_now, window).is_some_and(|start| {
                is_between_times(&local_now, &start, Duration::minutes(window.duration as i64))
            })
        })
}

/// Keep recipients that pass both checks, preserving order.
pub fn filter_eligible(
    rule: &DistributionRule,
    subscriptions: Vec<SubscriptionData>,
    now: DateTime<Utc>,
) -> Vec<SubscriptionData> {
    subscriptions
        .into_iter()
        .filter(|s| has_delivery_methods(rule, s) && has_delivery_window(rule, s, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::types::{DeliveryMethod, RecipientKind};
    use serde_json::json;

    fn rule(methods: Vec<DeliveryMethod>, check_window: bool) -> DistributionRule {
        serde_json::from_value(json!({
            "metadata": null,
            "deliveryMethods": methods,
            "checkDeliveryWindow": check_window,
        }))
        .unwrap()
    }

    fn generic(zone: Tz, windows: Vec<DeliveryWindow>) -> SubscriptionData {
        SubscriptionData {
            subscriber_id: Some("sub-1".to_string()),
            delivery_methods: vec![DeliveryMethod::Email, DeliveryMethod::Sms],
            time_zone: zone,
            kind: RecipientKind::Generic {
                email: Some("ops@example.com".to_string()),
                phone: Some("+15550100".to_string()),
                webhook_url: None,
                delivery_windows: windows,
            },
        }
    }

    fn window(day_of_week: u8, at_hour: u32, at_minute: u32, duration: u32) -> DeliveryWindow {
        DeliveryWindow {
            day_of_week,
            at_hour,
            at_minute,
            duration,
        }
    }

    #[test]
    fn test_is_between_times_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let duration = Duration::minutes(30);
        let end = start + duration;
        let ms = Duration::milliseconds(1);

        assert!(is_between_times(&start, &start, duration));
        assert!(is_between_times(&end, &start, duration));
        assert!(!is_between_times(&(start - ms), &start, duration));
        assert!(!is_between_times(&(end + ms), &start, duration));
    }

    #[test]
    fn test_channel_overlap_is_literal_intersection() {
        let recipient = generic(Tz::UTC, vec![]);

        assert!(has_delivery_methods(&rule(vec![DeliveryMethod::Sms], false), &recipient));
        assert!(!has_delivery_methods(
            &rule(vec![DeliveryMethod::Push, DeliveryMethod::Call], false),
            &recipient
        ));
    }

    #[test]
    fn test_new_york_window() {
        // Monday 2024-03-04, New York is UTC-5
        let recipient = generic(
            chrono_tz::America::New_York,
            vec![window(0, 9, 0, 30)],
        );
        let rule = rule(vec![DeliveryMethod::Email], true);

        let nine = Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap();
        let nine_thirty = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let nine_thirty_one = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();

        assert!(has_delivery_window(&rule, &recipient, nine));
        assert!(has_delivery_window(&rule, &recipient, nine_thirty));
        assert!(!has_delivery_window(&rule, &recipient, nine_thirty_one));
    }

    #[test]
    fn test_window_uses_recipient_weekday() {
        // 2024-03-05 02:00 UTC is still Monday evening in Los Angeles
        let recipient = generic(
            chrono_tz::America::Los_Angeles,
            vec![window(0, 18, 0, 60), window(1, 18, 0, 60)],
        );
        let rule = rule(vec![DeliveryMethod::Email], true);
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 2, 30, 0).unwrap();

        assert!(has_delivery_window(&rule, &recipient, now));

        let tuesday_only = generic(chrono_tz::America::Los_Angeles, vec![window(1, 18, 0, 60)]);
        assert!(!has_delivery_window(&rule, &tuesday_only, now));
    }

    #[test]
    fn test_no_windows_today_is_ineligible() {
        let recipient = generic(Tz::UTC, vec![window(3, 0, 0, 1440)]);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();

        assert!(!has_delivery_window(&rule(vec![DeliveryMethod::Email], true), &recipient, now));
        assert!(has_delivery_window(&rule(vec![DeliveryMethod::Email], false), &recipient, now));
    }

    #[test]
    fn test_any_window_is_enough() {
        let recipient = generic(Tz::UTC, vec![window(0, 8, 0, 15), window(0, 12, 0, 15)]);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 12, 10, 0).unwrap();

        assert!(has_delivery_window(&rule(vec![DeliveryMethod::Email], true), &recipient, now));
    }

    #[test]
    fn test_device_always_in_window() {
        let device = SubscriptionData {
            subscriber_id: None,
            delivery_methods: vec![DeliveryMethod::Push],
            time_zone: Tz::UTC,
            kind: RecipientKind::Device {
                subscription: "token".to_string(),
                platform: "android".to_string(),
            },
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();

        assert!(has_delivery_window(&rule(vec![DeliveryMethod::Push], true), &device, now));
    }

    #[test]
    fn test_filter_eligible_preserves_order() {
        let rule = rule(vec![DeliveryMethod::Email], true);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 5, 0).unwrap();
        let mut open = generic(Tz::UTC, vec![window(0, 9, 0, 10)]);
        open.subscriber_id = Some("open".to_string());
        let closed = generic(Tz::UTC, vec![window(0, 10, 0, 10)]);
        let mut open_again = open.clone();
        open_again.subscriber_id = Some("open-again".to_string());

        let eligible = filter_eligible(&rule, vec![open, closed, open_again], now);
        let ids: Vec<_> = eligible
            .iter()
            .map(|s| s.subscriber_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["open", "open-again"]);
    }
}
