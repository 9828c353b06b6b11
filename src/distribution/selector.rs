//! Distribution rule selection

use serde_json::{Map, Value};

use super::error::ConfigurationError;
use super::types::{DistributionEvent, DistributionRule};

/// True when every label the selector declares matches the inbound metadata.
///
/// Keys missing from the selector match anything; keys that are not labels are ignored.
pub fn has_selectors(
    labels: &[String],
    selector: &Map<String, Value>,
    metadata: &Map<String, Value>,
) -> bool {
    labels.iter().all(|label| match selector.get(label) {
        None => true,
        Some(expected) => metadata.get(label) == Some(expected),
    })
}

/// Pick the first matching non-default rule, falling back to the default rule.
pub fn select_rule<'a>(
    event: &'a DistributionEvent,
    metadata: &Map<String, Value>,
) -> Result<&'a DistributionRule, ConfigurationError> {
    let matched = event.rules.iter().find(|rule| {
        rule.metadata
            .as_ref()
            .is_some_and(|selector| has_selectors(&event.metadata_labels, selector, metadata))
    });

    matched
        .or_else(|| event.rules.iter().find(|rule| rule.is_default()))
        .ok_or_else(|| ConfigurationError::MissingDefaultRule {
            queue: event.queue.clone(),
            event_type: event.event_type.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::types::DeliveryMethod;
    use serde_json::json;
    use uuid::Uuid;

    fn rule(selector: Option<Value>, methods: Vec<DeliveryMethod>) -> DistributionRule {
        serde_json::from_value(json!({
            "metadata": selector,
            "deliveryMethods": methods,
        }))
        .unwrap()
    }

    fn event(rules: Vec<DistributionRule>) -> DistributionEvent {
        DistributionEvent {
            id: Uuid::nil(),
            queue: "distribution".to_string(),
            event_type: "order.created".to_string(),
            metadata_labels: vec!["region".to_string(), "tier".to_string()],
            rules,
            subscriptions: vec![],
        }
    }

    fn metadata(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_specific_rule_wins_over_default() {
        let event = event(vec![
            rule(Some(json!({ "region": "us" })), vec![DeliveryMethod::Email]),
            rule(None, vec![DeliveryMethod::Sms]),
        ]);

        let selected = select_rule(&event, &metadata(json!({ "region": "us" }))).unwrap();
        assert_eq!(selected.delivery_methods, vec![DeliveryMethod::Email]);
    }

    #[test]
    fn test_first_match_in_declaration_order() {
        let event = event(vec![
            rule(Some(json!({ "region": "us" })), vec![DeliveryMethod::Email]),
            rule(
                Some(json!({ "region": "us", "tier": "gold" })),
                vec![DeliveryMethod::Call],
            ),
            rule(None, vec![DeliveryMethod::Sms]),
        ]);

        let selected =
            select_rule(&event, &metadata(json!({ "region": "us", "tier": "gold" }))).unwrap();
        assert_eq!(selected.delivery_methods, vec![DeliveryMethod::Email]);
    }

    #[test]
    fn test_falls_back_to_default() {
        let event = event(vec![
            rule(None, vec![DeliveryMethod::Sms]),
            rule(Some(json!({ "region": "us" })), vec![DeliveryMethod::Email]),
        ]);

        let selected = select_rule(&event, &metadata(json!({ "region": "eu" }))).unwrap();
        assert!(selected.is_default());
    }

    #[test]
    fn test_missing_default_is_configuration_error() {
        let event = event(vec![rule(
            Some(json!({ "region": "us" })),
            vec![DeliveryMethod::Email],
        )]);

        let err = select_rule(&event, &Map::new()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingDefaultRule {
                queue: "distribution".to_string(),
                event_type: "order.created".to_string(),
            }
        );
    }

    #[test]
    fn test_has_selectors_edge_cases() {
        let labels = vec!["region".to_string()];

        assert!(has_selectors(&labels, &Map::new(), &Map::new()));
        assert!(has_selectors(
            &labels,
            &metadata(json!({ "channel": "web" })),
            &Map::new()
        ));
        assert!(!has_selectors(
            &labels,
            &metadata(json!({ "region": "us" })),
            &Map::new()
        ));
        assert!(!has_selectors(
            &labels,
            &metadata(json!({ "region": "us" })),
            &metadata(json!({ "region": "US" }))
        ));
    }
}
