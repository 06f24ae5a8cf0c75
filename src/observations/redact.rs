use serde::Serialize;
use serde_json::Value;

use crate::auth::claims::{Claims, Tier};

const RAW_PAYLOAD: &str = "raw_payload";

/// What part of a serialized observation a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Full,
    Processed,
}

impl Visibility {
    pub fn for_claims(claims: &Claims) -> Self {
        if claims.tier == Tier::Raw || claims.is_admin() {
            Visibility::Full
        } else {
            Visibility::Processed
        }
    }

    /// Strip `raw_payload` from a serialized record, or from each record of a list.
    pub fn redact(self, mut value: Value) -> Value {
        if self == Visibility::Full {
            return value;
        }
        match &mut value {
            Value::Object(map) => {
                map.remove(RAW_PAYLOAD);
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        map.remove(RAW_PAYLOAD);
                    }
                }
            }
            _ => {}
        }
        value
    }

    /// Serialize then redact.
    pub fn render<T: Serialize>(self, record: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(record).map(|v| self.redact(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Role;
    use serde_json::json;
    use uuid::Uuid;

    fn claims(role: Role, tier: Tier) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            role,
            tier,
            buoy_id: None,
            iat: 0,
            exp: 0,
            iss: "i".into(),
            aud: "a".into(),
        }
    }

    #[test]
    fn raw_tier_or_admin_sees_everything() {
        assert_eq!(Visibility::for_claims(&claims(Role::Researcher, Tier::Raw)), Visibility::Full);
        assert_eq!(Visibility::for_claims(&claims(Role::Admin, Tier::Processed)), Visibility::Full);
        assert_eq!(
            Visibility::for_claims(&claims(Role::Device, Tier::Processed)),
            Visibility::Processed
        );
    }

    #[test]
    fn processed_callers_lose_the_key_not_just_the_value() {
        let record = json!({"id": 1, "raw_payload": {"sensors": {"turbidity": 1.2}}});
        let out = Visibility::Processed.redact(record.clone());
        assert_eq!(out, json!({"id": 1}));
        assert_eq!(Visibility::Full.redact(record.clone()), record);
    }

    #[test]
    fn lists_are_redacted_item_by_item() {
        let list = json!([{"id": 1, "raw_payload": null}, {"id": 2, "raw_payload": {"a": 1}}]);
        let out = Visibility::Processed.redact(list);
        assert!(out
            .as_array()
            .unwrap()
            .iter()
            .all(|item| item.get("raw_payload").is_none()));
    }
}
