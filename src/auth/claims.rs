use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Researcher,
    Device,
}

/// Data-sensitivity class of a caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Processed,
    Raw,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Researcher => "researcher",
            Role::Device => "device",
        }
    }
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Processed => "processed",
            Tier::Raw => "raw",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "device" => Ok(Role::Device),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Tier::Processed),
            "raw" => Ok(Tier::Raw),
            other => anyhow::bail!("unknown tier '{other}'"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT payload: caller identity plus authorization attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub role: Role,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buoy_id: Option<String>, // device ownership
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_tier_round_trip_through_text() {
        for role in [Role::Admin, Role::Researcher, Role::Device] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        for tier in [Tier::Processed, Tier::Raw] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("user".parse::<Role>().is_err());
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn claims_reject_unknown_role() {
        let raw = serde_json::json!({
            "sub": Uuid::new_v4(), "role": "user", "tier": "raw",
            "iat": 0, "exp": 0, "iss": "i", "aud": "a"
        });
        assert!(serde_json::from_value::<Claims>(raw).is_err());
    }
}
