//! Newtype identifiers for every addressable entity (spec §3: "all entity
//! identifiers are opaque, serializable handles, not implementation details
//! such as database row numbers").

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(FlowId);
entity_id!(ExecutionId);
entity_id!(MockServerId);
entity_id!(MockRequestId);
entity_id!(ContractId);
entity_id!(ScheduleId);
entity_id!(ScheduleRunId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ids_are_distinct_and_round_trip_through_display() {
        let a = FlowId::new();
        let b = FlowId::new();
        assert_ne!(a, b);
        let parsed = FlowId::from_str(&a.to_string()).unwrap();
        assert_eq!(a, parsed);
    }
}
