//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs keep a `ChargeId` from ever being passed
//! where a `PaymentId` is expected. Each id displays with a short prefix
//! (`CHG-…`, `PAY-…`) and parses with or without it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            ///
            /// Ledger rows use v7 ids so that id order follows creation order.
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let uuid_str = trimmed
                    .strip_prefix(concat!($prefix, "-"))
                    .unwrap_or(trimmed);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Tenancy identifiers (owned by the surrounding property-management system)
define_id!(TenantId, "TEN");
define_id!(ContractId, "CTR");
define_id!(UnitId, "UNT");
define_id!(RenterId, "RNT");
define_id!(ActorId, "USR");

// Receivables ledger identifiers
define_id!(ChargeId, "CHG");
define_id!(PaymentId, "PAY");
define_id!(AllocationId, "ALC");
define_id!(CreditBalanceId, "CRB");
define_id!(DunningNoticeId, "DUN");

// Generic identifiers
define_id!(AuditEventId, "AUD");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_id_display() {
        let id = ChargeId::new();
        assert!(id.to_string().starts_with("CHG-"));
    }

    #[test]
    fn test_id_parsing_with_and_without_prefix() {
        let original = PaymentId::new_v7();
        let parsed: PaymentId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let bare: PaymentId = original.as_uuid().to_string().parse().unwrap();
        assert_eq!(original, bare);
    }

    #[test]
    fn test_uuid_conversion() {
        let uuid = Uuid::new_v4();
        let tenant = TenantId::from(uuid);
        let back: Uuid = tenant.into();
        assert_eq!(uuid, back);
    }
}
