use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                $name(value)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a posted job.
    JobId
);

uuid_id!(
    /// Identifier of a contractor's quote on a bidding job.
    QuoteId
);

uuid_id!(
    /// Identifier of an authenticated marketplace account (customer or
    /// contractor).
    UserId
);

uuid_id!(
    /// Identifier of a worker on a contractor's roster.
    WorkerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_uuid() {
        let raw = Uuid::from_u128(42);
        assert_eq!(JobId(raw).to_string(), raw.to_string());
        assert_eq!(WorkerId::from(raw).to_uuid(), raw);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn ids_serialize_as_bare_uuids() {
        let id = QuoteId(Uuid::from_u128(7));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000007\"");
    }
}
