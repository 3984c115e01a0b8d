//! Cache key formats.
//!
//! Every key the engine reads or writes is produced by [`format_key`] /
//! [`KeyDescriptor::render`] and every key is taken apart by [`parse_key`].
//! Nothing else in the workspace splits key strings.
//!
//! Supported shapes:
//!
//! ```text
//! {entity_type}:{marketplace}:{shop_id}:{entity_id}   external entity
//! {entity_type}:{marketplace}:{shop_id}               collection reference
//! user:{owner}:{entity_type}:{entity_id}              owner-scoped entity
//! user:{owner}:{entity_type}                          owner collection
//! account:{marketplace}:{shop_id}                     account
//! account:{shop_id}                                   legacy account
//! user:{owner}:account:{marketplace}:{shop_id}        owner-scoped account
//! user:{owner}:{entity_type}:timeline                 timeline index
//! ```

use crate::{HydraError, HydraResult};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Entity type with its own key family (`account:*`).
pub const ACCOUNTS_ENTITY: &str = "accounts";

const OWNER_PREFIX: &str = "user";
const ACCOUNT_PREFIX: &str = "account";
const TIMELINE_SUFFIX: &str = "timeline";
const SEPARATOR: char = ':';

/// Optional coordinates used to pick a key shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminators {
    /// Marketplace the entity lives in (e.g. `meli`).
    pub marketplace: Option<String>,
    /// Shop identifier inside the marketplace.
    pub shop_id: Option<String>,
    /// Entity identifier.
    pub entity_id: Option<String>,
    /// Owner identifier (already resolved to the effective owner).
    pub owner: Option<String>,
}

impl Discriminators {
    /// Creates an empty set of discriminators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the marketplace.
    #[must_use]
    pub fn marketplace(mut self, marketplace: impl Into<String>) -> Self {
        self.marketplace = Some(marketplace.into());
        self
    }

    /// Sets the shop id.
    #[must_use]
    pub fn shop(mut self, shop_id: impl Into<String>) -> Self {
        self.shop_id = Some(shop_id.into());
        self
    }

    /// Sets the entity id.
    #[must_use]
    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Logical coordinates of a cache key, one variant per key shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum KeyDescriptor {
    /// `{entity_type}:{marketplace}:{shop_id}:{entity_id}`
    External {
        entity_type: String,
        marketplace: String,
        shop_id: String,
        entity_id: String,
    },
    /// `{entity_type}:{marketplace}:{shop_id}`
    Collection {
        entity_type: String,
        marketplace: String,
        shop_id: String,
    },
    /// `user:{owner}:{entity_type}:{entity_id}`
    Owned {
        owner: String,
        entity_type: String,
        entity_id: String,
    },
    /// `user:{owner}:{entity_type}`
    OwnerCollection { owner: String, entity_type: String },
    /// `account:{marketplace}:{shop_id}` or legacy `account:{shop_id}`
    Account {
        marketplace: Option<String>,
        shop_id: String,
    },
    /// `user:{owner}:account:{marketplace}:{shop_id}`
    OwnerAccount {
        owner: String,
        marketplace: String,
        shop_id: String,
    },
    /// `user:{owner}:{entity_type}:timeline`
    Timeline { owner: String, entity_type: String },
}

impl KeyDescriptor {
    /// Picks the key shape for `entity_type` from the supplied discriminators.
    ///
    /// Returns a validation error when the chosen shape needs an owner that
    /// was not supplied, or when a segment is empty or contains `:`.
    pub fn from_parts(entity_type: &str, parts: &Discriminators) -> HydraResult<Self> {
        check_segment("entity_type", entity_type)?;

        let marketplace = parts.marketplace.as_deref();
        let shop_id = parts.shop_id.as_deref();
        let entity_id = parts.entity_id.as_deref();

        let descriptor = if entity_type == ACCOUNTS_ENTITY {
            match (marketplace, shop_id, entity_id) {
                (Some(m), _, Some(id)) => Self::Account {
                    marketplace: Some(m.to_string()),
                    shop_id: id.to_string(),
                },
                (None, _, Some(id)) => Self::Account {
                    marketplace: None,
                    shop_id: id.to_string(),
                },
                (Some(m), Some(shop), None) => Self::OwnerAccount {
                    owner: required_owner(parts)?,
                    marketplace: m.to_string(),
                    shop_id: shop.to_string(),
                },
                _ => Self::OwnerCollection {
                    owner: required_owner(parts)?,
                    entity_type: entity_type.to_string(),
                },
            }
        } else {
            match (marketplace, shop_id, entity_id) {
                (Some(m), Some(shop), Some(id)) => Self::External {
                    entity_type: entity_type.to_string(),
                    marketplace: m.to_string(),
                    shop_id: shop.to_string(),
                    entity_id: id.to_string(),
                },
                (Some(m), Some(shop), None) => Self::Collection {
                    entity_type: entity_type.to_string(),
                    marketplace: m.to_string(),
                    shop_id: shop.to_string(),
                },
                (_, _, Some(id)) => Self::Owned {
                    owner: required_owner(parts)?,
                    entity_type: entity_type.to_string(),
                    entity_id: id.to_string(),
                },
                _ => Self::OwnerCollection {
                    owner: required_owner(parts)?,
                    entity_type: entity_type.to_string(),
                },
            }
        };

        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Descriptor of the timeline index for `owner` and `entity_type`.
    pub fn timeline(owner: &str, entity_type: &str) -> HydraResult<Self> {
        let descriptor = Self::Timeline {
            owner: owner.to_string(),
            entity_type: entity_type.to_string(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reverse of [`render`](Self::render). Returns `None` for keys that do
    /// not match any known shape.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        fn owned(s: &str) -> String {
            s.to_string()
        }

        match parts.as_slice() {
            [OWNER_PREFIX, owner, ACCOUNT_PREFIX, marketplace, shop_id] => Some(Self::OwnerAccount {
                owner: owned(owner),
                marketplace: owned(marketplace),
                shop_id: owned(shop_id),
            }),
            [OWNER_PREFIX, owner, entity_type, TIMELINE_SUFFIX] => Some(Self::Timeline {
                owner: owned(owner),
                entity_type: owned(entity_type),
            }),
            [OWNER_PREFIX, owner, entity_type, entity_id] => Some(Self::Owned {
                owner: owned(owner),
                entity_type: owned(entity_type),
                entity_id: owned(entity_id),
            }),
            [OWNER_PREFIX, owner, entity_type] => Some(Self::OwnerCollection {
                owner: owned(owner),
                entity_type: owned(entity_type),
            }),
            [OWNER_PREFIX, ..] => None,
            [ACCOUNT_PREFIX, marketplace, shop_id] => Some(Self::Account {
                marketplace: Some(owned(marketplace)),
                shop_id: owned(shop_id),
            }),
            [ACCOUNT_PREFIX, shop_id] => Some(Self::Account {
                marketplace: None,
                shop_id: owned(shop_id),
            }),
            [ACCOUNT_PREFIX, ..] => None,
            [entity_type, marketplace, shop_id, entity_id] => Some(Self::External {
                entity_type: owned(entity_type),
                marketplace: owned(marketplace),
                shop_id: owned(shop_id),
                entity_id: owned(entity_id),
            }),
            [entity_type, marketplace, shop_id] => Some(Self::Collection {
                entity_type: owned(entity_type),
                marketplace: owned(marketplace),
                shop_id: owned(shop_id),
            }),
            _ => None,
        }
    }

    /// Renders the canonical key string.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Entity type the key belongs to.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        match self {
            Self::External { entity_type, .. }
            | Self::Collection { entity_type, .. }
            | Self::Owned { entity_type, .. }
            | Self::OwnerCollection { entity_type, .. }
            | Self::Timeline { entity_type, .. } => entity_type,
            Self::Account { .. } | Self::OwnerAccount { .. } => ACCOUNTS_ENTITY,
        }
    }

    /// Identifier of the entity the key points at, if the shape carries one.
    ///
    /// Account keys are identified by their shop id.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::External { entity_id, .. } | Self::Owned { entity_id, .. } => Some(entity_id),
            Self::Account { shop_id, .. } | Self::OwnerAccount { shop_id, .. } => Some(shop_id),
            Self::Collection { .. } | Self::OwnerCollection { .. } | Self::Timeline { .. } => None,
        }
    }

    /// Owner of the key, for owner-scoped shapes.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Owned { owner, .. }
            | Self::OwnerCollection { owner, .. }
            | Self::OwnerAccount { owner, .. }
            | Self::Timeline { owner, .. } => Some(owner),
            Self::External { .. } | Self::Collection { .. } | Self::Account { .. } => None,
        }
    }

    /// Flattens the descriptor back into discriminators.
    #[must_use]
    pub fn discriminators(&self) -> Discriminators {
        let s = |v: &String| Some(v.clone());
        match self {
            Self::External {
                marketplace,
                shop_id,
                entity_id,
                ..
            } => Discriminators {
                marketplace: s(marketplace),
                shop_id: s(shop_id),
                entity_id: s(entity_id),
                owner: None,
            },
            Self::Collection {
                marketplace,
                shop_id,
                ..
            } => Discriminators {
                marketplace: s(marketplace),
                shop_id: s(shop_id),
                ..Discriminators::default()
            },
            Self::Owned {
                owner, entity_id, ..
            } => Discriminators {
                entity_id: s(entity_id),
                owner: s(owner),
                ..Discriminators::default()
            },
            Self::OwnerCollection { owner, .. } | Self::Timeline { owner, .. } => Discriminators {
                owner: s(owner),
                ..Discriminators::default()
            },
            Self::Account {
                marketplace,
                shop_id,
            } => Discriminators {
                marketplace: marketplace.clone(),
                shop_id: s(shop_id),
                entity_id: s(shop_id),
                owner: None,
            },
            Self::OwnerAccount {
                owner,
                marketplace,
                shop_id,
            } => Discriminators {
                marketplace: s(marketplace),
                shop_id: s(shop_id),
                entity_id: s(shop_id),
                owner: s(owner),
            },
        }
    }

    fn validate(&self) -> HydraResult<()> {
        match self {
            Self::External {
                entity_type,
                marketplace,
                shop_id,
                entity_id,
            } => {
                check_unprefixed(entity_type)?;
                check_segment("marketplace", marketplace)?;
                check_segment("shop_id", shop_id)?;
                check_segment("entity_id", entity_id)
            }
            Self::Collection {
                entity_type,
                marketplace,
                shop_id,
            } => {
                check_unprefixed(entity_type)?;
                check_segment("marketplace", marketplace)?;
                check_segment("shop_id", shop_id)
            }
            Self::Owned {
                owner,
                entity_type,
                entity_id,
            } => {
                check_segment("owner", owner)?;
                check_segment("entity_type", entity_type)?;
                check_segment("entity_id", entity_id)?;
                if entity_id == TIMELINE_SUFFIX {
                    return Err(HydraError::validation(
                        "entity_id 'timeline' is reserved for timeline keys",
                    ));
                }
                Ok(())
            }
            Self::OwnerCollection { owner, entity_type } | Self::Timeline { owner, entity_type } => {
                check_segment("owner", owner)?;
                check_segment("entity_type", entity_type)
            }
            Self::Account {
                marketplace,
                shop_id,
            } => {
                if let Some(m) = marketplace {
                    check_segment("marketplace", m)?;
                }
                check_segment("shop_id", shop_id)
            }
            Self::OwnerAccount {
                owner,
                marketplace,
                shop_id,
            } => {
                check_segment("owner", owner)?;
                check_segment("marketplace", marketplace)?;
                check_segment("shop_id", shop_id)
            }
        }
    }
}

impl Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External {
                entity_type,
                marketplace,
                shop_id,
                entity_id,
            } => write!(f, "{entity_type}:{marketplace}:{shop_id}:{entity_id}"),
            Self::Collection {
                entity_type,
                marketplace,
                shop_id,
            } => write!(f, "{entity_type}:{marketplace}:{shop_id}"),
            Self::Owned {
                owner,
                entity_type,
                entity_id,
            } => write!(f, "{OWNER_PREFIX}:{owner}:{entity_type}:{entity_id}"),
            Self::OwnerCollection { owner, entity_type } => {
                write!(f, "{OWNER_PREFIX}:{owner}:{entity_type}")
            }
            Self::Account {
                marketplace: Some(marketplace),
                shop_id,
            } => write!(f, "{ACCOUNT_PREFIX}:{marketplace}:{shop_id}"),
            Self::Account {
                marketplace: None,
                shop_id,
            } => write!(f, "{ACCOUNT_PREFIX}:{shop_id}"),
            Self::OwnerAccount {
                owner,
                marketplace,
                shop_id,
            } => write!(
                f,
                "{OWNER_PREFIX}:{owner}:{ACCOUNT_PREFIX}:{marketplace}:{shop_id}"
            ),
            Self::Timeline { owner, entity_type } => {
                write!(f, "{OWNER_PREFIX}:{owner}:{entity_type}:{TIMELINE_SUFFIX}")
            }
        }
    }
}

/// Formats the canonical key for `entity_type` and `parts`.
pub fn format_key(entity_type: &str, parts: &Discriminators) -> HydraResult<String> {
    KeyDescriptor::from_parts(entity_type, parts).map(|d| d.render())
}

/// Parses a key into its discriminators, or `None` for unknown shapes.
#[must_use]
pub fn parse_key(key: &str) -> Option<Discriminators> {
    KeyDescriptor::parse(key).map(|d| d.discriminators())
}

/// Formats the timeline key `user:{owner}:{entity_type}:timeline`.
pub fn timeline_key(owner: &str, entity_type: &str) -> HydraResult<String> {
    KeyDescriptor::timeline(owner, entity_type).map(|d| d.render())
}

/// Extracts the entity id a key points at, if its shape carries one.
#[must_use]
pub fn entity_id_from_key(key: &str) -> Option<String> {
    KeyDescriptor::parse(key).and_then(|d| d.entity_id().map(str::to_string))
}

fn required_owner(parts: &Discriminators) -> HydraResult<String> {
    parts
        .owner
        .clone()
        .ok_or_else(|| HydraError::validation("owner is required for owner-scoped keys"))
}

fn check_segment(name: &str, value: &str) -> HydraResult<()> {
    if value.is_empty() {
        return Err(HydraError::validation(format!("{name} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(HydraError::validation(format!(
            "{name} must not contain '{SEPARATOR}': {value}"
        )));
    }
    Ok(())
}

fn check_unprefixed(entity_type: &str) -> HydraResult<()> {
    check_segment("entity_type", entity_type)?;
    if entity_type == OWNER_PREFIX || entity_type == ACCOUNT_PREFIX {
        return Err(HydraError::validation(format!(
            "entity_type '{entity_type}' collides with a reserved key prefix"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_key() {
        let parts = Discriminators::new()
            .marketplace("meli")
            .shop("SHOP1")
            .entity("ORDER9");
        let key = format_key("orders", &parts).unwrap();
        assert_eq!(key, "orders:meli:SHOP1:ORDER9");
    }

    #[test]
    fn test_collection_key() {
        let parts = Discriminators::new().marketplace("meli").shop("SHOP1");
        assert_eq!(format_key("ads", &parts).unwrap(), "ads:meli:SHOP1");
    }

    #[test]
    fn test_owned_and_owner_collection_keys() {
        let parts = Discriminators::new().owner("U1").entity("42");
        assert_eq!(format_key("uploads", &parts).unwrap(), "user:U1:uploads:42");

        let parts = Discriminators::new().owner("U1");
        assert_eq!(format_key("uploads", &parts).unwrap(), "user:U1:uploads");
    }

    #[test]
    fn test_account_keys() {
        let parts = Discriminators::new().marketplace("meli").entity("SHOP1");
        assert_eq!(format_key("accounts", &parts).unwrap(), "account:meli:SHOP1");

        let parts = Discriminators::new().entity("SHOP1");
        assert_eq!(format_key("accounts", &parts).unwrap(), "account:SHOP1");

        let parts = Discriminators::new().owner("U1").marketplace("meli").shop("SHOP1");
        assert_eq!(
            format_key("accounts", &parts).unwrap(),
            "user:U1:account:meli:SHOP1"
        );

        let parts = Discriminators::new().owner("U1");
        assert_eq!(format_key("accounts", &parts).unwrap(), "user:U1:accounts");
    }

    #[test]
    fn test_timeline_key() {
        assert_eq!(
            timeline_key("U1", "orders").unwrap(),
            "user:U1:orders:timeline"
        );
    }

    #[test]
    fn test_missing_owner_is_validation_error() {
        let parts = Discriminators::new().entity("42");
        let err = format_key("uploads", &parts).unwrap_err();
        assert!(matches!(err, HydraError::Validation(_)));
    }

    #[test]
    fn test_separator_in_segment_rejected() {
        let parts = Discriminators::new()
            .marketplace("meli")
            .shop("SHOP:1")
            .entity("ORDER9");
        assert!(format_key("orders", &parts).is_err());
        assert!(timeline_key("", "orders").is_err());
    }

    #[test]
    fn test_reserved_values_rejected() {
        let parts = Discriminators::new().marketplace("meli").shop("S").entity("E");
        assert!(format_key("user", &parts).is_err());

        let parts = Discriminators::new().owner("U1").entity("timeline");
        assert!(format_key("orders", &parts).is_err());
    }

    #[test]
    fn test_parse_each_shape() {
        assert_eq!(
            KeyDescriptor::parse("orders:meli:SHOP1:ORDER9"),
            Some(KeyDescriptor::External {
                entity_type: "orders".to_string(),
                marketplace: "meli".to_string(),
                shop_id: "SHOP1".to_string(),
                entity_id: "ORDER9".to_string(),
            })
        );
        assert!(matches!(
            KeyDescriptor::parse("ads:meli:SHOP1"),
            Some(KeyDescriptor::Collection { .. })
        ));
        assert!(matches!(
            KeyDescriptor::parse("user:U1:uploads:42"),
            Some(KeyDescriptor::Owned { .. })
        ));
        assert!(matches!(
            KeyDescriptor::parse("user:U1:uploads"),
            Some(KeyDescriptor::OwnerCollection { .. })
        ));
        assert!(matches!(
            KeyDescriptor::parse("user:U1:orders:timeline"),
            Some(KeyDescriptor::Timeline { .. })
        ));
        assert!(matches!(
            KeyDescriptor::parse("user:U1:account:meli:SHOP1"),
            Some(KeyDescriptor::OwnerAccount { .. })
        ));
        assert_eq!(
            KeyDescriptor::parse("account:SHOP1"),
            Some(KeyDescriptor::Account {
                marketplace: None,
                shop_id: "SHOP1".to_string()
            })
        );
    }

    #[test]
    fn test_parse_unknown_shapes() {
        assert_eq!(KeyDescriptor::parse("cold-key"), None);
        assert_eq!(KeyDescriptor::parse("a:b"), None);
        assert_eq!(KeyDescriptor::parse("user:U1"), None);
        assert_eq!(KeyDescriptor::parse("orders::SHOP1:ORDER9"), None);
        assert_eq!(KeyDescriptor::parse("a:b:c:d:e"), None);
    }

    #[test]
    fn test_parse_then_render_is_identity() {
        for key in [
            "orders:meli:SHOP1:ORDER9",
            "ads:meli:SHOP1",
            "user:U1:uploads:42",
            "user:U1:uploads",
            "account:meli:SHOP1",
            "account:SHOP1",
            "user:U1:account:meli:SHOP1",
            "user:U1:orders:timeline",
        ] {
            let descriptor = KeyDescriptor::parse(key).unwrap();
            assert_eq!(descriptor.render(), key);
        }
    }

    #[test]
    fn test_entity_id_extraction() {
        assert_eq!(
            entity_id_from_key("orders:meli:SHOP1:ORDER9").as_deref(),
            Some("ORDER9")
        );
        assert_eq!(entity_id_from_key("account:meli:SHOP1").as_deref(), Some("SHOP1"));
        assert_eq!(entity_id_from_key("user:U1:orders:timeline"), None);
        assert_eq!(entity_id_from_key("cold-key"), None);
    }

    #[test]
    fn test_parse_key_discriminators() {
        let parts = parse_key("user:U1:account:meli:SHOP1").unwrap();
        assert_eq!(parts.owner.as_deref(), Some("U1"));
        assert_eq!(parts.marketplace.as_deref(), Some("meli"));
        assert_eq!(parts.shop_id.as_deref(), Some("SHOP1"));
        assert_eq!(parts.entity_id.as_deref(), Some("SHOP1"));

        let descriptor = KeyDescriptor::parse("account:meli:SHOP1").unwrap();
        assert_eq!(descriptor.entity_type(), ACCOUNTS_ENTITY);
        assert_eq!(descriptor.owner(), None);
    }

    #[test]
    fn test_format_parse_round_trip_through_discriminators() {
        let parts = Discriminators::new()
            .marketplace("meli")
            .shop("SHOP1")
            .entity("ORDER9");
        let descriptor = KeyDescriptor::from_parts("orders", &parts).unwrap();
        let reparsed = KeyDescriptor::parse(&descriptor.render()).unwrap();
        assert_eq!(reparsed, descriptor);
        assert_eq!(reparsed.discriminators(), parts);
    }
}
