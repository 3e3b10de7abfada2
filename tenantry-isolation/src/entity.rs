//! Entity Descriptors
//!
//! Storage-side description of a persisted type: its fields, key, and the
//! flags that decide whether tenant scoping applies to it.

use crate::predicate::Expr;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;

/// Records are JSON objects keyed by field name
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Entity descriptor
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    type_id: Option<TypeId>,
    fields: Vec<String>,
    key: Option<String>,
    owned: bool,
    global: bool,
    filter: Option<Expr>,
}

impl EntityDescriptor {
    /// New descriptor keyed by `id`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            fields: Vec::new(),
            key: Some("id".to_string()),
            owned: false,
            global: false,
            filter: None,
        }
    }

    /// Descriptor bound to a Rust type
    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name);
        descriptor.type_id = Some(TypeId::of::<T>());
        descriptor
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Entity has no primary key
    pub fn keyless(mut self) -> Self {
        self.key = None;
        self
    }

    /// Entity is owned by (embedded in) another entity
    pub fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    /// Entity is shared across tenants
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Pre-existing filter (soft delete and the like)
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }
}

/// A persisted type
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn descriptor() -> EntityDescriptor;
}

const IDENTITY_NAMES: &[&str] = &[
    "User",
    "Role",
    "UserRole",
    "UserClaim",
    "UserLogin",
    "UserToken",
    "RoleClaim",
];

/// Name heuristic for identity-framework types
pub fn is_identity_entity(name: &str) -> bool {
    name.starts_with("Identity") || IDENTITY_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        struct Order;
        let descriptor = EntityDescriptor::of::<Order>("Order")
            .with_fields(["id", "tenant_id", "total"])
            .with_key("id");

        assert_eq!(descriptor.name(), "Order");
        assert_eq!(descriptor.type_id(), Some(TypeId::of::<Order>()));
        assert!(descriptor.has_field("tenant_id"));
        assert!(!descriptor.has_field("status"));
        assert_eq!(descriptor.key(), Some("id"));
        assert!(!descriptor.is_global());
    }

    #[test]
    fn test_keyless_and_owned() {
        let view = EntityDescriptor::new("SalesView").keyless();
        assert!(view.key().is_none());

        let address = EntityDescriptor::new("Address").owned();
        assert!(address.is_owned());
    }

    #[test]
    fn test_identity_heuristic() {
        assert!(is_identity_entity("IdentityUser"));
        assert!(is_identity_entity("UserClaim"));
        assert!(!is_identity_entity("Order"));
        assert!(!is_identity_entity("Username"));
    }
}
