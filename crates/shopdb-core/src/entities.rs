use serde::{Deserialize, Serialize};

/// Catalog entity kinds that are embedded and searched by the assistant.
///
/// Each kind lives in its own vector collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Category,
    Order,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Product, EntityKind::Category, EntityKind::Order];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Category => "category",
            EntityKind::Order => "order",
        }
    }

    /// Suffix appended to the collection prefix, e.g. `shopdb_products`.
    #[must_use]
    pub fn collection_suffix(self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Category => "categories",
            EntityKind::Order => "orders",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" | "products" => Ok(EntityKind::Product),
            "category" | "categories" => Ok(EntityKind::Category),
            "order" | "orders" => Ok(EntityKind::Order),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_and_plural_names() {
        assert_eq!("products".parse::<EntityKind>(), Ok(EntityKind::Product));
        assert_eq!("Category".parse::<EntityKind>(), Ok(EntityKind::Category));
        assert_eq!(" order ".parse::<EntityKind>(), Ok(EntityKind::Order));
        assert!("review".parse::<EntityKind>().is_err());
    }

    #[test]
    fn ordering_puts_products_first() {
        let mut kinds = vec![EntityKind::Order, EntityKind::Product, EntityKind::Category];
        kinds.sort();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
    }
}
