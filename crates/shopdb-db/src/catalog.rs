//! Read-only catalog queries used to build the assistant's vector index.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A product joined with its category name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductIndexRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// May contain storefront HTML.
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub category_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A category with its parent name and the number of active products in it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryIndexRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_name: Option<String>,
    pub product_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub order_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// An order with its line items. Assembled from two queries, not a single row.
#[derive(Debug, Clone)]
pub struct OrderIndexRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: i64,
    pub status: String,
    pub total: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemRow>,
}

#[derive(sqlx::FromRow)]
struct OrderHeaderRow {
    id: i64,
    public_id: Uuid,
    user_id: i64,
    status: String,
    total: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// All products, active or not, ordered by id.
///
/// Inactive products are included; the indexer builds no document for them.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_for_index(pool: &PgPool) -> Result<Vec<ProductIndexRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductIndexRow>(
        "SELECT p.id, p.name, p.slug, p.description, p.price, p.currency, \
                p.stock_quantity, p.is_active, c.name AS category_name, p.updated_at \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         ORDER BY p.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All categories with active-product counts, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories_for_index(pool: &PgPool) -> Result<Vec<CategoryIndexRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryIndexRow>(
        "SELECT c.id, c.name, c.slug, c.description, parent.name AS parent_name, \
                COUNT(p.id) FILTER (WHERE p.is_active) AS product_count \
         FROM categories c \
         LEFT JOIN categories parent ON parent.id = c.parent_id \
         LEFT JOIN products p ON p.category_id = c.id \
         GROUP BY c.id, parent.name \
         ORDER BY c.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All orders with their line items, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_orders_for_index(pool: &PgPool) -> Result<Vec<OrderIndexRow>, DbError> {
    let headers = sqlx::query_as::<_, OrderHeaderRow>(
        "SELECT id, public_id, user_id, status, total, currency, created_at \
         FROM orders \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
    let items = sqlx::query_as::<_, OrderItemRow>(
        "SELECT order_id, product_name, quantity, unit_price \
         FROM order_items \
         WHERE order_id = ANY($1) \
         ORDER BY order_id, id",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_order: HashMap<i64, Vec<OrderItemRow>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(headers
        .into_iter()
        .map(|h| OrderIndexRow {
            items: by_order.remove(&h.id).unwrap_or_default(),
            id: h.id,
            public_id: h.public_id,
            user_id: h.user_id,
            status: h.status,
            total: h.total,
            currency: h.currency,
            created_at: h.created_at,
        })
        .collect())
}

/// Names of every product, inactive ones included, used to detect product
/// mentions in answers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_names(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT name FROM products ORDER BY name")
    .fetch_all(pool)
    .await?;

    Ok(names)
}
