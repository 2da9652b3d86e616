//! # Product Repository
//!
//! The slice of product storage the ledger needs outside a sale: seeding,
//! stock reads and the low-stock list. Product CRUD proper belongs to the
//! catalog service.
//!
//! Stock is never written from here while selling; see
//! [`inventory`](super::inventory) for the in-transaction adjuster.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::Product;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.insert(&product).await?;
/// let stock = repo.stock_of(&ctx.tenant_id, &product.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID within a tenant.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - No such product in this tenant
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, tenant_id, name, stock, min_stock
            FROM products
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - ID already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, tenant_id = %product.tenant_id, "Inserting product");

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO products (id, tenant_id, name, stock, min_stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.name)
        .bind(product.stock)
        .bind(product.min_stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Returns the current stock of a product.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No such product in this tenant
    pub async fn stock_of(&self, tenant_id: &str, id: &str) -> DbResult<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1 AND tenant_id = ?2")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        stock.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Lists the tenant's products at or below their minimum stock.
    pub async fn low_stock(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        debug!(tenant_id = %tenant_id, "Listing low-stock products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, tenant_id, name, stock, min_stock
            FROM products
            WHERE tenant_id = ?1 AND stock <= min_stock
            ORDER BY stock ASC, name ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn product(tenant: &str, name: &str, stock: i64, min_stock: i64) -> Product {
        Product {
            id: generate_product_id(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            stock,
            min_stock,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let cola = repo.insert(&product("t-1", "Cola", 24, 5)).await.unwrap();

        let found = repo.get_by_id("t-1", &cola.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Cola");
        assert_eq!(repo.stock_of("t-1", &cola.id).await.unwrap(), 24);
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let cola = repo.insert(&product("t-1", "Cola", 24, 5)).await.unwrap();

        assert!(repo.get_by_id("t-2", &cola.id).await.unwrap().is_none());
        assert!(matches!(
            repo.stock_of("t-2", &cola.id).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_low_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&product("t-1", "Cola", 24, 5)).await.unwrap();
        repo.insert(&product("t-1", "Chips", 3, 5)).await.unwrap();
        repo.insert(&product("t-1", "Gum", 5, 5)).await.unwrap();
        repo.insert(&product("t-2", "Water", 0, 5)).await.unwrap();

        let low = repo.low_stock("t-1").await.unwrap();
        let names: Vec<&str> = low.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Chips", "Gum"]);
        assert!(low.iter().all(|p| p.is_low_stock()));
    }
}
