use async_trait::async_trait;
use common::Money;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{InventoryError, Product, ProductId, ProductStore, Result, StockVersion};

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stock_quantity, is_active, \
     category, material, version, created_at, updated_at";

/// PostgreSQL-backed product store.
///
/// Stock writes are a single conditional `UPDATE … WHERE version = $expected`,
/// so concurrent writers from any number of processes serialize on the row.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations for products and orders.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock_quantity")?;
        let stock_quantity = u32::try_from(stock)
            .map_err(|e| InventoryError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity,
            is_active: row.try_get("is_active")?,
            category: row.try_get("category")?,
            material: row.try_get("material")?,
            version: StockVersion::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn update_stock(
        &self,
        id: ProductId,
        new_quantity: u32,
        expected: StockVersion,
    ) -> Result<StockVersion> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = $1, version = version + 1, updated_at = NOW()
            WHERE id = $2 AND version = $3
            RETURNING version
            "#,
        )
        .bind(i64::from(new_quantity))
        .bind(id.as_i64())
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(StockVersion::new(version));
        }

        // Nothing matched: tell a missing row apart from a lost race.
        let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM products WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(InventoryError::StockConflict {
                product_id: id,
                expected,
            }),
            None => Err(InventoryError::ProductNotFound(id)),
        }
    }

    async fn upsert(&self, product: Product) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, name, description, price_cents, stock_quantity, is_active,
                                  category, material, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price_cents = EXCLUDED.price_cents,
                stock_quantity = EXCLUDED.stock_quantity,
                is_active = EXCLUDED.is_active,
                category = EXCLUDED.category,
                material = EXCLUDED.material,
                version = products.version + 1,
                updated_at = NOW()
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id.as_i64())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock_quantity))
        .bind(product.is_active)
        .bind(&product.category)
        .bind(&product.material)
        .bind(product.created_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }
}
