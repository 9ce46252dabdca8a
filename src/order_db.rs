use crate::error::Result;
use crate::models::{Order, Product, Store};
use crate::parser::ParsedItem;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info};

const ORDER_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY,
        order_date TEXT NOT NULL,
        order_uid TEXT,
        delivery_date TEXT,
        delivery_address TEXT,
        location TEXT,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        submission_id TEXT,
        payment TEXT,
        total TEXT,
        comment TEXT
    );

    CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY,
        order_id INTEGER NOT NULL,
        store TEXT,
        store_id INTEGER,
        product_name TEXT,
        product_options TEXT,
        product_unit_price TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        FOREIGN KEY (order_id) REFERENCES orders(id)
    );

    CREATE INDEX IF NOT EXISTS idx_orders_delivery_date ON orders(delivery_date);
    CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items(order_id);
";

const CATALOG_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS stores (
        id INTEGER PRIMARY KEY,
        name TEXT,
        alias TEXT,
        tax INTEGER
    );

    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY,
        store_id INTEGER,
        name TEXT NOT NULL,
        options TEXT,
        price TEXT,
        cost TEXT,
        FOREIGN KEY (store_id) REFERENCES stores(id)
    );
";

pub struct OrderStore {
    pub(crate) conn: Connection,
}

impl OrderStore {
    /// Open (or create) the order database. `":memory:"` gives a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(ORDER_TABLES)?;
        conn.execute_batch(CATALOG_TABLES)?;

        info!(path = %db_path.display(), "Database initialized successfully");
        Ok(Self { conn })
    }

    /// Drop every saved order so a re-ingest does not duplicate rows.
    pub fn reset_orders(&self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS order_items;
             DROP TABLE IF EXISTS orders;",
        )?;
        self.conn.execute_batch(ORDER_TABLES)?;
        info!("Order tables reset");
        Ok(())
    }

    /// Replace the saved catalog. Products of stores not in `stores` are left
    /// out; the products actually saved are returned.
    pub fn replace_catalog(&self, stores: &[Store], products: &[Product]) -> Result<Vec<Product>> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS products;
             DROP TABLE IF EXISTS stores;",
        )?;
        tx.execute_batch(CATALOG_TABLES)?;

        for store in stores {
            tx.execute(
                "INSERT INTO stores (id, name, alias, tax) VALUES (?1, ?2, ?3, ?4)",
                params![store.id, store.name, store.alias, store.tax],
            )?;
        }

        let mut saved = Vec::new();
        for product in products {
            if !stores.iter().any(|s| s.id == product.store_id) {
                continue;
            }
            tx.execute(
                "INSERT INTO products (store_id, name, options, price, cost) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    product.store_id,
                    product.name,
                    product.options,
                    money(product.price),
                    money(product.cost),
                ],
            )?;
            saved.push(product.clone());
        }
        tx.commit()?;

        info!(stores = stores.len(), products = saved.len(), "Catalog saved");
        Ok(saved)
    }

    pub fn load_stores(&self) -> Result<Vec<Store>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, alias, tax FROM stores ORDER BY id")?;
        let stores = stmt.query_map([], |row| {
            Ok(Store {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                alias: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                tax: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                group: String::new(),
            })
        })?;
        Ok(stores.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn load_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare("SELECT store_id, name, options, price, cost FROM products ORDER BY id")?;
        let products = stmt.query_map([], |row| {
            Ok(Product {
                store_id: row.get(0)?,
                name: row.get(1)?,
                options: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                price: read_money(row, 3)?,
                cost: read_money(row, 4)?,
            })
        })?;
        Ok(products.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Save an order header, its items and its total together.
    pub fn save_order(&self, order: &Order, items: &[ParsedItem], total: Decimal) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO orders
                (order_date, order_uid, name, email, phone, submission_id, payment, comment,
                 delivery_date, location, delivery_address, total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                order.order_date,
                order.order_uid,
                order.name,
                order.email,
                order.phone,
                order.submission_id,
                order.payment,
                order.comment,
                order.delivery_date,
                order.location,
                order.delivery_address,
                money(total),
            ],
        )?;
        let order_id = tx.last_insert_rowid();

        for item in items {
            tx.execute(
                "INSERT INTO order_items
                    (order_id, store, store_id, product_name, product_options, product_unit_price, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    order_id,
                    item.store,
                    item.store_id,
                    item.product,
                    item.options,
                    money(item.price),
                    item.quantity,
                ],
            )?;
            debug!(
                order_id,
                store = %item.store,
                store_id = ?item.store_id,
                product = %item.product,
                options = %item.options,
                price = %item.price,
                quantity = item.quantity,
                "Order item stored"
            );
        }
        tx.commit()?;

        info!(order_id, uid = %order.order_uid, name = %order.name, total = %total, "Order stored");
        Ok(order_id)
    }

    #[cfg(test)]
    pub(crate) fn order_total(&self, order_id: i64) -> Result<Option<Decimal>> {
        let mut stmt = self.conn.prepare("SELECT total FROM orders WHERE id = ?1")?;
        let mut rows = stmt.query(params![order_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_money(row, 0)?)),
            None => Ok(None),
        }
    }

    /// (orders, order items) currently saved.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let orders: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        let items: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM order_items", [], |row| row.get(0))?;
        Ok((orders, items))
    }
}

/// Amounts are kept as normalized decimal text so "5.50" and "5.5" group together.
fn money(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Read an amount column written by [`money`], tolerating plain numbers.
pub(crate) fn read_money(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(Decimal::ZERO),
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Real, Box::new(e))),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes)
            .trim()
            .parse::<Decimal>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "amount".to_string(),
            Type::Blob,
        )),
    }
}
