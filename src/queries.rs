// src/queries.rs
//
// Read side of the order database: the groupings behind each report sheet.

use crate::error::Result;
use crate::order_db::{OrderStore, read_money};
use rusqlite::params;
use rust_decimal::Decimal;
use tracing::info;

/// One product line a store has to prepare, summed over all customers.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentRow {
    pub product: String,
    pub options: String,
    pub quantity: i64,
    pub price: Decimal,
    pub tax: i64,
}

/// One customer's item on a store's pick list.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRow {
    pub order_id: i64,
    pub location: String,
    pub name: String,
    pub comment: String,
    pub order_uid: String,
    pub product: String,
    pub options: String,
    pub quantity: i64,
}

/// One item on the consolidated customer invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    pub order_id: i64,
    pub location: String,
    pub order_uid: String,
    pub name: String,
    pub store_id: Option<i64>,
    pub store: String,
    pub product: String,
    pub options: String,
    pub price: Decimal,
    pub quantity: i64,
    pub tax: i64,
    pub comment: String,
    pub address: String,
    pub email: String,
    pub phone: String,
}

fn text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

impl OrderStore {
    /// Items of one store for one delivery date, grouped by
    /// (product, options, unit price) with quantities summed.
    ///
    /// Rows sharing a product name follow the catalog's product order;
    /// lines with no catalog entry come last, in the order they were saved.
    pub fn store_fulfillment_rows(&self, store_id: i64, delivery_date: &str) -> Result<Vec<FulfillmentRow>> {
        info!(store_id, delivery_date, "Analyzing store orders");
        let mut stmt = self.conn.prepare(
            "SELECT product_name, product_options, quantity, product_unit_price, tax FROM (
                SELECT i.product_name, i.product_options, SUM(i.quantity) AS quantity,
                       i.product_unit_price, c.tax, MIN(i.id) AS first_item,
                       (SELECT MIN(p.id) FROM products p
                        WHERE p.store_id = ?2 AND p.name = i.product_name
                          AND COALESCE(p.options, '') = COALESCE(i.product_options, '')) AS catalog_id
                FROM order_items i
                JOIN stores c ON i.store_id = c.id
                JOIN orders o ON i.order_id = o.id
                WHERE o.delivery_date = ?1 AND c.id = ?2
                GROUP BY i.product_name, i.product_options, i.product_unit_price
             )
             ORDER BY product_name, catalog_id IS NULL, catalog_id, first_item",
        )?;
        let rows = stmt.query_map(params![delivery_date, store_id], |row| {
            Ok(FulfillmentRow {
                product: text(row, 0)?,
                options: text(row, 1)?,
                quantity: row.get(2)?,
                price: read_money(row, 3)?,
                tax: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Per-customer items of one store, for the pick list under the store sheet.
    pub fn store_customer_rows(&self, store_id: i64, delivery_date: &str) -> Result<Vec<PickRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.id, o.location, o.name, o.comment, o.order_uid,
                    i.product_name, i.product_options, i.quantity
             FROM order_items i
             JOIN orders o ON i.order_id = o.id
             WHERE o.delivery_date = ?1 AND i.store_id = ?2
             ORDER BY o.location, o.order_uid, i.product_name, i.id",
        )?;
        let rows = stmt.query_map(params![delivery_date, store_id], |row| {
            Ok(PickRow {
                order_id: row.get(0)?,
                location: text(row, 1)?,
                name: text(row, 2)?,
                comment: text(row, 3)?,
                order_uid: text(row, 4)?,
                product: text(row, 5)?,
                options: text(row, 6)?,
                quantity: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every item of the delivery date across all stores, in invoice order.
    pub fn all_customer_rows(&self, delivery_date: &str) -> Result<Vec<InvoiceRow>> {
        info!(delivery_date, "Analyzing customers");
        let mut stmt = self.conn.prepare(
            "SELECT o.id, o.location, o.order_uid, o.name, c.id, COALESCE(c.name, i.store),
                    i.product_name, i.product_options, i.product_unit_price, i.quantity, c.tax,
                    o.comment, o.delivery_address, o.email, o.phone
             FROM order_items i
             JOIN orders o ON i.order_id = o.id
             LEFT JOIN stores c ON i.store_id = c.id
             WHERE o.delivery_date = ?1
             ORDER BY o.location, o.order_uid, o.name, c.id, i.product_name, i.id",
        )?;
        let rows = stmt.query_map(params![delivery_date], |row| {
            Ok(InvoiceRow {
                order_id: row.get(0)?,
                location: text(row, 1)?,
                order_uid: text(row, 2)?,
                name: text(row, 3)?,
                store_id: row.get(4)?,
                store: text(row, 5)?,
                product: text(row, 6)?,
                options: text(row, 7)?,
                price: read_money(row, 8)?,
                quantity: row.get(9)?,
                tax: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
                comment: text(row, 11)?,
                address: text(row, 12)?,
                email: text(row, 13)?,
                phone: text(row, 14)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Order, Product, Store};
    use crate::parser::ParsedItem;
    use rust_decimal_macros::dec;

    pub(crate) fn item(store_id: Option<i64>, product: &str, options: &str, price: Decimal, quantity: i64) -> ParsedItem {
        ParsedItem {
            store: String::new(),
            store_id,
            product: product.to_string(),
            options: options.to_string(),
            quantity,
            price,
        }
    }

    pub(crate) fn order(uid: &str, name: &str, location: &str, date: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            order_date: "2024-02-10 10:00:00".to_string(),
            name: name.to_string(),
            delivery_date: date.to_string(),
            location: location.to_string(),
            ..Order::default()
        }
    }

    /// Two stores, three customers, one of them on another date.
    pub(crate) fn seeded_store() -> OrderStore {
        let db = OrderStore::new(":memory:").unwrap();
        let stores = [
            Store {
                id: 1,
                name: "豆花店".to_string(),
                alias: String::new(),
                tax: 0,
                group: String::new(),
            },
            Store {
                id: 2,
                name: "阿扁".to_string(),
                alias: String::new(),
                tax: 1,
                group: String::new(),
            },
        ];
        db.replace_catalog(&stores, &[]).unwrap();

        db.save_order(
            &order("1002", "Ben", "Edison", "2/19"),
            &[
                item(Some(1), "手工豆花", "芋圓", dec!(5.50), 1),
                item(Some(2), "客家小炒", "", dec!(16.00), 1),
            ],
            dec!(21.50),
        )
        .unwrap();
        db.save_order(
            &order("1001", "Amy", "Edison", "2/19"),
            &[
                item(Some(1), "手工豆花", "芋圓", dec!(5.5), 2),
                item(Some(1), "手工豆花", "紅豆", dec!(5.50), 1),
                item(None, "Mystery", "", dec!(3.00), 1),
            ],
            dec!(19.50),
        )
        .unwrap();
        db.save_order(
            &order("1003", "Cat", "Princeton", "2/26"),
            &[item(Some(1), "手工豆花", "芋圓", dec!(5.50), 4)],
            dec!(22.00),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_fulfillment_groups_by_product_options_price() {
        let db = seeded_store();
        let rows = db.store_fulfillment_rows(1, "2/19").unwrap();
        assert_eq!(
            rows,
            vec![
                FulfillmentRow {
                    product: "手工豆花".to_string(),
                    options: "芋圓".to_string(),
                    quantity: 3,
                    price: dec!(5.5),
                    tax: 0,
                },
                FulfillmentRow {
                    product: "手工豆花".to_string(),
                    options: "紅豆".to_string(),
                    quantity: 1,
                    price: dec!(5.5),
                    tax: 0,
                },
            ]
        );
        assert!(db.store_fulfillment_rows(1, "3/1").unwrap().is_empty());
    }

    #[test]
    fn test_fulfillment_follows_catalog_product_order() {
        let db = seeded_store();
        let stores = db.load_stores().unwrap();
        let product = |options: &str| Product {
            store_id: 1,
            name: "手工豆花".to_string(),
            options: options.to_string(),
            price: dec!(5.50),
            cost: dec!(4.00),
        };
        db.replace_catalog(&stores, &[product("紅豆"), product("芋圓")]).unwrap();

        let options: Vec<_> = db
            .store_fulfillment_rows(1, "2/19")
            .unwrap()
            .into_iter()
            .map(|r| r.options)
            .collect();
        assert_eq!(options, vec!["紅豆", "芋圓"]);
    }

    #[test]
    fn test_fulfillment_carries_store_tax_flag() {
        let db = seeded_store();
        let rows = db.store_fulfillment_rows(2, "2/19").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tax, 1);
    }

    #[test]
    fn test_store_customer_rows_sorted_by_order_uid() {
        let db = seeded_store();
        let names: Vec<_> = db
            .store_customer_rows(1, "2/19")
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.options))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Amy".to_string(), "芋圓".to_string()),
                ("Amy".to_string(), "紅豆".to_string()),
                ("Ben".to_string(), "芋圓".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_customer_rows_include_unattributed_items() {
        let db = seeded_store();
        let rows = db.all_customer_rows("2/19").unwrap();
        let keys: Vec<_> = rows
            .iter()
            .map(|r| (r.order_uid.as_str(), r.store_id, r.product.as_str()))
            .collect();
        // unattributed items sort ahead of store 1 within a customer
        assert_eq!(
            keys,
            vec![
                ("1001", None, "Mystery"),
                ("1001", Some(1), "手工豆花"),
                ("1001", Some(1), "手工豆花"),
                ("1002", Some(1), "手工豆花"),
                ("1002", Some(2), "客家小炒"),
            ]
        );
        assert_eq!(rows[0].store, "");
        assert_eq!(rows[4].tax, 1);
    }
}
