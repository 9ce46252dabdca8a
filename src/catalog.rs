// src/catalog.rs

use crate::models::{Product, Store};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Product name used on the form for the delivery-location picker. It is
/// never a real product, so a lookup miss on it is not worth reporting.
pub const LOCATION_MARKER: &str = "**配送地點**";

/// Immutable lookups over one catalog snapshot.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    stores: Vec<Store>,
    products: Vec<Product>,
    store_by_key: HashMap<String, usize>,
    store_by_id: HashMap<i64, usize>,
    product_by_name: HashMap<String, usize>,
    product_by_folded_name: HashMap<String, usize>,
    products_by_name: HashMap<String, Vec<usize>>,
    product_by_variant: HashMap<(String, String), usize>,
}

impl CatalogIndex {
    pub fn build(stores: Vec<Store>, products: Vec<Product>) -> Self {
        let mut index = Self::default();

        for store in stores {
            let pos = index.stores.len();
            index.store_by_key.insert(store.name.to_lowercase(), pos);
            index.store_by_id.insert(store.id, pos);
            for alias in store.alias.split(',') {
                let alias = alias.trim();
                if !alias.is_empty() {
                    index.store_by_key.insert(alias.to_lowercase(), pos);
                }
            }
            index.stores.push(store);
        }

        for product in products {
            if !index.store_by_id.contains_key(&product.store_id) {
                warn!(
                    product = %product.name,
                    store_id = product.store_id,
                    "Product belongs to an unknown store, dropped"
                );
                continue;
            }
            let pos = index.products.len();
            index.product_by_name.insert(product.name.clone(), pos);
            index
                .product_by_folded_name
                .insert(product.name.trim().to_lowercase(), pos);
            index
                .products_by_name
                .entry(product.name.clone())
                .or_default()
                .push(pos);
            index.product_by_variant.insert(
                (product.name.clone(), product.options.to_lowercase()),
                pos,
            );
            index.products.push(product);
        }

        debug!(
            stores = index.stores.len(),
            products = index.products.len(),
            "Catalog index built"
        );
        index
    }

    /// Stores in catalog order.
    pub fn stores(&self) -> &[Store] {
        &self.stores
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Case-insensitive lookup by display name or any alias.
    pub fn store_by_name(&self, name: &str) -> Option<&Store> {
        self.store_by_key
            .get(&name.trim().to_lowercase())
            .map(|&pos| &self.stores[pos])
    }

    pub fn store_by_id(&self, id: i64) -> Option<&Store> {
        self.store_by_id.get(&id).map(|&pos| &self.stores[pos])
    }

    /// The store selling a product with exactly this name.
    pub fn resolve_store_for_product(&self, product_name: &str) -> Option<&Store> {
        match self.product_by_name.get(product_name) {
            Some(&pos) => self.store_by_id(self.products[pos].store_id),
            None => {
                if product_name != LOCATION_MARKER {
                    warn!(product = %product_name, "Product is not found in catalog");
                }
                None
            }
        }
    }

    /// Looser product lookup ignoring case and surrounding blanks. Never logs.
    pub fn store_id_for_product(&self, product_name: &str) -> Option<i64> {
        self.product_by_folded_name
            .get(&product_name.trim().to_lowercase())
            .map(|&pos| self.products[pos].store_id)
    }

    /// Catalog cost of a product variant, or `fallback` when no variant matches.
    ///
    /// An exact (name, options) hit wins. Otherwise the first variant, in
    /// catalog order, whose options text is contained in `options` is used.
    pub fn find_cost(&self, name: &str, options: &str, fallback: Decimal) -> Decimal {
        let options = options.to_lowercase();
        let found = self
            .product_by_variant
            .get(&(name.to_string(), options.clone()))
            .copied()
            .or_else(|| {
                self.products_by_name.get(name).and_then(|variants| {
                    variants
                        .iter()
                        .copied()
                        .find(|&pos| options.contains(&self.products[pos].options.to_lowercase()))
                })
            });

        match found {
            Some(pos) => {
                let cost = self.products[pos].cost;
                debug!(product = %name, options = %options, cost = %cost, "Catalog cost found");
                cost
            }
            None => fallback,
        }
    }
}
