// src/parser/mod.rs

mod grouped;
mod tabular;

pub use grouped::parse_grouped;
pub use tabular::parse_tabular;

use crate::catalog::CatalogIndex;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;

/// What a single piece of an order line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Price(Decimal),
    Quantity(i64),
    Option(String),
    /// Block total declared by the form itself.
    Total(Decimal),
    /// Store name that applies to this and following rows.
    StoreCarry(String),
}

/// One normalized line item, ready to be saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedItem {
    /// Store name as written on the order (may be empty).
    pub store: String,
    pub store_id: Option<i64>,
    pub product: String,
    pub options: String,
    pub quantity: i64,
    /// Unit price before tax.
    pub price: Decimal,
}

/// Items of one free-text block plus the total the form printed for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedBlock {
    pub items: Vec<ParsedItem>,
    pub declared_total: Option<Decimal>,
}

impl ParsedBlock {
    /// Sum of unit price x quantity over the parsed items.
    pub fn computed_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum()
    }

    /// The form's own total when present, otherwise the computed one.
    pub fn total(&self) -> Decimal {
        self.declared_total.unwrap_or_else(|| self.computed_total())
    }

    /// `Some((declared, computed))` when the form's total disagrees with the items.
    pub fn total_mismatch(&self) -> Option<(Decimal, Decimal)> {
        let declared = self.declared_total?;
        let computed = self.computed_total();
        (declared != computed).then_some((declared, computed))
    }
}

/// Both free-text blocks of one submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedOrder {
    pub grouped: ParsedBlock,
    pub tabular: ParsedBlock,
}

impl ParsedOrder {
    pub fn items(&self) -> impl Iterator<Item = &ParsedItem> {
        self.grouped.items.iter().chain(self.tabular.items.iter())
    }

    pub fn total(&self) -> Decimal {
        self.grouped.total() + self.tabular.total()
    }
}

pub fn parse_order(index: &CatalogIndex, grouped: &str, tabular: &str) -> Result<ParsedOrder> {
    Ok(ParsedOrder {
        grouped: parse_grouped(index, grouped)?,
        tabular: parse_tabular(index, tabular)?,
    })
}
