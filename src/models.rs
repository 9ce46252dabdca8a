// src/models.rs

use crate::error::{Error, Result};
use rust_decimal::Decimal;

/// One worksheet row: (header name, cell text) pairs in column order.
/// When a header repeats, the leftmost column wins.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Header names in column order.
    #[cfg(test)]
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// The raw value of a column that must exist. An empty cell is still a value.
    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    /// Trimmed, non-empty value of a column that may be absent.
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub id: i64,
    pub name: String,
    /// Comma separated alternate names.
    pub alias: String,
    /// 1 when sales tax applies to this store's items.
    pub tax: i64,
    /// Customer groups served by this store (Stores sheet only, not persisted).
    pub group: String,
}

impl Store {
    pub fn from_record(record: &Record) -> Result<Self> {
        let id = parse_int("id", record.required("id")?)?;
        let name = record.required("name")?.trim().to_string();
        let tax = match record.optional("tax") {
            Some(v) => parse_int("tax", v)?,
            None => 0,
        };
        Ok(Self {
            id,
            name,
            alias: record.optional("alias").unwrap_or_default().to_string(),
            tax,
            group: record.optional("group").unwrap_or_default().to_string(),
        })
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.group.contains(group)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub store_id: i64,
    pub name: String,
    pub options: String,
    /// Listed price shown on the form.
    pub price: Decimal,
    /// What the store actually charges; defaults to `price`.
    pub cost: Decimal,
}

impl Product {
    pub fn from_record(record: &Record) -> Result<Self> {
        let store_id = parse_int("store_id", record.required("store_id")?)?;
        let price = match record.optional("price") {
            Some(v) => parse_decimal("price", v)?,
            None => Decimal::ZERO,
        };
        let cost = match record.optional("cost") {
            Some(v) => parse_decimal("cost", v)?,
            None => price,
        };
        Ok(Self {
            store_id,
            name: record.required("name")?.trim().to_string(),
            options: record.optional("options").unwrap_or_default().to_string(),
            price,
            cost,
        })
    }
}

/// Column names of the form export.
pub mod form {
    pub const SUBMISSION_DATE: &str = "Submission Date";
    pub const ORDER_ID: &str = "Order ID";
    pub const FIRST_NAME: &str = "First Name";
    pub const LAST_NAME: &str = "Last Name";
    pub const EMAIL: &str = "Email";
    pub const PHONE: &str = "Phone Number";
    pub const SUBMISSION_ID: &str = "Submission ID";
    pub const PAYMENT: &str = "Payment";
    pub const COMMENTS: &str = "Comments";
    pub const DELIVERY_DATE: &str = "Delivery Date";
    pub const DELIVERY_ADDRESS: &str = "Delivery Address";
}

/// Order header as submitted, before it has a database id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub order_uid: String,
    pub order_date: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub submission_id: String,
    pub payment: String,
    pub comment: String,
    pub delivery_date: String,
    pub location: String,
    pub delivery_address: String,
}

impl Order {
    pub fn from_form(record: &Record) -> Result<Self> {
        let (delivery_date, location) = split_delivery(record.required(form::DELIVERY_DATE)?);
        let name = format!(
            "{} {}",
            record.required(form::FIRST_NAME)?.trim(),
            record.required(form::LAST_NAME)?.trim()
        );
        Ok(Self {
            order_uid: record.required(form::ORDER_ID)?.trim().to_string(),
            order_date: record.required(form::SUBMISSION_DATE)?.trim().to_string(),
            name,
            email: record.required(form::EMAIL)?.trim().to_string(),
            phone: record.required(form::PHONE)?.trim().to_string(),
            submission_id: record.required(form::SUBMISSION_ID)?.trim().to_string(),
            payment: record.required(form::PAYMENT)?.trim().to_string(),
            comment: record.required(form::COMMENTS)?.trim().to_string(),
            delivery_date,
            location,
            delivery_address: record.required(form::DELIVERY_ADDRESS)?.trim().to_string(),
        })
    }

    /// An order typed in by hand on an extra-orders sheet.
    pub fn walk_in(name: &str, delivery: &str, order_date: String) -> Self {
        let (delivery_date, location) = split_delivery(delivery);
        Self {
            order_date,
            name: name.trim().to_string(),
            delivery_date,
            location,
            ..Self::default()
        }
    }
}

/// "2/19 Edison NJ" -> ("2/19", "Edison NJ")
pub fn split_delivery(value: &str) -> (String, String) {
    let value = value.trim();
    match value.split_once(char::is_whitespace) {
        Some((date, rest)) => (date.to_string(), rest.trim().to_string()),
        None => (value.to_string(), String::new()),
    }
}

pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    let cleaned: String = value
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned.parse::<Decimal>().map_err(|_| Error::invalid(field, value))
}

pub fn parse_int(field: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| Error::invalid(field, value))
}
