// src/report.rs

use crate::catalog::CatalogIndex;
use crate::models::Store;
use crate::pricing::{customer_handling_fee, dollar, line_total};
use crate::queries::{FulfillmentRow, InvoiceRow, PickRow};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Title of the consolidated customer sheet ("customers").
pub const CUSTOMER_SHEET: &str = "人客";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Money(Decimal),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(n) => write!(f, "{n}"),
            CellValue::Money(m) => write!(f, "{m:.2}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Int(n)
    }
}

impl From<Decimal> for CellValue {
    fn from(m: Decimal) -> Self {
        CellValue::Money(m)
    }
}

/// A single cell write; rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellFormat {
    pub background: &'static str,
    pub bold: bool,
    pub centered: bool,
    pub middle: bool,
}

const BANNER: CellFormat = CellFormat {
    background: "#ffff00",
    bold: true,
    centered: true,
    middle: false,
};

const CUSTOMER_BANNER: CellFormat = CellFormat {
    middle: true,
    ..BANNER
};

const COLUMN_HEADER: CellFormat = CellFormat {
    background: "#ccffcc",
    bold: true,
    centered: true,
    middle: false,
};

const TOTAL_ROW: CellFormat = CellFormat {
    background: "#ffff00",
    bold: true,
    centered: false,
    middle: false,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatRange {
    /// A1 notation, e.g. "A1:C1".
    pub range: String,
    pub format: CellFormat,
}

/// Columns `start..end` (0-based, end exclusive) are fitted to their content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutoFit {
    pub start: u32,
    pub end: u32,
}

/// Everything written to one output sheet, in write order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub title: String,
    pub cells: Vec<Cell>,
    pub formats: Vec<FormatRange>,
    pub auto_fit: Option<AutoFit>,
}

impl Sheet {
    pub fn new(name: &str, delivery_date: &str) -> Self {
        Self {
            title: format!("{name} {delivery_date}"),
            cells: Vec::new(),
            formats: Vec::new(),
            auto_fit: None,
        }
    }

    /// File name for the exported sheet; dates like "2/19" cannot go in a path.
    pub fn file_stem(&self) -> String {
        self.title.replace('/', "_")
    }

    pub fn append_cell(&mut self, row: u32, col: u32, value: impl Into<CellValue>) {
        self.cells.push(Cell {
            row,
            col,
            value: value.into(),
        });
    }

    pub fn append_format(&mut self, row: u32, first_col: u32, last_col: u32, format: CellFormat) {
        self.formats.push(FormatRange {
            range: format!("{}{row}:{}{row}", column_letter(first_col), column_letter(last_col)),
            format,
        });
    }

    #[cfg(test)]
    pub(crate) fn last_row(&self) -> u32 {
        self.cells.iter().map(|c| c.row).max().unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn value(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells
            .iter()
            .rev()
            .find(|c| c.row == row && c.col == col)
            .map(|c| &c.value)
    }
}

fn column_letter(col: u32) -> char {
    (b'A' + (col.saturating_sub(1) % 26) as u8) as char
}

pub struct StoreReport {
    pub sheet: Sheet,
    pub total: Decimal,
}

/// Store sheet: what to prepare (at catalog cost, taxed per store), then a
/// pick list split by customer.
pub fn store_sheet(
    index: &CatalogIndex,
    store: &Store,
    delivery_date: &str,
    rows: &[FulfillmentRow],
    picks: &[PickRow],
) -> StoreReport {
    let mut sheet = Sheet::new(&store.name, delivery_date);
    sheet.auto_fit = Some(AutoFit { start: 0, end: 2 });

    sheet.append_cell(1, 1, "Store");
    sheet.append_cell(1, 2, store.name.as_str());
    sheet.append_cell(1, 3, delivery_date);
    sheet.append_format(1, 1, 3, BANNER);
    for (col, title) in (1..).zip(["Product", "Options", "Quantity", "Price", "Subtotal"]) {
        sheet.append_cell(2, col, title);
    }
    sheet.append_format(2, 1, 5, COLUMN_HEADER);

    let mut row_num = 3;
    let mut total = Decimal::ZERO;
    for row in rows {
        let cost = index.find_cost(&row.product, &row.options, row.price);
        let subtotal = line_total(row.quantity, cost, row.tax);
        sheet.append_cell(row_num, 1, row.product.as_str());
        sheet.append_cell(row_num, 2, row.options.as_str());
        sheet.append_cell(row_num, 3, row.quantity);
        sheet.append_cell(row_num, 4, cost);
        sheet.append_cell(row_num, 5, subtotal);
        total += subtotal;
        row_num += 1;
    }
    sheet.append_cell(row_num, 4, "Store Total:");
    sheet.append_cell(row_num, 5, total);
    sheet.append_format(row_num, 4, 5, TOTAL_ROW);

    append_pick_list(&mut sheet, row_num + 3, picks);
    StoreReport { sheet, total }
}

fn append_pick_list(sheet: &mut Sheet, start_row: u32, picks: &[PickRow]) {
    let mut row_num = start_row;
    let mut current: Option<i64> = None;
    let mut total_items = 0;

    for pick in picks {
        if current != Some(pick.order_id) {
            if current.is_some() {
                sheet.append_cell(row_num - 1, 4, total_items);
            }
            row_num = pick_header(sheet, row_num, pick) + 1;
            total_items = 0;
            current = Some(pick.order_id);
        }
        total_items += pick.quantity;
        sheet.append_cell(row_num, 1, pick.product.as_str());
        sheet.append_cell(row_num, 2, pick.options.as_str());
        sheet.append_cell(row_num, 3, pick.quantity);
        row_num += 1;
    }
    if current.is_some() {
        sheet.append_cell(row_num - 1, 4, total_items);
    }
}

fn pick_header(sheet: &mut Sheet, row_num: u32, pick: &PickRow) -> u32 {
    let row_num = row_num + 1;
    sheet.append_cell(row_num, 1, pick.location.as_str());
    sheet.append_cell(row_num, 2, pick.order_uid.as_str());
    sheet.append_cell(row_num, 3, pick.name.as_str());
    sheet.append_cell(row_num, 4, pick.comment.as_str());
    sheet.append_format(row_num, 1, 3, CUSTOMER_BANNER);

    let row_num = row_num + 1;
    for (col, title) in (1..).zip(["Product", "Options", "Quantity", "Total Items"]) {
        sheet.append_cell(row_num, col, title);
    }
    sheet.append_format(row_num, 1, 5, COLUMN_HEADER);
    row_num
}

/// Consolidated invoice: one section per customer with a subtotal and a
/// handling line.
pub fn customer_sheet(delivery_date: &str, rows: &[InvoiceRow]) -> Sheet {
    let mut sheet = Sheet::new(CUSTOMER_SHEET, delivery_date);
    sheet.auto_fit = Some(AutoFit { start: 0, end: 2 });

    let mut row_num = 0;
    let mut current: Option<i64> = None;
    let mut section = 0;
    let mut total_items = 0;
    let mut customer_total = Decimal::ZERO;

    for row in rows {
        if current != Some(row.order_id) {
            if current.is_some() {
                row_num = close_customer(&mut sheet, row_num, total_items, customer_total);
            }
            section += 1;
            row_num = customer_header(&mut sheet, row_num, section, row) + 1;
            total_items = 0;
            customer_total = Decimal::ZERO;
            current = Some(row.order_id);
        }

        let amount = line_total(row.quantity, row.price, row.tax);
        sheet.append_cell(row_num, 1, row.store.as_str());
        sheet.append_cell(row_num, 2, row.product.as_str());
        sheet.append_cell(row_num, 3, row.options.as_str());
        sheet.append_cell(row_num, 4, row.price);
        sheet.append_cell(row_num, 5, row.quantity);
        sheet.append_cell(row_num, 6, dollar(amount));
        total_items += row.quantity;
        customer_total += amount;
        row_num += 1;
    }
    if current.is_some() {
        close_customer(&mut sheet, row_num, total_items, customer_total);
    }
    sheet
}

fn customer_header(sheet: &mut Sheet, row_num: u32, section: u32, row: &InvoiceRow) -> u32 {
    let row_num = row_num + 1;
    sheet.append_cell(row_num, 1, format!("{} #{section}", row.location));
    sheet.append_cell(row_num, 2, row.order_uid.as_str());
    sheet.append_cell(row_num, 3, row.name.as_str());
    sheet.append_cell(row_num, 4, row.comment.as_str());
    sheet.append_format(row_num, 1, 3, CUSTOMER_BANNER);

    let row_num = row_num + 1;
    sheet.append_cell(row_num, 1, row.email.as_str());
    sheet.append_cell(row_num, 2, row.phone.as_str());
    sheet.append_cell(row_num, 3, row.address.as_str());

    let row_num = row_num + 1;
    for (col, title) in (1..).zip(["Store", "Product", "Options", "Price", "Quantity", "Total"]) {
        sheet.append_cell(row_num, col, title);
    }
    sheet.append_format(row_num, 1, 6, COLUMN_HEADER);
    row_num
}

/// Subtotal row then handling row; returns the next free row.
fn close_customer(sheet: &mut Sheet, row_num: u32, total_items: i64, subtotal: Decimal) -> u32 {
    sheet.append_cell(row_num, 5, total_items);
    sheet.append_cell(row_num, 6, dollar(subtotal));

    let row_num = row_num + 1;
    let fee = customer_handling_fee(subtotal);
    sheet.append_cell(row_num, 5, "Handling");
    sheet.append_cell(row_num, 6, fee);
    sheet.append_cell(row_num, 7, subtotal + fee);
    row_num + 1
}
