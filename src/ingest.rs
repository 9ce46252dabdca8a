// src/ingest.rs

use crate::catalog::CatalogIndex;
use crate::config::FormFields;
use crate::error::Result;
use crate::models::{Order, Record, form, parse_decimal, parse_int, split_delivery};
use crate::order_db::OrderStore;
use crate::parser::{ParsedBlock, ParsedItem, ParsedOrder, parse_order};
use crate::workbook::Workbook;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, info_span, warn};

/// Which delivery dates a run takes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFilter {
    All,
    On(String),
}

impl DeliveryFilter {
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("ALL") {
            DeliveryFilter::All
        } else {
            DeliveryFilter::On(token.to_string())
        }
    }

    pub fn accepts(&self, delivery_date: &str) -> bool {
        match self {
            DeliveryFilter::All => true,
            DeliveryFilter::On(date) => date == delivery_date,
        }
    }

    /// The single date reports are built for, if there is one.
    pub fn date(&self) -> Option<&str> {
        match self {
            DeliveryFilter::All => None,
            DeliveryFilter::On(date) => Some(date),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub orders: usize,
    pub items: usize,
    pub skipped: usize,
}

impl IngestSummary {
    pub fn absorb(&mut self, other: IngestSummary) {
        self.orders += other.orders;
        self.items += other.items;
        self.skipped += other.skipped;
    }
}

/// Timestamp text used as the order date of hand-entered orders.
pub fn now_stamp() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))?)
}

pub struct Ingestor<'a> {
    db: &'a OrderStore,
    index: &'a CatalogIndex,
    form: &'a FormFields,
    filter: &'a DeliveryFilter,
    check_totals: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        db: &'a OrderStore,
        index: &'a CatalogIndex,
        form: &'a FormFields,
        filter: &'a DeliveryFilter,
    ) -> Self {
        Self {
            db,
            index,
            form,
            filter,
            check_totals: false,
        }
    }

    /// Warn when a block's printed total disagrees with its items.
    pub fn check_totals(mut self, enabled: bool) -> Self {
        self.check_totals = enabled;
        self
    }

    /// Parse and save every form submission for the run's delivery date.
    pub fn ingest_submissions(&self, sheet: &str, records: &[Record]) -> Result<IngestSummary> {
        info!(sheet, rows = records.len(), "Processing order sheet");
        let mut summary = IngestSummary::default();

        for record in records {
            if record.optional(form::SUBMISSION_DATE).is_none() {
                summary.skipped += 1;
                continue;
            }
            let order = Order::from_form(record)?;
            if !self.filter.accepts(&order.delivery_date) {
                debug!(uid = %order.order_uid, delivery = %order.delivery_date, "Other delivery date, skipped");
                summary.skipped += 1;
                continue;
            }

            let _span = info_span!("order", uid = %order.order_uid).entered();
            let parsed = parse_order(
                self.index,
                record.required(&self.form.grouped_field)?,
                record.required(&self.form.tabular_field)?,
            )?;
            if self.check_totals {
                self.report_mismatches(&order, &parsed);
            }

            let items: Vec<ParsedItem> = parsed.items().cloned().collect();
            self.db.save_order(&order, &items, parsed.total())?;
            summary.orders += 1;
            summary.items += items.len();
        }
        Ok(summary)
    }

    fn report_mismatches(&self, order: &Order, parsed: &ParsedOrder) {
        for (block, name) in [(&parsed.grouped, "grouped"), (&parsed.tabular, "tabular")] {
            if let Some((declared, computed)) = block.total_mismatch() {
                warn!(
                    uid = %order.order_uid,
                    block = name,
                    declared = %declared,
                    computed = %computed,
                    "Declared total differs from items"
                );
            }
        }
    }

    /// Hand-entered orders: consecutive rows with the same customer are one
    /// order, all delivered per `delivery` ("2/19 Edison").
    pub fn ingest_walk_in_sheet(
        &self,
        delivery: &str,
        records: &[Record],
        order_date: &str,
    ) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let mut current: Option<(Order, Vec<ParsedItem>)> = None;

        for record in records {
            let Some(customer) = record.optional("訂購人") else {
                summary.skipped += 1;
                continue;
            };
            if current.as_ref().is_some_and(|(order, _)| order.name != customer) {
                if let Some((order, items)) = current.take() {
                    self.save_walk_in(&order, items, &mut summary)?;
                }
            }
            let (_, items) = current.get_or_insert_with(|| {
                (Order::walk_in(customer, delivery, order_date.to_string()), Vec::new())
            });
            items.push(self.walk_in_item(record)?);
        }
        if let Some((order, items)) = current {
            self.save_walk_in(&order, items, &mut summary)?;
        }
        Ok(summary)
    }

    fn walk_in_item(&self, record: &Record) -> Result<ParsedItem> {
        let store = record.required("店名")?.trim().to_string();
        let store_id = self.index.store_by_name(&store).map(|s| s.id);
        if store_id.is_none() {
            warn!(store = %store, "Unknown store on hand-entered order");
        }
        Ok(ParsedItem {
            store,
            store_id,
            product: record.required("菜名")?.trim().to_string(),
            options: String::new(),
            quantity: parse_int("數量", record.required("數量")?)?,
            price: parse_decimal("單價", record.required("單價")?)?,
        })
    }

    fn save_walk_in(&self, order: &Order, items: Vec<ParsedItem>, summary: &mut IngestSummary) -> Result<()> {
        let block = ParsedBlock {
            items,
            declared_total: None,
        };
        self.db.save_order(order, &block.items, block.total())?;
        summary.orders += 1;
        summary.items += block.items.len();
        Ok(())
    }

    /// Follow the extra-orders index sheet (`Location`, `Sheet`) to each
    /// hand-entered sheet for the run's delivery date.
    pub async fn ingest_extra_orders(&self, book: &dyn Workbook, index_sheet: &str) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let order_date = now_stamp()?;

        for entry in book.records(index_sheet).await? {
            let location = entry.required("Location")?.trim().to_string();
            let sheet = entry.required("Sheet")?.trim().to_string();
            let (delivery_date, _) = split_delivery(&location);
            if !self.filter.accepts(&delivery_date) {
                summary.skipped += 1;
                continue;
            }

            let records = book.records(&sheet).await?;
            info!(sheet = %sheet, location = %location, "Processing extra orders");
            summary.absorb(self.ingest_walk_in_sheet(&location, &records, &order_date)?);
        }
        Ok(summary)
    }
}
