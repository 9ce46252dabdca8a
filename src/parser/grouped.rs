// src/parser/grouped.rs
//
// One item per line:
//   傳統客家小炒 (Amount: 16.00 USD, Quantity: 1, 辣度: 小辣)
// followed by the form's own summary lines:
//   Subtotal: 144.50 / Tax: 3.00 / Total: 147.50

use super::{ParsedBlock, ParsedItem, Token};
use crate::catalog::CatalogIndex;
use crate::error::{Error, Result};
use rust_decimal::Decimal;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Splits "NAME (Amount: ..." at the first "(Am"; the body runs to the last ')'.
static ITEM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\(Am(.*)\)").expect("valid item line pattern"));

/// What is left of "Amount:" after the split above.
const AMOUNT_MARKER: &str = "ount:";
const QUANTITY_MARKER: &str = "Quantity:";
/// Tip field ("enter tip amount below"); its value is read as a quantity.
const TIP_MARKER: &str = "請填小費金額於下方";

pub fn parse_grouped(index: &CatalogIndex, text: &str) -> Result<ParsedBlock> {
    let mut block = ParsedBlock::default();
    for line in text.lines() {
        let tokens = tokenize_line(line)?;
        if let Some(item) = assemble(index, &mut block, tokens) {
            block.items.push(item);
        }
    }
    Ok(block)
}

/// Classify one line. Summary lines other than "Total:" yield nothing.
pub(crate) fn tokenize_line(line: &str) -> Result<Vec<Token>> {
    if line.trim().is_empty() || line.starts_with("Subtotal:") || line.starts_with("Tax:") {
        return Ok(Vec::new());
    }
    if let Some(rest) = line.strip_prefix("Total:") {
        let value = rest
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::malformed(line, "total without amount"))?;
        return Ok(vec![Token::Total(decimal(line, value)?)]);
    }

    let caps = ITEM_LINE
        .captures(line)
        .ok_or_else(|| Error::malformed(line, "item line without amount"))?;
    let mut tokens = vec![Token::Name(caps[1].trim().to_string())];

    for part in caps[2].split(", ") {
        if part.starts_with(AMOUNT_MARKER) {
            tokens.push(Token::Price(decimal(line, second_word(line, part)?)?));
        } else if part.starts_with(QUANTITY_MARKER) || part.starts_with(TIP_MARKER) {
            let qty = second_word(line, part)?;
            let qty = qty
                .parse::<i64>()
                .map_err(|_| Error::malformed(line, "quantity is not a whole number"))?;
            tokens.push(Token::Quantity(qty));
        } else {
            let value = part
                .split(": ")
                .nth(1)
                .ok_or_else(|| Error::malformed(line, "option without value"))?;
            tokens.push(Token::Option(value.to_string()));
        }
    }
    Ok(tokens)
}

fn assemble(index: &CatalogIndex, block: &mut ParsedBlock, tokens: Vec<Token>) -> Option<ParsedItem> {
    let mut name = None;
    let mut price = Decimal::ZERO;
    let mut quantity = 1;
    let mut options = Vec::new();

    for token in tokens {
        match token {
            Token::Total(total) => block.declared_total = Some(total),
            Token::Name(n) => name = Some(n),
            Token::Price(p) => price = p,
            Token::Quantity(q) => quantity = q,
            Token::Option(o) => options.push(o),
            Token::StoreCarry(_) => {}
        }
    }

    let name = name?;
    if price.is_zero() {
        debug!(product = %name, "Zero priced line skipped");
        return None;
    }

    let (store, store_id) = match index.resolve_store_for_product(&name) {
        Some(store) => (store.name.clone(), Some(store.id)),
        None => match index.store_id_for_product(&name) {
            Some(id) => (
                index.store_by_id(id).map(|s| s.name.clone()).unwrap_or_default(),
                Some(id),
            ),
            None => (String::new(), None),
        },
    };

    Some(ParsedItem {
        store,
        store_id,
        product: name,
        options: options.join(","),
        quantity,
        price,
    })
}

fn second_word<'a>(line: &str, part: &'a str) -> Result<&'a str> {
    part.split(' ')
        .nth(1)
        .ok_or_else(|| Error::malformed(line, "marker without value"))
}

fn decimal(line: &str, value: &str) -> Result<Decimal> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|_| Error::malformed(line, "amount is not a number"))
}
