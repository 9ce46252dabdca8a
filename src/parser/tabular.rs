// src/parser/tabular.rs
//
// A table flattened into "INDEX: VALUE" pairs, one row per line:
//   0: #, 1: 品項, 2: 配料, 3: 單價, 4: 數量, 5: 總價
//   0: 1, 1: 手工豆花, 2: 芋圓, 3: 5.50, 4: 2, 5: 11
// Some forms carry a store column right after the index, which shifts every
// other column one to the right:
//   0: #, 1: 豆花店, 2: 手工豆花, 3: 芋圓, 4: 5.50, 5: 2, 6: 11

use super::{ParsedBlock, ParsedItem, Token};
use crate::catalog::CatalogIndex;
use crate::error::{Error, Result};
use rust_decimal::Decimal;

const HEADER_PREFIXES: [&str; 2] = ["0: #, 1: 品項", "0: #, 1: 店名"];
const TOTAL_LABELS: [&str; 2] = ["飲料Total", "自填Total"];

// Column positions with the store column present.
const STORE_COL: usize = 1;
const NAME_COL: usize = 2;
const OPTIONS_COL: usize = 3;
const PRICE_COL: usize = 4;
const QUANTITY_COL: usize = 5;

/// Rows with at least this many pairs always carry the store column.
const STORE_LAYOUT_PAIRS: usize = 8;
/// Fewest pairs a row can have (no store column).
const MIN_PAIRS: usize = QUANTITY_COL + 1;

/// State carried from one row to the next within a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarryState {
    /// Last store name written in the store column.
    pub store: String,
    /// Last store id any row resolved to.
    pub last_store_id: Option<i64>,
    pub declared_total: Option<Decimal>,
    /// Set once any row is read with the store column; the rest of the
    /// block keeps that layout.
    pub store_layout: bool,
}

pub fn parse_tabular(index: &CatalogIndex, text: &str) -> Result<ParsedBlock> {
    let mut state = CarryState::default();
    let mut items = Vec::new();
    for line in text.lines() {
        let tokens = tokenize_row(index, &mut state, line)?;
        if let Some(item) = step(index, &mut state, tokens) {
            items.push(item);
        }
    }
    Ok(ParsedBlock {
        items,
        declared_total: state.declared_total,
    })
}

/// Turn one row into tokens. Header, blank and label-only rows give nothing.
/// Only the layout flag of `state` is touched here.
pub fn tokenize_row(index: &CatalogIndex, state: &mut CarryState, line: &str) -> Result<Vec<Token>> {
    let line = line.trim();
    if line.is_empty() || HEADER_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return Ok(Vec::new());
    }

    let pairs = line
        .split(", ")
        .map(|pair| {
            pair.split_once(':')
                .map(|(_, value)| value.trim())
                .ok_or_else(|| Error::malformed(line, "column without index"))
        })
        .collect::<Result<Vec<_>>>()?;
    if pairs.len() < MIN_PAIRS {
        return Err(Error::malformed(line, "too few columns"));
    }

    let with_store =
        pairs.len() > MIN_PAIRS && (state.store_layout || has_store_column(index, &pairs));
    state.store_layout |= with_store;
    let col = |c: usize| if with_store { pairs[c] } else { pairs[c - 1] };
    let total = pairs[pairs.len() - 1];
    let name = col(NAME_COL);
    let options = col(OPTIONS_COL);

    let mut tokens = Vec::new();
    if !total.is_empty() && (!name.is_empty() || !options.is_empty()) {
        if with_store && !pairs[STORE_COL].is_empty() {
            tokens.push(Token::StoreCarry(pairs[STORE_COL].to_string()));
        }
        let price = col(PRICE_COL);
        if price.is_empty() {
            return Ok(tokens);
        }
        tokens.push(Token::Name(name.to_string()));
        tokens.push(Token::Option(options.to_string()));
        tokens.push(Token::Price(decimal(line, price)?));
        let qty = col(QUANTITY_COL);
        if !qty.is_empty() {
            let qty = qty
                .parse::<i64>()
                .map_err(|_| Error::malformed(line, "quantity is not a whole number"))?;
            tokens.push(Token::Quantity(qty));
        }
    } else if TOTAL_LABELS.contains(&pairs[pairs.len() - 2]) && !total.is_empty() {
        tokens.push(Token::Total(decimal(line, total)?));
    }
    Ok(tokens)
}

/// A seven pair row is ambiguous: it is either the plain layout with one
/// extra trailing column or the store layout. It keeps the store column when
/// column 1 names a known store, or when column 3 cannot be a price.
fn has_store_column(index: &CatalogIndex, pairs: &[&str]) -> bool {
    match pairs.len() {
        n if n >= STORE_LAYOUT_PAIRS => true,
        n if n == STORE_LAYOUT_PAIRS - 1 => {
            let shifted_price = pairs[PRICE_COL - 1];
            index.store_by_name(pairs[STORE_COL]).is_some()
                || (!shifted_price.is_empty() && shifted_price.parse::<Decimal>().is_err())
        }
        _ => false,
    }
}

/// Apply one row's tokens to the carry state; emits an item when the row
/// had both a price and a quantity.
///
/// Store precedence: the carried store name, then the product's catalog
/// store, then whatever store an earlier row resolved to.
pub fn step(index: &CatalogIndex, state: &mut CarryState, tokens: Vec<Token>) -> Option<ParsedItem> {
    let mut name = String::new();
    let mut options = String::new();
    let mut price = None;
    let mut quantity = None;

    for token in tokens {
        match token {
            Token::StoreCarry(store) => state.store = store,
            Token::Total(total) => state.declared_total = Some(total),
            Token::Name(n) => name = n,
            Token::Option(o) => options = o,
            Token::Price(p) => price = Some(p),
            Token::Quantity(q) => quantity = Some(q),
        }
    }

    let (price, quantity) = (price?, quantity?);

    let (store, store_id) = if !state.store.is_empty() {
        let id = index.store_by_name(&state.store).map(|s| s.id);
        (state.store.clone(), id)
    } else {
        match index.resolve_store_for_product(&name) {
            Some(s) => (s.name.clone(), Some(s.id)),
            None => {
                let id = state.last_store_id;
                let store = id
                    .and_then(|id| index.store_by_id(id))
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                (store, id)
            }
        }
    };
    if store_id.is_some() {
        state.last_store_id = store_id;
    }

    Some(ParsedItem {
        store,
        store_id,
        product: name,
        options,
        quantity,
        price,
    })
}

fn decimal(line: &str, value: &str) -> Result<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|_| Error::malformed(line, "amount is not a number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, Store};
    use rust_decimal_macros::dec;

    fn store(id: i64, name: &str, alias: &str) -> Store {
        Store {
            id,
            name: name.to_string(),
            alias: alias.to_string(),
            tax: 0,
            group: String::new(),
        }
    }

    fn product(store_id: i64, name: &str) -> Product {
        Product {
            store_id,
            name: name.to_string(),
            options: String::new(),
            price: dec!(1),
            cost: dec!(1),
        }
    }

    fn index() -> CatalogIndex {
        CatalogIndex::build(
            vec![store(1, "豆花店", "douhua"), store(2, "茶飲", "tea")],
            vec![product(1, "手工豆花"), product(2, "珍珠奶茶")],
        )
    }

    #[test]
    fn test_store_column_row() {
        let block = parse_tabular(
            &index(),
            "0: #, 1: 豆花店, 2: 手工豆花, 3: 芋圓, 4: 5.50, 5: 2, 6: 11",
        )
        .unwrap();
        assert_eq!(
            block.items,
            vec![ParsedItem {
                store: "豆花店".to_string(),
                store_id: Some(1),
                product: "手工豆花".to_string(),
                options: "芋圓".to_string(),
                quantity: 2,
                price: dec!(5.50),
            }]
        );
    }

    #[test]
    fn test_store_column_row_with_unknown_store() {
        // column 3 holds "芋圓", which cannot be a price in the plain layout
        let block = parse_tabular(
            &CatalogIndex::default(),
            "0: #, 1: 豆花店, 2: 手工豆花, 3: 芋圓, 4: 5.50, 5: 2, 6: 11",
        )
        .unwrap();
        assert_eq!(block.items[0].store, "豆花店");
        assert_eq!(block.items[0].store_id, None);
        assert_eq!(block.items[0].product, "手工豆花");
    }

    #[test]
    fn test_plain_layout_resolves_store_by_product() {
        let text = "0: #, 1: 品項, 2: 配料, 3: 單價, 4: 數量, 5: 總價\n\
                    0: 1, 1: 手工豆花, 2: 芋圓, 3: 5.50, 4: 2, 5: 11";
        let block = parse_tabular(&index(), text).unwrap();
        assert_eq!(block.items.len(), 1);
        assert_eq!(block.items[0].store_id, Some(1));
        assert_eq!(block.items[0].options, "芋圓");
    }

    #[test]
    fn test_store_carries_forward_until_replaced() {
        let text = "0: 1, 1: Tea, 2: 珍珠奶茶, 3: 少冰, 4: 6.00, 5: 1, 6: 0, 7: 6\n\
                    0: 2, 1: , 2: 檸檬綠, 3: 半糖, 4: 5.00, 5: 2, 6: 0, 7: 10\n\
                    0: 3, 1: douhua, 2: 豆花, 3: , 4: 4.00, 5: 1, 6: 0, 7: 4";
        let block = parse_tabular(&index(), text).unwrap();
        let stores: Vec<_> = block
            .items
            .iter()
            .map(|i| (i.store.as_str(), i.store_id))
            .collect();
        assert_eq!(
            stores,
            vec![("Tea", Some(2)), ("Tea", Some(2)), ("douhua", Some(1))]
        );
    }

    #[test]
    fn test_store_layout_sticks_for_the_block() {
        // the second row has no store and no options, so on its own it would
        // look like the plain layout with an empty price
        let text = "0: 1, 1: 豆花店, 2: 手工豆花, 3: 芋圓, 4: 5.50, 5: 2, 6: 11\n\
                    0: 2, 1: , 2: 檸檬綠, 3: , 4: 5.00, 5: 2, 6: 10";
        let block = parse_tabular(&index(), text).unwrap();
        let items: Vec<_> = block
            .items
            .iter()
            .map(|i| (i.store.as_str(), i.product.as_str(), i.price, i.quantity))
            .collect();
        assert_eq!(
            items,
            vec![
                ("豆花店", "手工豆花", dec!(5.50), 2),
                ("豆花店", "檸檬綠", dec!(5.00), 2),
            ]
        );
    }

    #[test]
    fn test_layout_is_decided_per_block() {
        let index = index();
        let mut state = CarryState::default();
        let row = "0: 1, 1: 豆花店, 2: 手工豆花, 3: 芋圓, 4: 5.50, 5: 2, 6: 11";
        tokenize_row(&index, &mut state, row).unwrap();
        assert!(state.store_layout);

        // a fresh block starts undecided again
        let plain = parse_tabular(&index, "0: 1, 1: 手工豆花, 2: , 3: 5.50, 4: 2, 5: 11, 6: 11").unwrap();
        assert_eq!(plain.items.len(), 1);
        assert_eq!(plain.items[0].price, dec!(5.50));
    }

    #[test]
    fn test_unknown_product_falls_back_to_last_store() {
        let text = "0: 1, 1: 珍珠奶茶, 2: 少冰, 3: 6.00, 4: 1, 5: 6\n\
                    0: 2, 1: 隱藏版, 2: , 3: 3.00, 4: 1, 5: 3";
        let block = parse_tabular(&index(), text).unwrap();
        assert_eq!(block.items[1].store_id, Some(2));
        assert_eq!(block.items[1].store, "茶飲");
    }

    #[test]
    fn test_carry_state_step_by_step() {
        let index = index();
        let mut state = CarryState::default();

        let first = step(
            &index,
            &mut state,
            vec![Token::StoreCarry("tea".to_string())],
        );
        assert!(first.is_none());
        assert_eq!(state.store, "tea");

        let second = step(
            &index,
            &mut state,
            vec![
                Token::Name("無糖綠".to_string()),
                Token::Option(String::new()),
                Token::Price(dec!(4.00)),
                Token::Quantity(1),
            ],
        )
        .unwrap();
        assert_eq!(second.store_id, Some(2));
        assert_eq!(state.last_store_id, Some(2));
    }

    #[test]
    fn test_rows_without_price_or_quantity_are_skipped() {
        let text = "0: 1, 1: 手工豆花, 2: 芋圓, 3: , 4: 2, 5: 11\n\
                    0: 2, 1: 手工豆花, 2: 芋圓, 3: 5.50, 4: , 5: 11\n\
                    0: 3, 1: 手工豆花, 2: 芋圓, 3: 5.50, 4: 1, 5: ";
        let block = parse_tabular(&index(), text).unwrap();
        assert!(block.items.is_empty());
    }

    #[test]
    fn test_section_total_rows() {
        let text = "0: 1, 1: 手工豆花, 2: , 3: 5.50, 4: 2, 5: 11\n\
                    0: , 1: , 2: , 3: , 4: 自填Total, 5: 11";
        let block = parse_tabular(&index(), text).unwrap();
        assert_eq!(block.items.len(), 1);
        assert_eq!(block.declared_total, Some(dec!(11)));
    }

    #[test]
    fn test_options_only_row_is_an_item() {
        let block = parse_tabular(&index(), "0: 1, 1: , 2: 加芋圓, 3: 1.00, 4: 1, 5: 1").unwrap();
        assert_eq!(block.items.len(), 1);
        assert_eq!(block.items[0].product, "");
        assert_eq!(block.items[0].options, "加芋圓");
    }

    #[test]
    fn test_bad_price_is_fatal() {
        let err = parse_tabular(&index(), "0: 1, 1: 手工豆花, 2: , 3: abc, 4: 2, 5: 11").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));

        let err = parse_tabular(&index(), "0: 1, 1: 手工豆花").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}
