//! Order-line parsing.
//!
//! An input line is a semicolon-separated list of parts, each
//! `<type> <size> x<quantity>` (case-insensitive). Multi-quantity parts are
//! expanded into singleton orders, each with its own order id; ids are
//! allocated monotonically from 1 for the life of the parser.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use pizzeria_core::codec::PizzaOrder;
use pizzeria_core::pizza::{InvalidName, PizzaSize, PizzaType};

static ORDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z]+)\s+(S|M|L|XL|XXL)\s+x(\d+)$").expect("order pattern is valid")
});

/// Order-line failures, surfaced to the prompt; the loop continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The part did not match `<type> <size> x<quantity>`.
    #[error("invalid order format: {0:?}, expected \"<type> <size> x<quantity>\"")]
    InvalidFormat(String),

    /// The type or size named no known pizza.
    #[error("invalid order {part:?}: {source}")]
    UnknownPizza {
        /// The offending order part.
        part: String,
        #[source]
        source: InvalidName,
    },

    /// The quantity did not fit a `u32`.
    #[error("invalid quantity in order {0:?}")]
    InvalidQuantity(String),

    /// The line held no order at all.
    #[error("no pizza orders found in {0:?}")]
    Empty(String),
}

/// Stateful parser owning the reception-wide order id counter.
#[derive(Debug)]
pub struct OrderParser {
    next_order_id: u32,
}

impl OrderParser {
    #[must_use]
    pub fn new() -> Self {
        Self { next_order_id: 1 }
    }

    /// Parse one input line into expanded singleton orders.
    ///
    /// # Errors
    ///
    /// Fails on a malformed part, an unknown pizza name, or a line with no
    /// orders; no order ids are consumed on failure.
    pub fn parse(&mut self, input: &str) -> Result<Vec<PizzaOrder>, ParseError> {
        let mut orders = Vec::new();
        let mut next_id = self.next_order_id;

        for part in input.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let captures = ORDER_PATTERN
                .captures(part)
                .ok_or_else(|| ParseError::InvalidFormat(part.to_string()))?;

            let pizza_type: PizzaType =
                captures[1].parse().map_err(|source| ParseError::UnknownPizza {
                    part: part.to_string(),
                    source,
                })?;
            let size: PizzaSize =
                captures[2].parse().map_err(|source| ParseError::UnknownPizza {
                    part: part.to_string(),
                    source,
                })?;
            let quantity: u32 = captures[3]
                .parse()
                .map_err(|_| ParseError::InvalidQuantity(part.to_string()))?;

            for _ in 0..quantity {
                orders.push(PizzaOrder {
                    pizza_type,
                    size,
                    quantity: 1,
                    order_id: next_id,
                });
                next_id += 1;
            }
        }

        if orders.is_empty() {
            return Err(ParseError::Empty(input.to_string()));
        }

        self.next_order_id = next_id;
        Ok(orders)
    }
}

impl Default for OrderParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_order_parses() {
        let mut parser = OrderParser::new();
        let orders = parser.parse("margarita M x1").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].pizza_type, PizzaType::Margarita);
        assert_eq!(orders[0].size, PizzaSize::M);
        assert_eq!(orders[0].quantity, 1);
        assert_eq!(orders[0].order_id, 1);
    }

    #[test]
    fn quantity_expands_into_singleton_orders() {
        let mut parser = OrderParser::new();
        let orders = parser.parse("regina L x5").unwrap();
        assert_eq!(orders.len(), 5);
        let ids: Vec<u32> = orders.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(orders.iter().all(|o| o.quantity == 1));
    }

    #[test]
    fn semicolons_separate_independent_parts() {
        let mut parser = OrderParser::new();
        let orders = parser.parse("margarita S x2; americana XL x1").unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].pizza_type, PizzaType::Margarita);
        assert_eq!(orders[2].pizza_type, PizzaType::Americana);
        assert_eq!(orders[2].size, PizzaSize::XL);
        assert_eq!(orders[2].order_id, 3);
    }

    #[test]
    fn ids_keep_counting_across_lines() {
        let mut parser = OrderParser::new();
        parser.parse("margarita M x2").unwrap();
        let orders = parser.parse("fantasia XXL x1").unwrap();
        assert_eq!(orders[0].order_id, 3);
    }

    #[test]
    fn parsing_is_case_insensitive() {
        let mut parser = OrderParser::new();
        let orders = parser.parse("MARGARITA xl X2").unwrap();
        assert_eq!(orders[0].size, PizzaSize::XL);
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let mut parser = OrderParser::new();
        assert!(matches!(
            parser.parse("garbage"),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            parser.parse("margarita M"),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            parser.parse("calzone M x1"),
            Err(ParseError::UnknownPizza { .. })
        ));
        assert!(matches!(
            parser.parse("margarita M x99999999999"),
            Err(ParseError::InvalidQuantity(_))
        ));
        assert!(matches!(parser.parse("  ;  ; "), Err(ParseError::Empty(_))));
    }

    #[test]
    fn failed_lines_consume_no_order_ids() {
        let mut parser = OrderParser::new();
        assert!(parser.parse("garbage").is_err());
        let orders = parser.parse("margarita M x1").unwrap();
        assert_eq!(orders[0].order_id, 1);
    }

    #[test]
    fn zero_quantity_yields_no_orders() {
        let mut parser = OrderParser::new();
        assert!(matches!(
            parser.parse("margarita M x0"),
            Err(ParseError::Empty(_))
        ));
    }
}
