//! Ingredient stock with atomic consume-and-commit and periodic replenish.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::pizza::Ingredient;

/// Starting count for every ingredient.
pub const INITIAL_STOCK: u32 = 5;

/// Interval at which the replenish task re-checks its stop flag.
const RESTOCK_POLL: Duration = Duration::from_millis(100);

/// Ingredient counters shared by the scheduler and the replenish task.
pub struct Stock {
    counts: Mutex<BTreeMap<Ingredient, u32>>,
    restock_interval: Duration,
    replenishing: AtomicBool,
}

impl Stock {
    /// Stock every ingredient at [`INITIAL_STOCK`].
    #[must_use]
    pub fn new(restock_interval: Duration) -> Self {
        let counts = Ingredient::ALL
            .into_iter()
            .map(|ingredient| (ingredient, INITIAL_STOCK))
            .collect();
        Self {
            counts: Mutex::new(counts),
            restock_interval,
            replenishing: AtomicBool::new(false),
        }
    }

    /// Consume one of each listed ingredient, all or nothing.
    #[must_use]
    pub fn consume(&self, ingredients: &[Ingredient]) -> bool {
        self.consume_for(ingredients, || true)
    }

    /// Reserve one of each listed ingredient and hand control to `commit`.
    ///
    /// The reservation is made under the stock lock; if `commit` returns
    /// false (say, no cook accepted the pizza) the reservation is rolled back
    /// and the stock is left exactly as it was. Ingredients are debited iff
    /// the commit succeeds.
    #[must_use]
    pub fn consume_for(&self, ingredients: &[Ingredient], commit: impl FnOnce() -> bool) -> bool {
        let mut counts = self.counts.lock().unwrap();

        for ingredient in ingredients {
            if counts.get(ingredient).copied().unwrap_or(0) == 0 {
                return false;
            }
        }
        for ingredient in ingredients {
            if let Some(count) = counts.get_mut(ingredient) {
                *count -= 1;
            }
        }

        if commit() {
            true
        } else {
            for ingredient in ingredients {
                if let Some(count) = counts.get_mut(ingredient) {
                    *count += 1;
                }
            }
            false
        }
    }

    /// Snapshot of every ingredient count, in wire-value order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Ingredient, u32)> {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .map(|(ingredient, count)| (*ingredient, *count))
            .collect()
    }

    /// Spawn the replenish task: every restock interval, add one of each
    /// ingredient. Runs until [`Stock::halt_replenish`].
    pub fn spawn_replenish(self: &Arc<Self>) -> JoinHandle<()> {
        self.replenishing.store(true, Ordering::Release);
        let stock = Arc::clone(self);
        tokio::spawn(async move { stock.replenish_loop().await })
    }

    /// Ask the replenish task to stop; it exits within one poll interval.
    pub fn halt_replenish(&self) {
        self.replenishing.store(false, Ordering::Release);
    }

    async fn replenish_loop(&self) {
        // A zero interval would spin; replenish at the poll rate instead.
        let interval = if self.restock_interval.is_zero() {
            RESTOCK_POLL
        } else {
            self.restock_interval
        };
        while self.replenishing.load(Ordering::Acquire) {
            let mut remaining = interval;
            while !remaining.is_zero() && self.replenishing.load(Ordering::Acquire) {
                let step = remaining.min(RESTOCK_POLL);
                tokio::time::sleep(step).await;
                remaining = remaining.saturating_sub(step);
            }
            if !self.replenishing.load(Ordering::Acquire) {
                break;
            }

            let mut counts = self.counts.lock().unwrap();
            for count in counts.values_mut() {
                *count = count.saturating_add(1);
            }
            trace!("stock replenished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pizza::PizzaType;

    #[test]
    fn consume_debits_each_ingredient_once() {
        let stock = Stock::new(Duration::from_secs(60));
        assert!(stock.consume(PizzaType::Margarita.ingredients()));

        let counts: BTreeMap<_, _> = stock.snapshot().into_iter().collect();
        assert_eq!(counts[&Ingredient::Dough], INITIAL_STOCK - 1);
        assert_eq!(counts[&Ingredient::Gruyere], INITIAL_STOCK - 1);
        assert_eq!(counts[&Ingredient::Steak], INITIAL_STOCK);
    }

    #[test]
    fn consume_is_all_or_nothing() {
        let stock = Stock::new(Duration::from_secs(60));

        // Drain the gruyere.
        for _ in 0..INITIAL_STOCK {
            assert!(stock.consume(&[Ingredient::Gruyere]));
        }

        let before = stock.snapshot();
        assert!(!stock.consume(PizzaType::Regina.ingredients()));
        assert_eq!(stock.snapshot(), before);
    }

    #[test]
    fn declined_commit_rolls_back() {
        let stock = Stock::new(Duration::from_secs(60));
        let before = stock.snapshot();

        assert!(!stock.consume_for(PizzaType::Fantasia.ingredients(), || false));
        assert_eq!(stock.snapshot(), before);
    }

    #[test]
    fn committed_consume_sticks() {
        let stock = Stock::new(Duration::from_secs(60));
        assert!(stock.consume_for(PizzaType::Americana.ingredients(), || true));

        let counts: BTreeMap<_, _> = stock.snapshot().into_iter().collect();
        assert_eq!(counts[&Ingredient::Steak], INITIAL_STOCK - 1);
    }

    #[tokio::test]
    async fn replenish_adds_one_of_everything() {
        let stock = Arc::new(Stock::new(Duration::from_millis(20)));
        let task = stock.spawn_replenish();

        tokio::time::sleep(Duration::from_millis(120)).await;
        stock.halt_replenish();
        let _ = task.await;

        for (_, count) in stock.snapshot() {
            assert!(count > INITIAL_STOCK);
        }
    }

    #[tokio::test]
    async fn halted_replenish_stops_adding() {
        let stock = Arc::new(Stock::new(Duration::from_millis(10)));
        let task = stock.spawn_replenish();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stock.halt_replenish();
        let _ = task.await;

        let frozen = stock.snapshot();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stock.snapshot(), frozen);
    }
}
