//! A cook prepares one pizza at a time on its own worker task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::pizza::Pizza;

/// Called on the cook's task when a pizza finishes cooking.
pub type CompletionCallback = Arc<dyn Fn(Pizza) + Send + Sync>;

/// Cooking progresses in chunks of this length so a stop request is observed
/// promptly.
const COOK_CHUNK: Duration = Duration::from_millis(100);

/// Sleep between polls of an empty work slot.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// A single cooking unit with a one-deep work slot.
///
/// `assign` claims the busy flag, so a cook holds at most one pizza between
/// the slot and the oven. Stopping is cooperative: a pizza in flight at stop
/// time is abandoned without a completion callback.
pub struct Cook {
    id: u32,
    time_multiplier: f64,
    on_complete: CompletionCallback,
    busy: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Pizza>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Cook {
    /// Build a cook. It does nothing until [`Cook::start`].
    #[must_use]
    pub fn new(id: u32, time_multiplier: f64, on_complete: CompletionCallback) -> Self {
        Self {
            id,
            time_multiplier,
            on_complete,
            busy: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            slot: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the cooking task. A second call while running is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.should_stop.store(false, Ordering::Release);

        let id = self.id;
        let multiplier = self.time_multiplier;
        let on_complete = Arc::clone(&self.on_complete);
        let busy = Arc::clone(&self.busy);
        let should_stop = Arc::clone(&self.should_stop);
        let slot = Arc::clone(&self.slot);
        *worker = Some(tokio::spawn(cooking_loop(
            id,
            multiplier,
            on_complete,
            busy,
            should_stop,
            slot,
        )));
    }

    /// Signal the cook to stop and wait for its task to exit.
    pub async fn stop(&self) {
        self.should_stop.store(true, Ordering::Release);
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Whether the cook holds a pizza, assigned or in the oven.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Hand the cook a pizza. Returns false if it is already busy.
    #[must_use]
    pub fn assign(&self, pizza: Pizza) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.slot.lock().unwrap() = Some(pizza);
        true
    }
}

async fn cooking_loop(
    id: u32,
    multiplier: f64,
    on_complete: CompletionCallback,
    busy: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Pizza>>>,
) {
    while !should_stop.load(Ordering::Acquire) {
        let next = slot.lock().unwrap().take();
        match next {
            Some(pizza) => {
                debug!("cook {id} starts cooking {pizza} (order {})", pizza.order_id);
                let finished = cook_pizza(&pizza, multiplier, &should_stop).await;
                if finished {
                    on_complete(pizza);
                }
                busy.store(false, Ordering::Release);
            }
            None => tokio::time::sleep(IDLE_POLL).await,
        }
    }
}

/// Sleep out the cooking time in chunks. Returns false when interrupted by a
/// stop request.
async fn cook_pizza(pizza: &Pizza, multiplier: f64, should_stop: &AtomicBool) -> bool {
    let mut remaining = pizza.pizza_type.cooking_time(multiplier);
    while !remaining.is_zero() {
        if should_stop.load(Ordering::Acquire) {
            return false;
        }
        let step = remaining.min(COOK_CHUNK);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    !should_stop.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::pizza::{PizzaSize, PizzaType};

    fn margarita(order_id: u32) -> Pizza {
        Pizza {
            pizza_type: PizzaType::Margarita,
            size: PizzaSize::M,
            order_id,
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn cook_completes_a_pizza_and_reports_its_order_id() {
        let completed = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&completed);
        let cook = Cook::new(
            1,
            0.01,
            Arc::new(move |pizza| {
                seen.store(pizza.order_id, Ordering::Release);
            }),
        );
        cook.start();

        assert!(cook.assign(margarita(42)));
        assert!(cook.is_busy());

        assert!(wait_until(|| completed.load(Ordering::Acquire) == 42).await);
        assert!(wait_until(|| !cook.is_busy()).await);
        cook.stop().await;
    }

    #[tokio::test]
    async fn busy_cook_rejects_a_second_pizza() {
        let cook = Cook::new(1, 10.0, Arc::new(|_| {}));
        cook.start();

        assert!(cook.assign(margarita(1)));
        assert!(!cook.assign(margarita(2)));
        cook.stop().await;
    }

    #[tokio::test]
    async fn cook_becomes_free_again_after_cooking() {
        let cook = Cook::new(1, 0.01, Arc::new(|_| {}));
        cook.start();

        assert!(cook.assign(margarita(1)));
        assert!(wait_until(|| !cook.is_busy()).await);
        assert!(cook.assign(margarita(2)));
        cook.stop().await;
    }

    #[tokio::test]
    async fn stop_suppresses_completion_of_in_flight_pizza() {
        let completed = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&completed);
        // Long cook so the stop lands mid-flight.
        let cook = Cook::new(1, 10.0, Arc::new(move |_| {
            seen.fetch_add(1, Ordering::AcqRel);
        }));
        cook.start();

        assert!(cook.assign(margarita(1)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cook.stop().await;

        assert_eq!(completed.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn idle_cook_stops_promptly() {
        let cook = Cook::new(1, 1.0, Arc::new(|_| {}));
        cook.start();
        cook.stop().await;
        assert!(!cook.is_busy());
    }
}
