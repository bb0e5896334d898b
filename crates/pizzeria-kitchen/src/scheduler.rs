//! The kitchen scheduler.
//!
//! Owns the cook pool, the ingredient stock, and the deferred-order list.
//! Orders arrive on the kitchen inbox; each is dispatched to a free cook iff
//! its ingredients can be consumed (one atomic decision), otherwise it is
//! deferred and retried on every tick. The scheduler heartbeats reception
//! once a second and exits after five idle seconds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pizzeria_core::codec::{
    KitchenStatus, Message, MessageKind, Packet, PizzaCompletion, PizzaOrder, PizzaRecord,
};
use pizzeria_core::cook::{CompletionCallback, Cook};
use pizzeria_core::ipc::{IpcError, IpcManager, Role};
use pizzeria_core::pizza::Pizza;
use pizzeria_core::stock::Stock;

/// How often the kitchen signals liveness to reception.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A kitchen with no activity for this long shuts itself down.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler loop tick.
const TICK: Duration = Duration::from_millis(100);

/// Parameters a kitchen process is launched with.
#[derive(Debug, Clone, Copy)]
pub struct KitchenConfig {
    /// This kitchen's id, assigned by reception.
    pub id: u32,
    /// Number of cooks in the pool.
    pub cooks: u32,
    /// Interval between stock replenishments.
    pub restock_interval: Duration,
    /// Cooking-time multiplier.
    pub time_multiplier: f64,
}

/// One kitchen process's scheduler.
pub struct Kitchen {
    id: u32,
    cook_count: u32,
    ipc: Arc<IpcManager>,
    stock: Arc<Stock>,
    cooks: Arc<Vec<Cook>>,
    pending: Arc<AtomicU32>,
    deferred: Arc<Mutex<VecDeque<PizzaOrder>>>,
    activity: Arc<ActivityClock>,
    running: Arc<AtomicBool>,
}

impl Kitchen {
    /// Assemble the scheduler. Nothing runs until [`Kitchen::run`].
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; kept fallible for symmetry with the
    /// reception side, which creates queues at construction.
    pub fn new(config: KitchenConfig) -> Result<Self, IpcError> {
        let ipc = Arc::new(IpcManager::new(config.id, Role::Kitchen, config.cooks)?);
        let stock = Arc::new(Stock::new(config.restock_interval));
        let pending = Arc::new(AtomicU32::new(0));
        let deferred = Arc::new(Mutex::new(VecDeque::new()));
        let activity = Arc::new(ActivityClock::new());
        let running = Arc::new(AtomicBool::new(true));

        let cooks: Vec<Cook> = (1..=config.cooks)
            .map(|cook_id| {
                Cook::new(
                    cook_id,
                    config.time_multiplier,
                    completion_callback(
                        config.id,
                        Arc::downgrade(&ipc),
                        Arc::clone(&pending),
                        Arc::clone(&activity),
                    ),
                )
            })
            .collect();
        let cooks = Arc::new(cooks);

        let kitchen = Self {
            id: config.id,
            cook_count: config.cooks,
            ipc,
            stock,
            cooks,
            pending,
            deferred,
            activity,
            running,
        };
        kitchen.register_handlers();
        Ok(kitchen)
    }

    fn register_handlers(&self) {
        let id = self.id;

        let stock = Arc::clone(&self.stock);
        let cooks = Arc::clone(&self.cooks);
        let pending = Arc::clone(&self.pending);
        let activity = Arc::clone(&self.activity);
        let deferred = Arc::clone(&self.deferred);
        self.ipc.set_handler(
            MessageKind::PizzaOrder,
            Box::new(move |message| {
                let packet = Packet::from_hex(&message.payload)?;
                let order = PizzaOrder::unpack(&packet)?;
                if try_dispatch(&stock, &cooks, &pending, &activity, &order) {
                    info!(
                        "kitchen {id} accepted pizza order: {} {}",
                        order.pizza_type, order.size
                    );
                } else {
                    deferred.lock().unwrap().push_back(order);
                    info!(
                        "kitchen {id} queued pizza order (no cook/stock available): {} {}",
                        order.pizza_type, order.size
                    );
                }
                Ok(())
            }),
        );

        let ipc = Arc::downgrade(&self.ipc);
        let cooks = Arc::clone(&self.cooks);
        let pending = Arc::clone(&self.pending);
        let stock = Arc::clone(&self.stock);
        let activity = Arc::clone(&self.activity);
        let total_cooks = self.cook_count;
        self.ipc.set_handler(
            MessageKind::StatusRequest,
            Box::new(move |_message| {
                activity.touch();
                if let Some(ipc) = ipc.upgrade() {
                    send_status(&ipc, id, total_cooks, &cooks, &pending, &stock)?;
                }
                Ok(())
            }),
        );

        let running = Arc::clone(&self.running);
        self.ipc.set_handler(
            MessageKind::Shutdown,
            Box::new(move |_message| {
                info!("kitchen {id} received shutdown signal");
                running.store(false, Ordering::Release);
                Ok(())
            }),
        );
    }

    /// Run the kitchen until shutdown or idle timeout.
    ///
    /// # Errors
    ///
    /// Fails when reception's queues cannot be opened; after startup the
    /// loop only exits through a shutdown message or the idle timeout.
    pub async fn run(&self) -> Result<(), IpcError> {
        self.ipc.connect_to_reception()?;
        let replenish = self.stock.spawn_replenish();
        for cook in self.cooks.iter() {
            cook.start();
        }
        self.ipc.start_listening()?;
        info!("kitchen {} started with {} cooks", self.id, self.cook_count);

        let mut last_heartbeat = Instant::now();
        while self.running.load(Ordering::Acquire) {
            if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                self.send_heartbeat();
                last_heartbeat = Instant::now();
            }

            self.process_deferred();

            if self.activity.idle_for() >= IDLE_TIMEOUT {
                info!("kitchen {} timed out due to inactivity", self.id);
                break;
            }

            tokio::time::sleep(TICK).await;
        }

        info!("kitchen {} shutting down", self.id);
        self.shutdown(replenish).await;
        Ok(())
    }

    /// Stop the listener, the cooks, and the replenish task, joining each.
    async fn shutdown(&self, replenish: JoinHandle<()>) {
        self.running.store(false, Ordering::Release);
        self.ipc.stop_listening().await;
        for cook in self.cooks.iter() {
            cook.stop().await;
        }
        self.stock.halt_replenish();
        let _ = replenish.await;
    }

    fn send_heartbeat(&self) {
        let message = Message::new(MessageKind::Heartbeat, self.id, String::new());
        if let Err(e) = self.ipc.send_to_reception(&message) {
            warn!("kitchen {} failed to send heartbeat: {e}", self.id);
        }
    }

    /// Retry every deferred order in arrival order, keeping the ones that
    /// still cannot be dispatched.
    fn process_deferred(&self) {
        let mut deferred = self.deferred.lock().unwrap();
        deferred.retain(|order| {
            let dispatched =
                try_dispatch(&self.stock, &self.cooks, &self.pending, &self.activity, order);
            if dispatched {
                info!(
                    "kitchen {} assigned deferred pizza order: {} {}",
                    self.id, order.pizza_type, order.size
                );
            }
            !dispatched
        });
    }
}

/// Clock tracking the last moment this kitchen did something useful.
struct ActivityClock {
    last: Mutex<Instant>,
}

impl ActivityClock {
    fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last.lock().unwrap().elapsed()
    }
}

/// Consume the order's ingredients and hand it to a free cook as one atomic
/// decision: the stock is debited iff a cook took the pizza.
fn try_dispatch(
    stock: &Stock,
    cooks: &[Cook],
    pending: &AtomicU32,
    activity: &ActivityClock,
    order: &PizzaOrder,
) -> bool {
    let pizza = Pizza {
        pizza_type: order.pizza_type,
        size: order.size,
        order_id: order.order_id,
    };
    stock.consume_for(order.pizza_type.ingredients(), || {
        for cook in cooks {
            if cook.assign(pizza) {
                pending.fetch_add(1, Ordering::AcqRel);
                activity.touch();
                return true;
            }
        }
        false
    })
}

fn send_status(
    ipc: &IpcManager,
    kitchen_id: u32,
    total_cooks: u32,
    cooks: &[Cook],
    pending: &AtomicU32,
    stock: &Stock,
) -> Result<(), IpcError> {
    let status = KitchenStatus {
        kitchen_id,
        busy_cooks: cooks.iter().filter(|cook| cook.is_busy()).count() as u32,
        total_cooks,
        pending_pizzas: pending.load(Ordering::Acquire),
        stock: stock.snapshot(),
    };
    let message = Message::new(MessageKind::StatusResponse, kitchen_id, status.pack().to_hex());
    ipc.send_to_reception(&message)
}

/// Callback run on a cook's task when its pizza is done: report to reception
/// and settle the pending counter.
fn completion_callback(
    kitchen_id: u32,
    ipc: Weak<IpcManager>,
    pending: Arc<AtomicU32>,
    activity: Arc<ActivityClock>,
) -> CompletionCallback {
    Arc::new(move |pizza: Pizza| {
        let completion = PizzaCompletion {
            pizza: PizzaRecord {
                pizza_type: pizza.pizza_type,
                size: pizza.size,
                order_id: pizza.order_id,
                kitchen_id,
            },
            completed_at_nanos: monotonic_nanos(),
        };
        let message = Message::new(
            MessageKind::PizzaCompleted,
            kitchen_id,
            completion.pack().to_hex(),
        );
        if let Some(ipc) = ipc.upgrade() {
            if let Err(e) = ipc.send_to_reception(&message) {
                error!("kitchen {kitchen_id} failed to report completed {pizza}: {e}");
            }
        }
        // Saturating: a spurious completion must not wrap the counter.
        let _ = pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        });
        activity.touch();
    })
}

/// Nanoseconds on a process-local monotonic clock.
fn monotonic_nanos() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pizzeria_core::pizza::{Ingredient, PizzaSize, PizzaType};

    fn order(order_id: u32, pizza_type: PizzaType) -> PizzaOrder {
        PizzaOrder {
            pizza_type,
            size: PizzaSize::M,
            quantity: 1,
            order_id,
        }
    }

    /// Cooks that are never started keep whatever the dispatch decision gave
    /// them, which makes the tests deterministic.
    fn idle_cooks(count: u32) -> Vec<Cook> {
        (1..=count)
            .map(|id| Cook::new(id, 1.0, Arc::new(|_| {})))
            .collect()
    }

    #[test]
    fn dispatch_debits_stock_and_bumps_pending() {
        let stock = Stock::new(Duration::from_secs(60));
        let cooks = idle_cooks(2);
        let pending = AtomicU32::new(0);
        let activity = ActivityClock::new();

        assert!(try_dispatch(
            &stock,
            &cooks,
            &pending,
            &activity,
            &order(1, PizzaType::Margarita)
        ));
        assert_eq!(pending.load(Ordering::Acquire), 1);
        assert!(cooks[0].is_busy());
        assert!(!cooks[1].is_busy());

        let counts: std::collections::BTreeMap<_, _> = stock.snapshot().into_iter().collect();
        assert_eq!(counts[&Ingredient::Dough], 4);
    }

    #[test]
    fn dispatch_rolls_back_stock_when_every_cook_is_busy() {
        let stock = Stock::new(Duration::from_secs(60));
        let cooks = idle_cooks(1);
        let pending = AtomicU32::new(0);
        let activity = ActivityClock::new();

        assert!(try_dispatch(
            &stock,
            &cooks,
            &pending,
            &activity,
            &order(1, PizzaType::Margarita)
        ));
        let before = stock.snapshot();

        assert!(!try_dispatch(
            &stock,
            &cooks,
            &pending,
            &activity,
            &order(2, PizzaType::Margarita)
        ));
        assert_eq!(stock.snapshot(), before);
        assert_eq!(pending.load(Ordering::Acquire), 1);
    }

    #[test]
    fn dispatch_fails_without_touching_cooks_when_stock_is_short() {
        let stock = Stock::new(Duration::from_secs(60));
        for _ in 0..pizzeria_core::stock::INITIAL_STOCK {
            assert!(stock.consume(&[Ingredient::Ham]));
        }
        let cooks = idle_cooks(1);
        let pending = AtomicU32::new(0);
        let activity = ActivityClock::new();

        assert!(!try_dispatch(
            &stock,
            &cooks,
            &pending,
            &activity,
            &order(1, PizzaType::Regina)
        ));
        assert!(!cooks[0].is_busy());
        assert_eq!(pending.load(Ordering::Acquire), 0);
    }

    #[test]
    fn deferred_orders_dispatch_in_arrival_order_once_possible() {
        let config = KitchenConfig {
            id: 3,
            cooks: 2,
            restock_interval: Duration::from_secs(60),
            time_multiplier: 1.0,
        };
        let kitchen = Kitchen::new(config).unwrap();
        kitchen.deferred.lock().unwrap().extend([
            order(10, PizzaType::Margarita),
            order(11, PizzaType::Margarita),
            order(12, PizzaType::Margarita),
        ]);

        // Two cooks, never started: two orders dispatch, the third stays.
        kitchen.process_deferred();
        let left: Vec<u32> = kitchen
            .deferred
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.order_id)
            .collect();
        assert_eq!(left, vec![12]);
        assert_eq!(kitchen.pending.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn deferred_order_dispatches_after_restock() {
        let config = KitchenConfig {
            id: 4,
            cooks: 1,
            restock_interval: Duration::from_millis(30),
            time_multiplier: 1.0,
        };
        let kitchen = Kitchen::new(config).unwrap();

        // Exhaust the ham so a regina cannot dispatch yet.
        for _ in 0..pizzeria_core::stock::INITIAL_STOCK {
            assert!(kitchen.stock.consume(&[Ingredient::Ham]));
        }
        kitchen
            .deferred
            .lock()
            .unwrap()
            .push_back(order(20, PizzaType::Regina));

        kitchen.process_deferred();
        assert_eq!(kitchen.deferred.lock().unwrap().len(), 1);

        let replenish = kitchen.stock.spawn_replenish();
        tokio::time::sleep(Duration::from_millis(100)).await;
        kitchen.process_deferred();
        kitchen.stock.halt_replenish();
        let _ = replenish.await;

        assert!(kitchen.deferred.lock().unwrap().is_empty());
        assert_eq!(kitchen.pending.load(Ordering::Acquire), 1);
    }

    #[test]
    fn completion_callback_saturates_pending_at_zero() {
        let pending = Arc::new(AtomicU32::new(0));
        let activity = Arc::new(ActivityClock::new());
        let callback = completion_callback(1, Weak::new(), Arc::clone(&pending), activity);

        callback(Pizza {
            pizza_type: PizzaType::Margarita,
            size: PizzaSize::S,
            order_id: 1,
        });
        assert_eq!(pending.load(Ordering::Acquire), 0);

        pending.store(2, Ordering::Release);
        callback(Pizza {
            pizza_type: PizzaType::Margarita,
            size: PizzaSize::S,
            order_id: 2,
        });
        assert_eq!(pending.load(Ordering::Acquire), 1);
    }
}
