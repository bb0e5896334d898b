//! Reception-side kitchen supervision.
//!
//! The manager owns the fleet: it spawns kitchen processes on demand, routes
//! each order to the least-loaded live kitchen, tracks liveness from
//! heartbeats and the child processes themselves, and reaps kitchens that
//! exit or go silent.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use pizzeria_core::codec::{
    KitchenStatus, Message, MessageKind, Packet, PizzaCompletion, PizzaOrder,
};
use pizzeria_core::ipc::{IpcError, IpcManager, Role, RECEPTION_ID};
use pizzeria_core::MAX_PIZZAS_PER_KITCHEN_MULTIPLIER;

/// A kitchen whose last heartbeat is older than this is considered dead.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long cleanup waits for a kitchen to honor a shutdown message.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// How long a terminated kitchen gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Kitchen process launch failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The kitchen binary could not be spawned.
    #[error("failed to spawn kitchen process: {0}")]
    SpawnFailed(String),
}

/// Manager failures surfaced to the command loop.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Everything reception knows about one kitchen. Owned exclusively by the
/// manager; created on spawn, destroyed on reap.
struct KitchenInfo {
    id: u32,
    child: Child,
    last_heartbeat: Instant,
    /// Last known status; `pending_pizzas` is bumped optimistically on every
    /// send and reconciled by status responses and completions.
    status: KitchenStatus,
    active: bool,
}

impl Drop for KitchenInfo {
    fn drop(&mut self) {
        // Normal paths reap the child before the info is dropped; this is
        // the fallback so an early drop never leaks a running process.
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Some(pid) = self.child.id() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
    }
}

/// The load-balancing kitchen supervisor.
pub struct KitchenManager {
    kitchens: Arc<Mutex<BTreeMap<u32, KitchenInfo>>>,
    ipc: Arc<IpcManager>,
    /// Next kitchen id; 0 is reserved for reception itself.
    next_kitchen_id: AtomicU32,
    cooks_per_kitchen: u32,
    restock_interval: Duration,
    time_multiplier: f64,
}

impl KitchenManager {
    /// Create the manager, its reception inbox, and the listener.
    ///
    /// # Errors
    ///
    /// Fails when the reception inbox cannot be created.
    pub fn new(
        cooks_per_kitchen: u32,
        restock_interval: Duration,
        time_multiplier: f64,
    ) -> Result<Self, ManagerError> {
        let ipc = Arc::new(IpcManager::new(
            RECEPTION_ID,
            Role::Reception,
            cooks_per_kitchen,
        )?);
        let kitchens = Arc::new(Mutex::new(BTreeMap::new()));

        register_handlers(&ipc, &kitchens);
        ipc.start_listening()?;

        Ok(Self {
            kitchens,
            ipc,
            next_kitchen_id: AtomicU32::new(1),
            cooks_per_kitchen,
            restock_interval,
            time_multiplier,
        })
    }

    /// Route each order to the best kitchen, spawning one when none
    /// qualifies. Send failures are logged per order and the batch
    /// continues.
    pub async fn distribute_orders(&self, orders: &[PizzaOrder]) {
        self.remove_inactive_kitchens().await;

        for order in orders {
            let target = match self.find_best_kitchen() {
                Some(id) => id,
                None => match self.create_kitchen() {
                    Ok(id) => id,
                    Err(e) => {
                        error!("failed to create kitchen: {e}");
                        continue;
                    }
                },
            };

            let message = Message::new(MessageKind::PizzaOrder, RECEPTION_ID, order.pack().to_hex());
            match self.ipc.send_to_kitchen(target, &message) {
                Ok(()) => {
                    let mut kitchens = self.kitchens.lock().unwrap();
                    if let Some(kitchen) = kitchens.get_mut(&target) {
                        kitchen.status.pending_pizzas += 1;
                        kitchen.last_heartbeat = Instant::now();
                    }
                    info!(
                        "assigned pizza {} {} to kitchen {target}",
                        order.pizza_type, order.size
                    );
                }
                Err(e) => error!("failed to send order to kitchen {target}: {e}"),
            }
        }

        self.remove_inactive_kitchens().await;
    }

    /// Print the status table from the last known statuses, then ask every
    /// kitchen for a fresh snapshot (reflected on the next call).
    pub fn display_status(&self) {
        println!("\n=== Kitchen Status ===");
        println!(
            "{:<10}{:<12}{:<10}{:<8}",
            "Kitchen", "Busy/Total", "Pending", "Status"
        );
        println!("{}", "-".repeat(50));

        {
            let kitchens = self.kitchens.lock().unwrap();
            for (id, kitchen) in kitchens.iter() {
                let state = if kitchen.last_heartbeat.elapsed() < HEARTBEAT_TIMEOUT {
                    "Active"
                } else {
                    "Inactive"
                };
                println!(
                    "{:<10}{:<12}{:<10}{:<8}",
                    id,
                    format!(
                        "{}/{}",
                        kitchen.status.busy_cooks, kitchen.status.total_cooks
                    ),
                    kitchen.status.pending_pizzas,
                    state
                );
            }
            if kitchens.is_empty() {
                println!("No kitchens running");
            }
        }

        println!("======================");
        self.request_status_updates();
    }

    /// Broadcast shutdown, reap every child, and stop listening.
    pub async fn cleanup(&self) {
        let shutdown = Message::new(MessageKind::Shutdown, RECEPTION_ID, String::new());
        if let Err(e) = self.ipc.broadcast_to_kitchens(&shutdown) {
            error!("failed to broadcast shutdown: {e}");
        }

        let kitchens: Vec<KitchenInfo> = {
            let mut map = self.kitchens.lock().unwrap();
            std::mem::take(&mut *map).into_values().collect()
        };
        for mut kitchen in kitchens {
            if tokio::time::timeout(SHUTDOWN_GRACE, kitchen.child.wait())
                .await
                .is_err()
            {
                warn!("kitchen {} ignored shutdown, terminating", kitchen.id);
                terminate_child(&mut kitchen.child).await;
            }
            if let Err(e) = self.ipc.remove_kitchen_channel(kitchen.id) {
                error!("failed to remove channel for kitchen {}: {e}", kitchen.id);
            }
        }

        self.ipc.stop_listening().await;
    }

    /// Live kitchens currently tracked. Mostly useful to tests and logs.
    #[must_use]
    pub fn kitchen_count(&self) -> usize {
        self.kitchens.lock().unwrap().len()
    }

    fn find_best_kitchen(&self) -> Option<u32> {
        let kitchens = self.kitchens.lock().unwrap();
        pick_kitchen(kitchens.values().map(|kitchen| Candidate {
            id: kitchen.id,
            pending: kitchen.status.pending_pizzas,
            capacity: kitchen.status.total_cooks * MAX_PIZZAS_PER_KITCHEN_MULTIPLIER,
            alive: kitchen.active && kitchen.last_heartbeat.elapsed() < HEARTBEAT_TIMEOUT,
        }))
    }

    fn create_kitchen(&self) -> Result<u32, ManagerError> {
        let id = self.next_kitchen_id.fetch_add(1, Ordering::AcqRel);
        self.ipc.create_kitchen_channel(id)?;

        match spawn_kitchen(
            id,
            self.cooks_per_kitchen,
            self.restock_interval,
            self.time_multiplier,
        ) {
            Ok(child) => {
                let kitchen = KitchenInfo {
                    id,
                    child,
                    last_heartbeat: Instant::now(),
                    status: KitchenStatus {
                        kitchen_id: id,
                        busy_cooks: 0,
                        total_cooks: self.cooks_per_kitchen,
                        pending_pizzas: 0,
                        stock: Vec::new(),
                    },
                    active: true,
                };
                self.kitchens.lock().unwrap().insert(id, kitchen);
                info!("created kitchen {id}");
                Ok(id)
            }
            Err(e) => {
                // Roll the channel back so the dead id leaves nothing behind.
                if let Err(remove_err) = self.ipc.remove_kitchen_channel(id) {
                    error!("failed to remove channel for kitchen {id}: {remove_err}");
                }
                Err(e.into())
            }
        }
    }

    /// Reap kitchens whose process exited or whose heartbeat went stale.
    /// Their in-flight and deferred orders are dropped.
    async fn remove_inactive_kitchens(&self) {
        let mut dead = Vec::new();
        {
            let mut kitchens = self.kitchens.lock().unwrap();
            let doomed: Vec<u32> = kitchens
                .iter_mut()
                .filter_map(|(id, kitchen)| {
                    let exited = !matches!(kitchen.child.try_wait(), Ok(None));
                    let stale = kitchen.last_heartbeat.elapsed() > HEARTBEAT_TIMEOUT;
                    (exited || stale).then_some(*id)
                })
                .collect();

            for id in doomed {
                if let Some(kitchen) = kitchens.remove(&id) {
                    println!("Removing inactive kitchen {id}");
                    if let Err(e) = self.ipc.remove_kitchen_channel(id) {
                        error!("failed to remove channel for kitchen {id}: {e}");
                    }
                    dead.push(kitchen);
                }
            }
        }

        for mut kitchen in dead {
            terminate_child(&mut kitchen.child).await;
        }
    }

    fn request_status_updates(&self) {
        let message = Message::new(MessageKind::StatusRequest, RECEPTION_ID, String::new());
        let ids: Vec<u32> = self.kitchens.lock().unwrap().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.ipc.send_to_kitchen(id, &message) {
                error!("failed to request status from kitchen {id}: {e}");
            }
        }
    }
}

fn register_handlers(ipc: &Arc<IpcManager>, kitchens: &Arc<Mutex<BTreeMap<u32, KitchenInfo>>>) {
    let map = Arc::clone(kitchens);
    ipc.set_handler(
        MessageKind::PizzaCompleted,
        Box::new(move |message| {
            let packet = Packet::from_hex(&message.payload)?;
            let completion = PizzaCompletion::unpack(&packet)?;
            println!(
                "Pizza completed: {} {} from kitchen {}",
                completion.pizza.pizza_type, completion.pizza.size, completion.pizza.kitchen_id
            );

            let mut kitchens = map.lock().unwrap();
            if let Some(kitchen) = kitchens.get_mut(&message.sender_id) {
                kitchen.status.pending_pizzas = kitchen.status.pending_pizzas.saturating_sub(1);
                kitchen.last_heartbeat = Instant::now();
            }
            Ok(())
        }),
    );

    let map = Arc::clone(kitchens);
    ipc.set_handler(
        MessageKind::StatusResponse,
        Box::new(move |message| {
            let packet = Packet::from_hex(&message.payload)?;
            let status = KitchenStatus::unpack(&packet)?;

            let mut kitchens = map.lock().unwrap();
            if let Some(kitchen) = kitchens.get_mut(&message.sender_id) {
                kitchen.status = status;
                kitchen.last_heartbeat = Instant::now();
            }
            Ok(())
        }),
    );

    let map = Arc::clone(kitchens);
    ipc.set_handler(
        MessageKind::Heartbeat,
        Box::new(move |message| {
            let mut kitchens = map.lock().unwrap();
            if let Some(kitchen) = kitchens.get_mut(&message.sender_id) {
                kitchen.last_heartbeat = Instant::now();
            }
            Ok(())
        }),
    );
}

/// One kitchen's load figures, as seen when an order is routed.
struct Candidate {
    id: u32,
    pending: u32,
    capacity: u32,
    alive: bool,
}

/// Pick the least-loaded live kitchen with headroom. Candidates arrive in
/// ascending id order, and the strict comparison keeps the lowest id on
/// ties. `None` means every kitchen is dead or at capacity.
fn pick_kitchen(candidates: impl IntoIterator<Item = Candidate>) -> Option<u32> {
    let mut best: Option<(u32, u32)> = None;
    for candidate in candidates {
        if !candidate.alive || candidate.pending >= candidate.capacity {
            continue;
        }
        if best.map_or(true, |(_, load)| candidate.pending < load) {
            best = Some((candidate.id, candidate.pending));
        }
    }
    best.map(|(id, _)| id)
}

fn kitchen_binary() -> Result<PathBuf, ProcessError> {
    if let Ok(path) = std::env::var("PIZZERIA_KITCHEN_BIN") {
        return Ok(PathBuf::from(path));
    }
    let current = std::env::current_exe()
        .map_err(|e| ProcessError::SpawnFailed(format!("cannot locate kitchen binary: {e}")))?;
    Ok(match current.parent() {
        Some(dir) => dir.join("pizzeria-kitchen"),
        None => PathBuf::from("pizzeria-kitchen"),
    })
}

fn spawn_kitchen(
    id: u32,
    cooks: u32,
    restock_interval: Duration,
    time_multiplier: f64,
) -> Result<Child, ProcessError> {
    let program = kitchen_binary()?;
    let mut command = Command::new(&program);
    command
        .arg("--id")
        .arg(id.to_string())
        .arg("--cooks")
        .arg(cooks.to_string())
        .arg("--restock-ms")
        .arg(restock_interval.as_millis().to_string())
        .arg("--multiplier")
        .arg(time_multiplier.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);

    command
        .spawn()
        .map_err(|e| ProcessError::SpawnFailed(format!("{}: {e}", program.display())))
}

/// SIGTERM the child, escalating to SIGKILL after a grace period.
async fn terminate_child(child: &mut Child) {
    if !matches!(child.try_wait(), Ok(None)) {
        return;
    }
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, pending: u32, capacity: u32, alive: bool) -> Candidate {
        Candidate {
            id,
            pending,
            capacity,
            alive,
        }
    }

    #[test]
    fn picks_least_loaded_kitchen() {
        let picked = pick_kitchen([
            candidate(1, 3, 4, true),
            candidate(2, 1, 4, true),
            candidate(3, 2, 4, true),
        ]);
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn skips_kitchens_at_capacity() {
        let picked = pick_kitchen([candidate(1, 4, 4, true), candidate(2, 8, 4, true)]);
        assert_eq!(picked, None);
    }

    #[test]
    fn skips_dead_kitchens() {
        let picked = pick_kitchen([candidate(1, 0, 4, false), candidate(2, 3, 4, true)]);
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn ties_break_to_the_lowest_id() {
        let picked = pick_kitchen([
            candidate(1, 2, 4, true),
            candidate(2, 2, 4, true),
            candidate(3, 2, 4, true),
        ]);
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn no_kitchens_means_none() {
        assert_eq!(pick_kitchen([]), None);
    }

    #[test]
    fn capacity_boundary_is_strict() {
        // One slot of headroom left: still eligible.
        assert_eq!(pick_kitchen([candidate(1, 3, 4, true)]), Some(1));
        // Exactly at capacity: not eligible.
        assert_eq!(pick_kitchen([candidate(1, 4, 4, true)]), None);
    }
}
