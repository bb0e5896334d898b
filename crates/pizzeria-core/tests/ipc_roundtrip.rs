//! End-to-end IPC dispatch over real POSIX queues.
//!
//! Reception and kitchen endpoints live in the same process here; the queue
//! names are process-global, so everything runs in one test body.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pizzeria_core::codec::{Message, MessageKind, Packet, PizzaOrder};
use pizzeria_core::ipc::{kitchen_inbox_name, IpcManager, Role, RECEPTION_ID};
use pizzeria_core::pizza::{PizzaSize, PizzaType};
use pizzeria_core::transport::MessageQueue;

const KITCHEN_ID: u32 = 91;

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reception_and_kitchen_exchange_messages() {
    let reception = IpcManager::new(RECEPTION_ID, Role::Reception, 2).unwrap();
    reception.create_kitchen_channel(KITCHEN_ID).unwrap();

    let kitchen = IpcManager::new(KITCHEN_ID, Role::Kitchen, 2).unwrap();
    kitchen.connect_to_reception().unwrap();
    assert!(kitchen.is_connected());

    // Reception counts heartbeats from our kitchen.
    let heartbeats = Arc::new(AtomicU32::new(0));
    let seen_heartbeats = Arc::clone(&heartbeats);
    reception.set_handler(
        MessageKind::Heartbeat,
        Box::new(move |message| {
            assert_eq!(message.sender_id, KITCHEN_ID);
            seen_heartbeats.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }),
    );
    reception.start_listening().unwrap();

    // The kitchen records the order ids it is handed.
    let last_order = Arc::new(AtomicU32::new(0));
    let seen_order = Arc::clone(&last_order);
    kitchen.set_handler(
        MessageKind::PizzaOrder,
        Box::new(move |message| {
            let packet = Packet::from_hex(&message.payload)?;
            let order = PizzaOrder::unpack(&packet)?;
            seen_order.store(order.order_id, Ordering::Release);
            Ok(())
        }),
    );
    kitchen.start_listening().unwrap();

    // Kitchen → reception.
    kitchen
        .send_to_reception(&Message::new(MessageKind::Heartbeat, KITCHEN_ID, String::new()))
        .unwrap();
    assert!(wait_until(|| heartbeats.load(Ordering::Acquire) == 1).await);

    // Reception → kitchen, with a packed payload.
    let order = PizzaOrder {
        pizza_type: PizzaType::Americana,
        size: PizzaSize::XL,
        quantity: 1,
        order_id: 1234,
    };
    let envelope = Message::new(MessageKind::PizzaOrder, RECEPTION_ID, order.pack().to_hex());
    reception.send_to_kitchen(KITCHEN_ID, &envelope).unwrap();
    assert!(wait_until(|| last_order.load(Ordering::Acquire) == 1234).await);

    // A malformed envelope is dropped and the listener keeps running.
    let raw = MessageQueue::open(&kitchen_inbox_name(KITCHEN_ID)).unwrap();
    raw.send(b"not|a|message", 0).unwrap();
    let second = PizzaOrder { order_id: 5678, ..order };
    let envelope = Message::new(MessageKind::PizzaOrder, RECEPTION_ID, second.pack().to_hex());
    reception.send_to_kitchen(KITCHEN_ID, &envelope).unwrap();
    assert!(wait_until(|| last_order.load(Ordering::Acquire) == 5678).await);

    // A kind with no registered handler is silently dropped.
    reception
        .send_to_kitchen(
            KITCHEN_ID,
            &Message::new(MessageKind::StatusRequest, RECEPTION_ID, String::new()),
        )
        .unwrap();

    // Sends to kitchens without a channel fail loudly.
    assert!(matches!(
        reception.send_to_kitchen(999, &envelope),
        Err(pizzeria_core::ipc::IpcError::UnknownKitchen(999))
    ));

    kitchen.stop_listening().await;
    reception.stop_listening().await;
    assert!(!reception.is_listening());
    reception.remove_kitchen_channel(KITCHEN_ID).unwrap();

    // The channel's queue name is gone once the channel is removed.
    assert!(MessageQueue::open(&kitchen_inbox_name(KITCHEN_ID)).is_err());
}
