//! Typed payloads carried inside message envelopes.

use crate::pizza::{Ingredient, PizzaSize, PizzaType};

use super::{CodecError, Packet};

/// A single pizza order, as sent to a kitchen. Reception expands
/// multi-quantity lines before dispatch, so `quantity` is 1 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PizzaOrder {
    pub pizza_type: PizzaType,
    pub size: PizzaSize,
    pub quantity: u32,
    /// Globally unique within a reception lifetime.
    pub order_id: u32,
}

/// A kitchen's self-reported load and stock snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitchenStatus {
    pub kitchen_id: u32,
    pub busy_cooks: u32,
    pub total_cooks: u32,
    /// Orders accepted and not yet reported complete.
    pub pending_pizzas: u32,
    /// Ingredient counts at snapshot time.
    pub stock: Vec<(Ingredient, u32)>,
}

/// Identity of one pizza as it moves through a kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PizzaRecord {
    pub pizza_type: PizzaType,
    pub size: PizzaSize,
    pub order_id: u32,
    pub kitchen_id: u32,
}

/// Report of a finished pizza, sent back to reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PizzaCompletion {
    pub pizza: PizzaRecord,
    /// Monotonic nanoseconds as observed by the kitchen process.
    pub completed_at_nanos: u64,
}

impl PizzaOrder {
    /// Pack as `u32 type, u32 size, u32 quantity, u32 orderId`.
    #[must_use]
    pub fn pack(&self) -> Packet {
        let mut packet = Packet::new();
        packet.put_u32(self.pizza_type as u32);
        packet.put_u32(self.size as u32);
        packet.put_u32(self.quantity);
        packet.put_u32(self.order_id);
        packet
    }

    /// Unpack from a packed payload.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer or out-of-range enum values.
    pub fn unpack(packet: &Packet) -> Result<Self, CodecError> {
        let mut reader = packet.reader();
        let pizza_type = unpack_pizza_type(reader.get_u32()?)?;
        let size = unpack_size(reader.get_u32()?)?;
        let quantity = reader.get_u32()?;
        let order_id = reader.get_u32()?;
        Ok(Self {
            pizza_type,
            size,
            quantity,
            order_id,
        })
    }
}

impl KitchenStatus {
    /// Pack as the fixed counters followed by `u32 N` and `N` ingredient
    /// pairs.
    #[must_use]
    pub fn pack(&self) -> Packet {
        let mut packet = Packet::new();
        packet.put_u32(self.kitchen_id);
        packet.put_u32(self.busy_cooks);
        packet.put_u32(self.total_cooks);
        packet.put_u32(self.pending_pizzas);
        packet.put_u32(self.stock.len() as u32);
        for (ingredient, count) in &self.stock {
            packet.put_u32(*ingredient as u32);
            packet.put_u32(*count);
        }
        packet
    }

    /// Unpack from a packed payload.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer or out-of-range enum values.
    pub fn unpack(packet: &Packet) -> Result<Self, CodecError> {
        let mut reader = packet.reader();
        let kitchen_id = reader.get_u32()?;
        let busy_cooks = reader.get_u32()?;
        let total_cooks = reader.get_u32()?;
        let pending_pizzas = reader.get_u32()?;
        let entries = reader.get_u32()?;
        let mut stock = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let ingredient = unpack_ingredient(reader.get_u32()?)?;
            let count = reader.get_u32()?;
            stock.push((ingredient, count));
        }
        Ok(Self {
            kitchen_id,
            busy_cooks,
            total_cooks,
            pending_pizzas,
            stock,
        })
    }
}

impl PizzaRecord {
    /// Pack as `u32 type, u32 size, u32 orderId, u32 kitchenId`.
    #[must_use]
    pub fn pack(&self) -> Packet {
        let mut packet = Packet::new();
        packet.put_u32(self.pizza_type as u32);
        packet.put_u32(self.size as u32);
        packet.put_u32(self.order_id);
        packet.put_u32(self.kitchen_id);
        packet
    }

    /// Unpack from a packed payload.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer or out-of-range enum values.
    pub fn unpack(packet: &Packet) -> Result<Self, CodecError> {
        let mut reader = packet.reader();
        let pizza_type = unpack_pizza_type(reader.get_u32()?)?;
        let size = unpack_size(reader.get_u32()?)?;
        let order_id = reader.get_u32()?;
        let kitchen_id = reader.get_u32()?;
        Ok(Self {
            pizza_type,
            size,
            order_id,
            kitchen_id,
        })
    }
}

impl PizzaCompletion {
    /// Pack as the blob-embedded pizza record followed by `u64` nanoseconds.
    #[must_use]
    pub fn pack(&self) -> Packet {
        let mut packet = Packet::new();
        packet.put_blob(self.pizza.pack().as_bytes());
        packet.put_u64(self.completed_at_nanos);
        packet
    }

    /// Unpack from a packed payload.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer or a malformed inner record.
    pub fn unpack(packet: &Packet) -> Result<Self, CodecError> {
        let mut reader = packet.reader();
        let inner = Packet::from_bytes(reader.get_blob()?);
        let pizza = PizzaRecord::unpack(&inner)?;
        let completed_at_nanos = reader.get_u64()?;
        Ok(Self {
            pizza,
            completed_at_nanos,
        })
    }
}

fn unpack_pizza_type(value: u32) -> Result<PizzaType, CodecError> {
    PizzaType::from_wire(value).ok_or(CodecError::InvalidEnum {
        field: "pizza type",
        value,
    })
}

fn unpack_size(value: u32) -> Result<PizzaSize, CodecError> {
    PizzaSize::from_wire(value).ok_or(CodecError::InvalidEnum {
        field: "pizza size",
        value,
    })
}

fn unpack_ingredient(value: u32) -> Result<Ingredient, CodecError> {
    Ingredient::from_wire(value).ok_or(CodecError::InvalidEnum {
        field: "ingredient",
        value,
    })
}
