//! Order model: pizza types, sizes, and ingredients.
//!
//! Each pizza type carries a fixed ingredient set and a base cooking time in
//! seconds. Enum discriminants are the wire values packed into message
//! payloads and must not change.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// The four pizzas on the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PizzaType {
    Regina = 1,
    Margarita = 2,
    Americana = 4,
    Fantasia = 8,
}

/// Pizza sizes. Size is carried through the pipeline for reporting; it does
/// not affect cooking time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PizzaSize {
    S = 1,
    M = 2,
    L = 4,
    XL = 8,
    XXL = 16,
}

/// Everything a kitchen can hold in stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Ingredient {
    Dough = 0,
    Tomato = 1,
    Gruyere = 2,
    Ham = 3,
    Mushrooms = 4,
    Steak = 5,
    Eggplant = 6,
    GoatCheese = 7,
    ChiefLove = 8,
}

/// A single pizza travelling through a kitchen, tagged with the reception's
/// order id so its completion can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pizza {
    /// What to cook.
    pub pizza_type: PizzaType,
    /// How big.
    pub size: PizzaSize,
    /// Reception-assigned order id.
    pub order_id: u32,
}

/// Lookup failure when parsing a pizza type or size from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidName {
    /// The string names no known pizza type.
    #[error("unknown pizza type: {0:?}")]
    Type(String),

    /// The string names no known pizza size.
    #[error("unknown pizza size: {0:?}")]
    Size(String),
}

impl PizzaType {
    /// Ingredients consumed from stock when this pizza is dispatched.
    #[must_use]
    pub const fn ingredients(self) -> &'static [Ingredient] {
        use Ingredient::{
            ChiefLove, Dough, Eggplant, GoatCheese, Gruyere, Ham, Mushrooms, Steak, Tomato,
        };
        match self {
            Self::Margarita => &[Dough, Tomato, Gruyere],
            Self::Regina => &[Dough, Tomato, Gruyere, Ham, Mushrooms],
            Self::Americana => &[Dough, Tomato, Gruyere, Steak],
            Self::Fantasia => &[Dough, Tomato, Eggplant, GoatCheese, ChiefLove],
        }
    }

    /// Base cooking time in seconds, before the multiplier is applied.
    #[must_use]
    pub const fn base_cooking_secs(self) -> u64 {
        match self {
            Self::Margarita => 1,
            Self::Regina | Self::Americana => 2,
            Self::Fantasia => 4,
        }
    }

    /// Effective cooking time once the simulation multiplier is applied.
    #[must_use]
    pub fn cooking_time(self, multiplier: f64) -> Duration {
        Duration::from_secs_f64(self.base_cooking_secs() as f64 * multiplier)
    }

    /// Decode a wire value, if it names a pizza type.
    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Regina),
            2 => Some(Self::Margarita),
            4 => Some(Self::Americana),
            8 => Some(Self::Fantasia),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regina => "regina",
            Self::Margarita => "margarita",
            Self::Americana => "americana",
            Self::Fantasia => "fantasia",
        }
    }
}

impl fmt::Display for PizzaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PizzaType {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regina" => Ok(Self::Regina),
            "margarita" => Ok(Self::Margarita),
            "americana" => Ok(Self::Americana),
            "fantasia" => Ok(Self::Fantasia),
            _ => Err(InvalidName::Type(s.to_string())),
        }
    }
}

impl PizzaSize {
    /// Decode a wire value, if it names a size.
    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::S),
            2 => Some(Self::M),
            4 => Some(Self::L),
            8 => Some(Self::XL),
            16 => Some(Self::XXL),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::XL => "XL",
            Self::XXL => "XXL",
        }
    }
}

impl fmt::Display for PizzaSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PizzaSize {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::XL),
            "XXL" => Ok(Self::XXL),
            _ => Err(InvalidName::Size(s.to_string())),
        }
    }
}

impl Ingredient {
    /// Every ingredient, in wire-value order.
    pub const ALL: [Self; 9] = [
        Self::Dough,
        Self::Tomato,
        Self::Gruyere,
        Self::Ham,
        Self::Mushrooms,
        Self::Steak,
        Self::Eggplant,
        Self::GoatCheese,
        Self::ChiefLove,
    ];

    /// Decode a wire value, if it names an ingredient.
    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Dough),
            1 => Some(Self::Tomato),
            2 => Some(Self::Gruyere),
            3 => Some(Self::Ham),
            4 => Some(Self::Mushrooms),
            5 => Some(Self::Steak),
            6 => Some(Self::Eggplant),
            7 => Some(Self::GoatCheese),
            8 => Some(Self::ChiefLove),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dough => "dough",
            Self::Tomato => "tomato",
            Self::Gruyere => "gruyere",
            Self::Ham => "ham",
            Self::Mushrooms => "mushrooms",
            Self::Steak => "steak",
            Self::Eggplant => "eggplant",
            Self::GoatCheese => "goat cheese",
            Self::ChiefLove => "chief love",
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Pizza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pizza_type, self.size)
    }
}
