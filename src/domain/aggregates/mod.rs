//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Decrement, Product, ProductError, Translations};
pub use order::{LineItem, LineItems, Order, OrderError, OrderStatus, PaymentMethod};
pub use cart::{Cart, CartError, CartItem};
