//! Domain layer of the checkout core.
//!
//! - [`CartSnapshot`]: the immutable cart a checkout starts from
//! - [`Order`]: the event-sourced attempt/order aggregate and its status machine
//! - [`CommandHandler`]: optimistic append with re-decision on conflicts
//! - [`OrderService`]: the single writer of order transitions

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod error;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{CartError, CartSnapshot, PriceTolerance};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    AdvanceFulfilment, AwaitPayment, CancelOrder, ConfirmPayment, CustomerId, FailPayment,
    InitiateAttempt, LineItem, MarkReserved, Money, Order, OrderError, OrderEvent, OrderNumber,
    OrderService, OrderStatus, ProductId, ShippingAddress, Size, StatusEntry, StockKey,
};
