//! Payment Intent Manager.
//!
//! Creates gateway-side payment intents for order attempts and verifies the
//! gateway's signed completion callbacks exactly once.

pub mod error;
pub mod gateway;
pub mod intent;
pub mod manager;
pub mod signature;
pub mod store;

pub use error::{GatewayError, IntentStoreError, PaymentError};
pub use gateway::{
    GatewayOrder, InMemoryPaymentGateway, PaymentGateway, RAZORPAY_API_BASE, RazorpayGateway,
};
pub use intent::{GatewayCallback, IntentStatus, PaymentIntent, VerifiedPayment};
pub use manager::PaymentIntentManager;
pub use store::{InMemoryIntentStore, IntentStore, PostgresIntentStore};
