//! Subscription plans, the Crypto Pay client and the invoice webhook.

pub mod cryptobot;
pub mod plans;
pub mod webhook;

pub use plans::{Plan, PriceList, Term};
pub use webhook::PaymentEvent;
