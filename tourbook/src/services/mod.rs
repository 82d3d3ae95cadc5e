//! Outbound integrations: email delivery and the payment provider

pub mod email;
pub mod payments;

pub use email::{Email, LogMailer, Mailer};
pub use payments::{CheckoutRequest, CheckoutSession, PaymentGateway, StripeGateway};
