//! Domain models for stored accounts and messages

mod account;
mod received_email;

pub use account::Account;
pub use received_email::{NewReceivedEmail, ReceivedEmail};
