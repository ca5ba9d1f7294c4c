pub mod auth;
#[cfg(test)]
pub mod fake;
pub mod gateway;

pub use gateway::{CalendarGateway, GatewayError, HttpCalendarGateway};
