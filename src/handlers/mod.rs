pub mod ai_booking;
pub mod chat;
pub mod health;
