pub mod ai;
pub mod booking;
pub mod cache;
pub mod catalog;
pub mod conversation;
pub mod dates;
pub mod merger;
pub mod sessions;
pub mod template;
pub mod text;
pub mod validators;
