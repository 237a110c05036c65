pub mod cache;
pub mod listener;
pub mod observers;
pub mod push;
