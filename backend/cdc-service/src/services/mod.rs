pub mod broker;
pub mod change_streams;
pub mod listeners;
pub mod notifications;
pub mod publisher;
