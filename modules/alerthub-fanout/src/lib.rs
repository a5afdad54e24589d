//! Fan-out service: consumes published alerts, resolves who should hear
//! about them, and hands notifications to the external provider.

pub mod clients;
pub mod dispatch;
pub mod handler;
pub mod resolver;
pub mod rest;

pub use dispatch::{Dispatcher, Notifier};
pub use handler::FanoutHandler;
pub use resolver::{DirectoryApi, OnCallApi, Resolver};
