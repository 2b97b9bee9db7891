//! # aura-services
//!
//! The console, file, and time system services. Each one is an ordinary
//! subscriber: it joins the bus as a Global-scope agent filtered to its own
//! `system.*` topics and answers with `.success`/`.error` follow-up events.

pub mod console;
pub mod file;
pub mod time;

pub use console::ConsoleService;
pub use file::FileService;
pub use time::TimeService;
