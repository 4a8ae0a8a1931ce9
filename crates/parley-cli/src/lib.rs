//! Terminal front end for parley: slash-command parsing, rendering and the
//! interactive chat loop.

pub mod app;
pub mod clipboard;
pub mod commands;
pub mod health;
pub mod render;
pub mod theme;

pub use app::{build_engine, App, Flow, StartOptions};
pub use commands::{parse_command, Command};
pub use theme::Theme;
