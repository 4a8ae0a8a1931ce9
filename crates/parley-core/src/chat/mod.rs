mod engine;

pub use engine::{ChatEngine, ChatEvent};
