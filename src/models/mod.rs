pub mod engine;
pub mod game;
pub mod process;

pub use engine::EngineClient;
pub use game::{GameSession, MoveRecord};
pub use process::{EngineProcess, EngineSettings, EngineState};
