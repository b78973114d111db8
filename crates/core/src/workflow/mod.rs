pub mod engine;
pub mod states;

pub use engine::{SupportTurnFlow, TurnDefinition, TurnEngine, TurnTransitionError};
pub use states::{Route, TurnEvent, TurnPhase, TurnTransition};
