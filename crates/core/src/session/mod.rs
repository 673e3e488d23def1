//! Session state and single-flight refresh

pub mod single_flight;
pub mod state;

pub use single_flight::SingleFlight;
pub use state::SessionStateMachine;
