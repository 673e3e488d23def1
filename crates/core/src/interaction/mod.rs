//! Platform interaction ports and the pending-interaction registry

pub mod ports;
pub mod registry;

pub use ports::{BiometricPrompt, UiPresenter};
pub use registry::{ChannelPresenter, InteractionRegistry, PendingInteraction};
