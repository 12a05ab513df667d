//! Provider adapters: one module per external messaging provider, plus the
//! helpers they share.

pub mod bongolive;
pub mod burstsms;
pub mod playmobile;
pub mod util;

#[cfg(test)]
mod testing;

use herald_core::handler::HandlerRegistry;

pub use {
    bongolive::BongoLiveHandler, burstsms::BurstSmsHandler, playmobile::PlayMobileHandler,
};

/// Register every shipped handler with production endpoints.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(std::sync::Arc::new(BurstSmsHandler::new()));
    registry.register(std::sync::Arc::new(BongoLiveHandler::new()));
    registry.register(std::sync::Arc::new(PlayMobileHandler::new()));
}
