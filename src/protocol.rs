//! Remote-debugging protocol seam
//!
//! Typed commands and notifications, the transport traits the core talks
//! through, and the `chromiumoxide` adapter used in production.

mod chromium;
mod console_text;
mod sequencer;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use chromium::ChromiumConnector;
pub use traits::*;
pub use types::*;
