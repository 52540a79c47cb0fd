//! HTTP request handlers.

pub mod health;
pub mod stream;
pub mod uploads;

pub use health::*;
pub use stream::*;
pub use uploads::*;
