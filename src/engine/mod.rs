mod producer;
mod state;
mod stream;
mod worker;

pub mod stages;
#[cfg(test)]
mod integration_tests;

pub use producer::{Input, Producer, Written};
pub use stages::Stage;
pub use state::Phase;
pub use stream::{Stream, StreamStats};
