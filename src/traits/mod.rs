pub mod stage;

pub use stage::{Effect, Predicate, Transform};
