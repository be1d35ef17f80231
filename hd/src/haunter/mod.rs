//! Haunter state machine, personas and the manager that hosts them

mod machine;
mod manager;
mod persona;

#[cfg(test)]
pub(crate) mod harness;

pub use machine::Haunter;
pub use manager::{Collaborators, HauntManager};
pub use persona::Persona;
