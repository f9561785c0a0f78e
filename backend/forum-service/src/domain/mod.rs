pub mod content;
pub mod identity;
pub mod inputs;
pub mod models;
pub mod moderation;
pub mod vote;

pub use content::{Moderated, Rankable, Votable};
pub use identity::Viewer;
pub use inputs::*;
pub use models::*;
pub use moderation::*;
pub use vote::*;
