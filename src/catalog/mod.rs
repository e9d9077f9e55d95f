//! Catalog navigation: anime → season → dub → episode.

pub mod deep_link;
pub mod description;
pub mod pages;
pub mod season;
pub mod token;

pub use season::Season;
pub use token::{Callback, node_key};
