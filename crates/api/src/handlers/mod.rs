pub mod captions;
pub mod health;
pub mod images;
pub mod render;
pub mod script;
pub mod speech;
pub mod webhook;
