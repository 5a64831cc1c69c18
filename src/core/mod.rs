pub mod app;
pub mod background;
pub mod config;
pub mod dispatcher;
pub mod ids;
pub mod keyring;
pub mod message;
pub mod model_token;
pub mod settings;
pub mod space;
pub mod store;
