pub mod prelude;
pub mod error;
pub mod config;
pub mod device;
pub mod scene;
pub mod instance;
pub mod dispatch;
pub mod renderer;
