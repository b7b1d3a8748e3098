pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod highlight;
pub mod layout;
pub mod session;
pub mod style;
pub mod util;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use session::GraphSession;
