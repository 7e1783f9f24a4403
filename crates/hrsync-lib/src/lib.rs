pub mod config;
pub mod error;
pub mod evaluation;
pub mod filters;
pub mod heartrate;
pub mod io;
pub mod signal;
pub mod sync;

pub use config::*;
pub use error::{Error, Result};
pub use evaluation::*;
pub use filters::*;
pub use heartrate::*;
pub use signal::*;
pub use sync::*;
