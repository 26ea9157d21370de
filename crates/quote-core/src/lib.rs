pub mod error;
pub mod kind;
pub mod traits;
pub mod types;

pub use error::*;
pub use kind::*;
pub use traits::*;
pub use types::*;
