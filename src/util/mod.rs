pub use enums::*;
pub use names::*;
pub use result::*;

pub use crate::astro_math::{Degrees, Hours};

mod enums;
mod names;
mod result;
