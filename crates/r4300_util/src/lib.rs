pub mod bit;
pub mod ext;

pub use bit::{Bit, BitSet};
pub use ext::SignExtend;
