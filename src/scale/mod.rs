pub mod fusion;
pub mod ocr;

pub use fusion::{ReadingSource, ScaleReading};
pub use ocr::{DigitReader, DigitReading};
