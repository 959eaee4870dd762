pub mod decoder;
pub mod types;
pub mod utils;

pub use decoder::WorkbookDecoder;
pub use types::DecodedWorkbook;
