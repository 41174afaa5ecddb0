//! Conversion stage: file references in, structured deduplicated records out.

mod stage;
pub mod types;

pub use stage::ConversionStage;
pub use types::{
    ConversionOutcome, ConvertError, FileItem, MERGE_KEY_FIELD, StructuredRecord, TableContract,
    WriteDisposition, compute_data_hash,
};
