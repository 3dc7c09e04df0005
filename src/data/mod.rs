//! Data model and alignment of measurement tables with sample metadata.

pub mod align;
pub mod table;

pub use align::align;
pub use table::{sanitize_name, MeasurementTable, Metadata, MissingValuePolicy, SampleTable, Variable};
