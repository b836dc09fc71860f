//! Source converters for kiln.
//!
//! Each converter maps one source file to one or more files in the output
//! tree. Converters report failures as [`ConvertError`] values; deciding
//! whether a failure stops anything is left to the caller.

pub mod copy;
pub mod images;
pub mod output;
pub mod script;
pub mod style;
pub mod template;
pub mod traits;

pub use copy::CopyConverter;
pub use images::ImageConverter;
pub use output::write_output;
pub use script::ScriptConverter;
pub use style::{StyleConverter, StyleTargets};
pub use template::TemplateConverter;
pub use traits::{ConvertError, ConvertInput, Converter};
