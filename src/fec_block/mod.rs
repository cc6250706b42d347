//! FEC block writer/reader pair.

pub mod reader;
pub mod writer;

pub use reader::FecBlockReader;
pub use writer::FecBlockWriter;
