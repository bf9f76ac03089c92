mod bitmap;
mod error;

#[cfg(test)]
mod test;

pub use bitmap::Bitmap;
pub use error::{compress_err, err, io_err, schema_err, Error, ErrorKind, Result};
