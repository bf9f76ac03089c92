use crate::{compress_err, err, schema_err, ErrorKind, Result};
use test_log::test;

mod bitmap;

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), ErrorKind::Logic);
}

#[test]
fn test_error_kinds() {
    assert!(schema_err("2 columns vs 3 attributes").is_schema());
    let e = compress_err("zstd", "decompress", "Unknown frame descriptor");
    assert!(e.is_compression());
    assert!(e.to_string().contains("zstd decompress failed"));
}

#[test]
fn test_foreign_error_is_io() {
    fn open_missing() -> Result<std::fs::File> {
        Ok(std::fs::File::open("/nonexistent/pax/file")?)
    }
    let e = open_missing().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Io);
}
