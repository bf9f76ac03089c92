use test_log::test;

use crate::buffer::DataBuffer;
use crate::Result;

mod codec;
mod column;
mod layout;
mod rle;

#[test]
fn test_buffer_cursors() -> Result<()> {
    let mut buf = DataBuffer::new(8);
    buf.write(b"abcd")?;
    assert_eq!(buf.used(), 0);
    buf.brush(4)?;
    assert_eq!(buf.as_slice(), b"abcd");
    buf.brush_treated(3)?;
    assert_eq!(buf.untreated_slice(), b"d");
    assert!(buf.brush_treated(2).is_err());
    assert!(buf.brush(5).is_err());
    buf.resize(16)?;
    assert_eq!((buf.used(), buf.treated(), buf.capacity()), (4, 3, 16));
    assert!(buf.resize(2).is_err());
    buf.append(&[0xff; 20]);
    assert_eq!(buf.used(), 24);
    assert_eq!(&buf.as_slice()[..4], b"abcd");
    Ok(())
}

#[test]
fn test_buffer_borrowed_view() -> Result<()> {
    let bytes = [1u8, 2, 3];
    let mut buf = DataBuffer::wrap(&bytes);
    assert!(!buf.is_mem_taken_over());
    assert_eq!(buf.as_slice(), &bytes);
    assert!(buf.write(&[4]).is_err());
    buf.append(&[4]);
    assert!(buf.is_mem_taken_over());
    assert_eq!(buf.into_vec(), vec![1, 2, 3, 4]);
    assert_eq!(bytes, [1, 2, 3]);
    Ok(())
}
