// Byte-range map of a written file, for diagnostics.

use std::fmt::Write;
use std::ops::Range;
use std::path::Path;

use crate::format::{decode_message, decode_trailer, StreamKind, StripeFooter, TRAILER_LEN};
use crate::ioutil::{read_vec, FileSystem};
use crate::options::ReaderOptions;
use crate::reader::OrcReader;
use pax_base::{err, Result};

/// Named byte ranges, each name qualified by the context active when it
/// was added.
#[derive(Clone, Debug, Default)]
pub struct Annotations {
    context: Vec<String>,
    pub ranges: Vec<(Range<u64>, String)>,
}

impl Annotations {
    pub fn new() -> Self {
        Annotations::default()
    }

    pub fn push_context<T: ToString>(&mut self, context: T) {
        self.context.push(context.to_string());
    }

    pub fn pop_context(&mut self) {
        self.context.pop();
    }

    pub fn annotate<T: ToString>(&mut self, range: Range<u64>, name: T) {
        let mut ctx = self.context.clone();
        ctx.push(name.to_string());
        self.ranges.push((range, ctx.join(".")));
    }

    /// Hexdump of `buf` split by annotation, flagging gaps and overlaps.
    pub fn render_hexdump(&self, buf: &[u8]) -> Result<String> {
        const REPEATS_SHOWN: usize = 1;
        let mut s = String::new();
        let mut pos = 0u64;
        for (r, name) in &self.ranges {
            if r.is_empty() {
                continue;
            }
            if r.start < pos {
                writeln!(s, "- ERROR: {name} overlaps previous range")?;
            }
            if r.start > pos {
                writeln!(s, "- ERROR: unannotated ({} bytes)", r.start - pos)?;
            }
            pos = r.end;
            writeln!(s, "- {} ({} bytes):", name, r.end - r.start)?;
            let Some(bytes) = buf.get(r.start as usize..r.end as usize) else {
                writeln!(s, "- ERROR: {name} past end of buffer")?;
                continue;
            };
            let mut prev: &[u8] = &[];
            let mut repeated = 0;
            for (n, line) in bytes.chunks(16).enumerate() {
                let at = r.start as usize + n * 16;
                if line.len() == 16 && line == prev {
                    repeated += 1;
                    if repeated > REPEATS_SHOWN {
                        continue;
                    }
                } else if repeated > REPEATS_SHOWN {
                    writeln!(s, "\t {:08x} | ... previous line repeated {} times", at, repeated - REPEATS_SHOWN)?;
                    repeated = 0;
                } else {
                    repeated = 0;
                }
                prev = line;
                write!(s, "\t {at:08x} |")?;
                for group in line.chunks(4) {
                    s += "  ";
                    for byte in group {
                        write!(s, " {byte:02x}")?;
                    }
                }
                for pad in 0..(16 - line.len()) {
                    s += "   ";
                    if pad & 3 == 3 {
                        s += "  ";
                    }
                }
                s += "   | ";
                s.extend(line.iter().map(|c| if c.is_ascii_graphic() { *c as char } else { '.' }));
                s += "\n";
            }
            if repeated > REPEATS_SHOWN {
                writeln!(s, "\t {:08x} | ... previous line repeated {} times", r.end, repeated - REPEATS_SHOWN)?;
            }
        }
        Ok(s)
    }
}

fn stream_name(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Present => "present",
        StreamKind::Data => "data",
        StreamKind::Offset => "offsets",
        StreamKind::Toast => "toast",
    }
}

/// Every byte range of the file at `path`, in file order.
pub fn describe_layout(fs: &dyn FileSystem, path: &Path) -> Result<Annotations> {
    let reader = OrcReader::open(fs, path, ReaderOptions::default())?;
    let footer = reader.footer().clone();
    let mut file = fs.open(path)?;
    let len = file.len()?;
    let mut ann = Annotations::new();
    for (i, info) in footer.stripes.iter().enumerate() {
        ann.push_context("stripe");
        ann.push_context(i);
        let end = info.offset + info.data_length;
        let stripe_footer: StripeFooter = decode_message(&read_vec(file.as_mut(), end, info.footer_length as usize)?)?;
        let mut pos = info.offset;
        for s in &stripe_footer.streams {
            if s.padding > 0 {
                ann.annotate(pos..pos + s.padding as u64, "padding");
            }
            pos += s.padding as u64;
            ann.annotate(pos..pos + s.length, format!("column.{}.{}", s.column, stream_name(s.kind)));
            pos += s.length;
        }
        if pos != end {
            return Err(err(format!("stripe {i} streams end at {pos}, data ends at {end}")));
        }
        ann.annotate(end..end + info.footer_length, "footer");
        ann.pop_context();
        ann.pop_context();
    }
    let trailer = len - TRAILER_LEN as u64;
    let ps_len = decode_trailer(&read_vec(file.as_mut(), trailer, TRAILER_LEN)?)?;
    let ps_start = trailer - ps_len;
    ann.annotate(footer.content_length..ps_start, "file_footer");
    ann.annotate(ps_start..trailer, "postscript");
    ann.annotate(trailer..len, "trailer");
    Ok(ann)
}
