use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::buffer::DataBuffer;
use crate::columns::PaxColumns;
use crate::format::{
    decode_message, decode_trailer, FileFooter, PostScript, StripeFooter, StripeInformation, TRAILER_LEN,
};
use crate::ioutil::{read_vec, File, FileSystem};
use crate::nonfixed::decode_toast_ref;
use crate::options::ReaderOptions;
use crate::stats::ColumnStatistics;
use crate::types::{ColumnDesc, Datum};
use pax_base::{err, schema_err, Result};

/// One decoded stripe.
#[derive(Debug)]
pub struct OrcGroup {
    index: usize,
    row_offset: u64,
    schema: Vec<ColumnDesc>,
    columns: PaxColumns,
    // Out-of-line values by column, then row.
    toasted: Vec<BTreeMap<usize, Vec<u8>>>,
    stats: Vec<ColumnStatistics>,
    cursor: usize,
}

impl OrcGroup {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rows(&self) -> usize {
        self.columns.rows()
    }

    /// File row number of the group's first row.
    pub fn row_offset(&self) -> u64 {
        self.row_offset
    }

    pub fn columns(&self) -> &PaxColumns {
        &self.columns
    }

    pub fn stats(&self) -> &[ColumnStatistics] {
        &self.stats
    }

    pub fn get_value(&self, col: usize, row: usize) -> Result<Datum<'_>> {
        let Some(desc) = self.schema.get(col) else {
            return Err(schema_err(format!("no column {col} among {}", self.schema.len())));
        };
        if let Some(bytes) = self.toasted.get(col).and_then(|t| t.get(&row)) {
            return Datum::from_column_bytes(desc.kind, bytes);
        }
        match self.columns.column(col)?.value(row)? {
            None => Ok(Datum::Null),
            Some(bytes) => Datum::from_column_bytes(desc.kind, bytes),
        }
    }

    pub fn get_tuple(&self, row: usize) -> Result<Vec<Datum<'_>>> {
        (0..self.schema.len()).map(|col| self.get_value(col, row)).collect()
    }

    /// Next row of the group, in order.
    pub fn read_tuple(&mut self) -> Result<Option<Vec<Datum<'static>>>> {
        if self.cursor >= self.rows() {
            return Ok(None);
        }
        let row = self.cursor;
        self.cursor += 1;
        Ok(Some(owned(self.get_tuple(row)?)))
    }
}

/// Decodes one stripe's bytes: its data section, then its footer.
pub(crate) fn decode_stripe_bytes(footer: &FileFooter, info: &StripeInformation, stripe: &[u8]) -> Result<PaxColumns> {
    let data_len = usize::try_from(info.data_length).ok().filter(|n| *n <= stripe.len());
    let Some(data_len) = data_len else {
        return Err(err(format!(
            "stripe data length {} exceeds the {}-byte stripe",
            info.data_length,
            stripe.len()
        )));
    };
    let (data, footer_bytes) = stripe.split_at(data_len);
    let stripe_footer: StripeFooter = decode_message(footer_bytes)?;
    PaxColumns::decode_stripe(
        &footer.schema,
        footer.storage_format,
        &stripe_footer,
        info.number_of_rows as usize,
        data,
    )
}

fn owned(tuple: Vec<Datum<'_>>) -> Vec<Datum<'static>> {
    tuple.into_iter().map(Datum::into_owned).collect()
}

pub struct OrcReader {
    path: PathBuf,
    file: Option<Box<dyn File>>,
    toast_file: Option<Box<dyn File>>,
    footer: FileFooter,
    // First file row of each group, plus the total.
    group_starts: Vec<u64>,
    options: ReaderOptions,
    current: Option<OrcGroup>,
    next_group: usize,
    random: Option<OrcGroup>,
}

impl OrcReader {
    pub fn open(fs: &dyn FileSystem, path: &Path, options: ReaderOptions) -> Result<Self> {
        let mut file = fs.open(path)?;
        let len = file.len()?;
        if len < TRAILER_LEN as u64 {
            return Err(err(format!("{} is too short to be a micro-partition", path.display())));
        }
        let ps_len = decode_trailer(&read_vec(file.as_mut(), len - TRAILER_LEN as u64, TRAILER_LEN)?)?;
        let Some(ps_start) = (len - TRAILER_LEN as u64).checked_sub(ps_len) else {
            return Err(err("postscript length exceeds file"));
        };
        let postscript: PostScript = decode_message(&read_vec(file.as_mut(), ps_start, ps_len as usize)?)?;
        postscript.check()?;
        let Some(footer_start) = ps_start.checked_sub(postscript.footer_length) else {
            return Err(err("footer length exceeds file"));
        };
        let footer: FileFooter =
            decode_message(&read_vec(file.as_mut(), footer_start, postscript.footer_length as usize)?)?;
        if footer.content_length != footer_start {
            return Err(err("footer does not follow the stripes"));
        }
        if let Some(schema) = &options.schema {
            if *schema != footer.schema {
                return Err(schema_err(format!(
                    "expected {} columns {:?}, file has {:?}",
                    schema.len(),
                    schema.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    footer.schema.iter().map(|c| &c.name).collect::<Vec<_>>()
                )));
            }
        }
        let mut group_starts = Vec::with_capacity(footer.stripes.len() + 1);
        let mut total = 0;
        for s in &footer.stripes {
            group_starts.push(total);
            total += s.number_of_rows;
        }
        group_starts.push(total);
        if total != footer.number_of_rows {
            return Err(err("stripe row counts disagree with the file's"));
        }

        let mut toast_name = path.as_os_str().to_owned();
        toast_name.push(".toast");
        let toast_name = PathBuf::from(toast_name);
        let toast_file = if fs.exists(&toast_name) {
            Some(fs.open(&toast_name)?)
        } else {
            None
        };
        debug!(
            target: "pax",
            "opened {}: {} rows in {} groups",
            path.display(),
            footer.number_of_rows,
            footer.stripes.len()
        );
        Ok(OrcReader {
            path: path.to_owned(),
            file: Some(file),
            toast_file,
            footer,
            group_starts,
            options,
            current: None,
            next_group: 0,
            random: None,
        })
    }

    pub fn schema(&self) -> &[ColumnDesc] {
        &self.footer.schema
    }

    pub fn footer(&self) -> &FileFooter {
        &self.footer
    }

    pub fn number_of_rows(&self) -> u64 {
        self.footer.number_of_rows
    }

    pub fn file_stats(&self) -> &[ColumnStatistics] {
        &self.footer.column_stats
    }

    pub fn group_count(&self) -> usize {
        self.footer.stripes.len()
    }

    fn check_group(&self, index: usize) -> Result<()> {
        if index >= self.group_count() {
            return Err(err(format!("group {index} out of {}", self.group_count())));
        }
        Ok(())
    }

    pub fn group_rows(&self, index: usize) -> Result<usize> {
        self.check_group(index)?;
        Ok(self.footer.stripes[index].number_of_rows as usize)
    }

    pub fn group_stats(&self, index: usize) -> Result<&[ColumnStatistics]> {
        self.check_group(index)?;
        Ok(&self.footer.stripes[index].column_stats)
    }

    /// Hands the stripe scratch buffer back to the caller.
    pub fn take_reused_buffer(&mut self) -> Option<DataBuffer<'static>> {
        self.options.reused_buffer.take()
    }

    pub fn read_group(&mut self, index: usize) -> Result<OrcGroup> {
        self.check_group(index)?;
        let info = &self.footer.stripes[index];
        let Some(file) = &mut self.file else {
            return Err(err(format!("reader for {} is closed", self.path.display())));
        };
        let end = info
            .data_length
            .checked_add(info.footer_length)
            .and_then(|n| info.offset.checked_add(n))
            .filter(|end| *end <= self.footer.content_length);
        let Some(end) = end else {
            return Err(err(format!("group {index} extends past the stripe section")));
        };
        let len = (end - info.offset) as usize;
        let mut buf = self.options.reused_buffer.take().unwrap_or_else(|| DataBuffer::new(len));
        buf.clear();
        buf.reserve(len);
        let columns = file
            .read_at(&mut buf.spare_mut()[..len], info.offset)
            .and_then(|()| buf.brush(len))
            .and_then(|()| decode_stripe_bytes(&self.footer, info, buf.as_slice()));
        // The scratch buffer survives a failed decode.
        self.options.reused_buffer = Some(buf);
        let columns = columns?;

        let mut toasted = vec![BTreeMap::new(); columns.len()];
        for (c, out) in toasted.iter_mut().enumerate() {
            let col = columns.column(c)?;
            let Some(rows) = col.toast_rows() else {
                continue;
            };
            let Some(toast_file) = &mut self.toast_file else {
                return Err(err("group has out-of-line values but the toast file is missing"));
            };
            let base = info.toast_base(c);
            for row in rows.iter_ones() {
                let Some(r) = col.value(row)? else {
                    return Err(err("null row marked as out-of-line"));
                };
                let (off, len) = decode_toast_ref(r)?;
                out.insert(row, read_vec(toast_file.as_mut(), base + off, len as usize)?);
            }
        }
        Ok(OrcGroup {
            index,
            row_offset: self.group_starts[index],
            schema: self.footer.schema.clone(),
            columns,
            toasted,
            stats: info.column_stats.clone(),
            cursor: 0,
        })
    }

    fn deleted(&self, row: u64) -> bool {
        self.options
            .visibility_map
            .as_ref()
            .is_some_and(|vm| vm.get(row as usize))
    }

    /// Next visible row, skipping groups the filter rejects.
    pub fn read_tuple(&mut self) -> Result<Option<Vec<Datum<'static>>>> {
        loop {
            if let Some(group) = &mut self.current {
                if group.cursor < group.rows() {
                    let row = group.cursor;
                    group.cursor += 1;
                    let global = group.row_offset + row as u64;
                    if self.deleted(global) {
                        continue;
                    }
                    if let Some(group) = &self.current {
                        return Ok(Some(owned(group.get_tuple(row)?)));
                    }
                }
                self.current = None;
            }
            let index = self.next_group;
            if index >= self.group_count() {
                return Ok(None);
            }
            self.next_group += 1;
            if let Some(filter) = &self.options.filter {
                if !filter.keep(index, &self.footer.stripes[index].column_stats) {
                    debug!(target: "pax", "group {} of {} skipped by filter", index, self.path.display());
                    continue;
                }
            }
            self.current = Some(self.read_group(index)?);
        }
    }

    /// Row `row` of the file; `None` if the visibility map deletes it.
    pub fn get_tuple(&mut self, row: u64) -> Result<Option<Vec<Datum<'static>>>> {
        if row >= self.footer.number_of_rows {
            return Err(err(format!("row {row} out of {}", self.footer.number_of_rows)));
        }
        if self.deleted(row) {
            return Ok(None);
        }
        let index = self.group_starts.partition_point(|s| *s <= row) - 1;
        if self.random.as_ref().map(|g| g.index) != Some(index) {
            self.random = Some(self.read_group(index)?);
        }
        let Some(group) = &self.random else {
            return Err(err("group cache empty"));
        };
        let local = (row - group.row_offset) as usize;
        Ok(Some(owned(group.get_tuple(local)?)))
    }

    /// Releases the files. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.file = None;
        self.toast_file = None;
        self.current = None;
        self.random = None;
        Ok(())
    }
}
