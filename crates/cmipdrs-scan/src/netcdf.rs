//! Reader for netCDF classic (CDF-1) and 64-bit offset (CDF-2) files.
//!
//! Only what the scan needs is decoded: global attributes and the first and
//! last values of the time coordinate. Variable data is never loaded beyond
//! those two values.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use cmipdrs_core::{FileFix, TimeRange};

use crate::calendar::{Calendar, TimeUnits};
use crate::date::AttributeSource;
use crate::error::ReadError;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;
const STREAMING: u32 = 0xFFFF_FFFF;

const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

/// First header read; grown until the header parses.
const INITIAL_HEADER_READ: u64 = 64 * 1024;
const MAX_HEADER_READ: u64 = 64 * 1024 * 1024;

/// A global or variable attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Numeric(Vec<f64>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Numeric(_) => None,
        }
    }

    /// Value as a display string; single numbers keep a decimal point.
    pub fn render(&self) -> String {
        match self {
            AttributeValue::Text(s) => s.clone(),
            AttributeValue::Numeric(values) => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| {
                        if v.fract() == 0.0 && v.is_finite() {
                            format!("{v:.1}")
                        } else {
                            v.to_string()
                        }
                    })
                    .collect();
                parts.join(" ")
            }
        }
    }
}

/// What the scan needs from one data file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetMetadata {
    pub attributes: BTreeMap<String, AttributeValue>,
    pub time_range: Option<TimeRange>,
}

impl DatasetMetadata {
    /// The `cmor_version` global attribute, if present.
    pub fn tool_version(&self) -> Option<String> {
        self.attributes.get("cmor_version").map(AttributeValue::render)
    }
}

impl AttributeSource for DatasetMetadata {
    fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_text)
    }
}

/// Opens a data file and extracts its metadata.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path, fix: Option<&FileFix>) -> Result<DatasetMetadata, ReadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
}

impl NcType {
    fn from_code(code: u32) -> Result<Self, ReadError> {
        match code {
            1 => Ok(NcType::Byte),
            2 => Ok(NcType::Char),
            3 => Ok(NcType::Short),
            4 => Ok(NcType::Int),
            5 => Ok(NcType::Float),
            6 => Ok(NcType::Double),
            other => Err(ReadError::malformed(format!("unknown nc_type {other}"))),
        }
    }

    fn size(self) -> u64 {
        match self {
            NcType::Byte | NcType::Char => 1,
            NcType::Short => 2,
            NcType::Int | NcType::Float => 4,
            NcType::Double => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<f64> {
        Some(match self {
            NcType::Byte => bytes[0] as i8 as f64,
            NcType::Char => return None,
            NcType::Short => i16::from_be_bytes(bytes.try_into().ok()?) as f64,
            NcType::Int => i32::from_be_bytes(bytes.try_into().ok()?) as f64,
            NcType::Float => f32::from_be_bytes(bytes.try_into().ok()?) as f64,
            NcType::Double => f64::from_be_bytes(bytes.try_into().ok()?),
        })
    }
}

#[derive(Debug, Clone)]
struct Dimension {
    name: String,
    /// Zero marks the record dimension.
    length: u64,
}

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    dim_ids: Vec<usize>,
    attributes: BTreeMap<String, AttributeValue>,
    nc_type: NcType,
    begin: u64,
}

impl Variable {
    fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_text)
    }
}

#[derive(Debug, Clone)]
struct Header {
    numrecs: Option<u64>,
    dimensions: Vec<Dimension>,
    attributes: BTreeMap<String, AttributeValue>,
    variables: Vec<Variable>,
    /// Bytes between consecutive records.
    record_size: u64,
    /// Offset of the first record.
    record_begin: Option<u64>,
}

impl Header {
    fn is_record_variable(&self, var: &Variable) -> bool {
        var.dim_ids
            .first()
            .is_some_and(|&id| self.dimensions[id].length == 0)
    }

    /// Fixes are applied after layout is computed: dropping a variable does
    /// not move the bytes of the others.
    fn apply(&mut self, fix: &FileFix) {
        self.variables.retain(|v| !fix.drops(&v.name));
        self.attributes.retain(|name, _| !fix.drops(name));
    }

    /// The 1-D coordinate variable acting as the time axis.
    fn time_variable(&self) -> Option<&Variable> {
        let coordinates: Vec<&Variable> = self
            .variables
            .iter()
            .filter(|v| v.dim_ids.len() == 1 && self.dimensions[v.dim_ids[0]].name == v.name)
            .collect();
        coordinates
            .iter()
            .find(|v| v.text("axis") == Some("T"))
            .or_else(|| coordinates.iter().find(|v| v.text("standard_name") == Some("time")))
            .or_else(|| coordinates.iter().find(|v| v.name == "time"))
            .copied()
    }
}

struct HeaderCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    offset64: bool,
}

impl<'a> HeaderCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ReadError::Truncated {
                offset: self.buf.len() as u64,
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, ReadError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    fn offset(&mut self) -> Result<u64, ReadError> {
        if self.offset64 {
            self.u64()
        } else {
            self.u32().map(u64::from)
        }
    }

    fn count(&mut self) -> Result<usize, ReadError> {
        Ok(self.u32()? as usize)
    }

    /// Bytes padded to a 4-byte boundary.
    fn padded(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let bytes = self.take(n)?;
        self.take((4 - n % 4) % 4)?;
        Ok(bytes)
    }

    fn name(&mut self) -> Result<String, ReadError> {
        let len = self.count()?;
        let bytes = self.padded(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// `ABSENT` or `tag nelems`.
    fn list(&mut self, expected: u32) -> Result<usize, ReadError> {
        let tag = self.u32()?;
        let nelems = self.count()?;
        match tag {
            0 if nelems == 0 => Ok(0),
            t if t == expected => Ok(nelems),
            t => Err(ReadError::malformed(format!(
                "expected list tag {expected:#x}, found {t:#x}"
            ))),
        }
    }

    fn attributes(&mut self) -> Result<BTreeMap<String, AttributeValue>, ReadError> {
        let n = self.list(NC_ATTRIBUTE)?;
        let mut attributes = BTreeMap::new();
        for _ in 0..n {
            let name = self.name()?;
            let nc_type = NcType::from_code(self.u32()?)?;
            let nelems = self.count()?;
            let len = nelems
                .checked_mul(nc_type.size() as usize)
                .ok_or_else(|| ReadError::malformed(format!("attribute {name} too large")))?;
            let bytes = self.padded(len)?;
            let value = match nc_type {
                NcType::Char => AttributeValue::Text(
                    String::from_utf8_lossy(bytes)
                        .trim_end_matches('\0')
                        .to_string(),
                ),
                other => AttributeValue::Numeric(
                    bytes
                        .chunks_exact(other.size() as usize)
                        .filter_map(|chunk| other.decode(chunk))
                        .collect(),
                ),
            };
            attributes.insert(name, value);
        }
        Ok(attributes)
    }
}

fn parse_header(buf: &[u8]) -> Result<Header, ReadError> {
    if buf.starts_with(HDF5_MAGIC) {
        return Err(ReadError::UnsupportedFormat("netCDF-4/HDF5".to_string()));
    }
    if buf.len() < 4 {
        return Err(ReadError::Truncated {
            offset: buf.len() as u64,
        });
    }
    let offset64 = match &buf[..4] {
        b"CDF\x01" => false,
        b"CDF\x02" => true,
        b"CDF\x05" => return Err(ReadError::UnsupportedFormat("CDF-5".to_string())),
        other => {
            return Err(ReadError::UnsupportedFormat(format!(
                "unknown magic {:02x?}",
                other
            )));
        }
    };

    let mut cursor = HeaderCursor {
        buf,
        pos: 4,
        offset64,
    };

    let numrecs = match cursor.u32()? {
        STREAMING => None,
        n => Some(u64::from(n)),
    };

    let ndims = cursor.list(NC_DIMENSION)?;
    let mut dimensions = Vec::new();
    for _ in 0..ndims {
        let name = cursor.name()?;
        let length = u64::from(cursor.u32()?);
        dimensions.push(Dimension { name, length });
    }

    let attributes = cursor.attributes()?;

    let nvars = cursor.list(NC_VARIABLE)?;
    let mut variables = Vec::new();
    let mut vsizes = Vec::new();
    for _ in 0..nvars {
        let name = cursor.name()?;
        let rank = cursor.count()?;
        let mut dim_ids = Vec::new();
        for _ in 0..rank {
            let id = cursor.count()?;
            if id >= dimensions.len() {
                return Err(ReadError::malformed(format!(
                    "variable {name} uses undefined dimension {id}"
                )));
            }
            dim_ids.push(id);
        }
        let var_attributes = cursor.attributes()?;
        let nc_type = NcType::from_code(cursor.u32()?)?;
        let vsize = u64::from(cursor.u32()?);
        let begin = cursor.offset()?;
        vsizes.push(vsize);
        variables.push(Variable {
            name,
            dim_ids,
            attributes: var_attributes,
            nc_type,
            begin,
        });
    }

    let mut header = Header {
        numrecs,
        dimensions,
        attributes,
        variables,
        record_size: 0,
        record_begin: None,
    };

    let record_vars: Vec<usize> = (0..header.variables.len())
        .filter(|&i| header.is_record_variable(&header.variables[i]))
        .collect();
    header.record_begin = record_vars.iter().map(|&i| header.variables[i].begin).min();
    header.record_size = match record_vars.as_slice() {
        // A lone record variable is stored without padding between records.
        [only] => {
            let var = &header.variables[*only];
            var.dim_ids[1..]
                .iter()
                .map(|&id| header.dimensions[id].length)
                .product::<u64>()
                * var.nc_type.size()
        }
        many => many.iter().map(|&i| vsizes[i]).sum(),
    };

    Ok(header)
}

/// netCDF classic / 64-bit offset reader.
#[derive(Debug, Clone, Default)]
pub struct NetcdfReader;

impl NetcdfReader {
    pub fn new() -> Self {
        Self
    }

    fn read_header(file: &mut File, file_len: u64) -> Result<Header, ReadError> {
        let mut want = INITIAL_HEADER_READ.min(file_len);
        loop {
            let mut buf = vec![0u8; want as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            match parse_header(&buf) {
                Err(ReadError::Truncated { .. }) if want < file_len => {
                    if want >= MAX_HEADER_READ {
                        return Err(ReadError::malformed("header exceeds 64 MiB"));
                    }
                    want = (want * 4).min(file_len);
                }
                other => return other,
            }
        }
    }

    fn read_value(
        file: &mut File,
        header: &Header,
        var: &Variable,
        index: u64,
    ) -> Result<f64, ReadError> {
        let size = var.nc_type.size();
        let stride = if header.is_record_variable(var) {
            header.record_size
        } else {
            size
        };
        let offset = var.begin + index * stride;
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..size as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ReadError::Truncated { offset },
            _ => ReadError::Io(e),
        })?;
        var.nc_type
            .decode(bytes)
            .ok_or_else(|| ReadError::malformed(format!("time variable {} is text", var.name)))
    }

    fn value_count(header: &Header, var: &Variable, file_len: u64) -> u64 {
        let dim = &header.dimensions[var.dim_ids[0]];
        if dim.length != 0 {
            return dim.length;
        }
        match (header.numrecs, header.record_begin) {
            (Some(n), _) => n,
            (None, Some(begin)) if header.record_size > 0 => {
                file_len.saturating_sub(begin) / header.record_size
            }
            _ => 0,
        }
    }

    fn time_range(
        file: &mut File,
        file_len: u64,
        header: &Header,
        fix: Option<&FileFix>,
    ) -> Result<Option<TimeRange>, ReadError> {
        let Some(var) = header.time_variable() else {
            return Ok(None);
        };
        let units = fix
            .and_then(|f| f.time_units_override.as_deref())
            .or_else(|| var.text("units"));
        let Some(units) = units else {
            tracing::debug!(variable = %var.name, "time axis has no units");
            return Ok(None);
        };
        let units: TimeUnits = units.parse()?;
        let calendar = match var.text("calendar") {
            Some(name) => name.parse()?,
            None => Calendar::default(),
        };

        let count = Self::value_count(header, var, file_len);
        if count == 0 {
            return Ok(None);
        }
        let first = Self::read_value(file, header, var, 0)?;
        let last = Self::read_value(file, header, var, count - 1)?;

        Ok(Some(TimeRange {
            start: units.decode(first, calendar)?,
            end: units.decode(last, calendar)?,
        }))
    }
}

impl MetadataReader for NetcdfReader {
    fn read(&self, path: &Path, fix: Option<&FileFix>) -> Result<DatasetMetadata, ReadError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut header = Self::read_header(&mut file, file_len)?;
        if let Some(fix) = fix {
            header.apply(fix);
        }
        let time_range = Self::time_range(&mut file, file_len, &header, fix)?;
        Ok(DatasetMetadata {
            attributes: header.attributes,
            time_range,
        })
    }
}

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod common;
