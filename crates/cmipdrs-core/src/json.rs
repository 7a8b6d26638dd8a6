//! JSON persistence in the layout used by existing archived inventories.
//!
//! Archived inventories were written with sorted keys, ASCII-only output,
//! a 4-space indent and `","` / `":"` separators. Sorting is handled by the
//! types (`BTreeMap`s and field order); this module supplies the formatter
//! and the atomic write.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::Formatter;

use crate::error::{ArchiveError, Result};

/// `serde_json` formatter matching the legacy on-disk layout.
#[derive(Debug, Clone)]
pub struct LegacyFormatter {
    current_indent: usize,
    has_value: bool,
}

impl LegacyFormatter {
    const INDENT: &'static [u8] = b"    ";

    pub fn new() -> Self {
        Self {
            current_indent: 0,
            has_value: false,
        }
    }

    fn indent<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        for _ in 0..self.current_indent {
            writer.write_all(Self::INDENT)?;
        }
        Ok(())
    }
}

impl Default for LegacyFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for LegacyFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent -= 1;
        if self.has_value {
            writer.write_all(b"\n")?;
            self.indent(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        writer.write_all(if first { b"\n" } else { b",\n" })?;
        self.indent(writer)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent -= 1;
        if self.has_value {
            writer.write_all(b"\n")?;
            self.indent(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        writer.write_all(if first { b"\n" } else { b",\n" })?;
        self.indent(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b":")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    /// Escape everything outside printable ASCII as `\uXXXX` (UTF-16 units).
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.bytes().all(|b| (0x20..0x7f).contains(&b)) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize a value to a string in the legacy layout.
pub fn to_legacy_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, LegacyFormatter::new());
    value.serialize(&mut ser)?;
    // The formatter only emits ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write a value atomically: temp file, fsync, rename.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }

    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let file = File::create(&temp_path).map_err(|e| ArchiveError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);

    let mut ser = serde_json::Serializer::with_formatter(&mut writer, LegacyFormatter::new());
    if let Err(e) = value.serialize(&mut ser) {
        let _ = fs::remove_file(&temp_path);
        return Err(ArchiveError::json(path, e));
    }

    let file = writer
        .into_inner()
        .map_err(|e| ArchiveError::io(&temp_path, e.into_error()))?;
    file.sync_all().map_err(|e| ArchiveError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| ArchiveError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote json");
    Ok(())
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ArchiveError::json(path, e))
}
