//! Minimal netCDF classic encoder for building fixtures.

#![allow(dead_code)]

use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum NcKind {
    Int,
    Float,
    Double,
}

impl NcKind {
    fn code(self) -> u32 {
        match self {
            NcKind::Int => 4,
            NcKind::Float => 5,
            NcKind::Double => 6,
        }
    }

    fn size(self) -> usize {
        match self {
            NcKind::Int | NcKind::Float => 4,
            NcKind::Double => 8,
        }
    }

    fn put(self, value: f64, out: &mut Vec<u8>) {
        match self {
            NcKind::Int => out.extend_from_slice(&(value as i32).to_be_bytes()),
            NcKind::Float => out.extend_from_slice(&(value as f32).to_be_bytes()),
            NcKind::Double => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Attr {
    Text(String),
    Double(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct NcVar {
    name: String,
    dims: Vec<String>,
    kind: NcKind,
    attrs: Vec<(String, Attr)>,
    values: Vec<f64>,
}

impl NcVar {
    fn new(name: &str, dims: &[&str], kind: NcKind, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            kind,
            attrs: Vec::new(),
            values,
        }
    }

    pub fn double(name: &str, dims: &[&str], values: &[f64]) -> Self {
        Self::new(name, dims, NcKind::Double, values.to_vec())
    }

    pub fn float(name: &str, dims: &[&str], values: &[f64]) -> Self {
        Self::new(name, dims, NcKind::Float, values.to_vec())
    }

    pub fn int(name: &str, dims: &[&str], values: &[i32]) -> Self {
        Self::new(
            name,
            dims,
            NcKind::Int,
            values.iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), Attr::Text(value.to_string())));
        self
    }
}

/// A netCDF classic file under construction. The record dimension, if any,
/// must be the first dimension of every variable that uses it.
#[derive(Debug, Clone, Default)]
pub struct ClassicFile {
    offset64: bool,
    dims: Vec<(String, usize)>,
    globals: Vec<(String, Attr)>,
    vars: Vec<NcVar>,
}

fn pad4(n: usize) -> usize {
    n.div_ceil(4) * 4
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.resize(out.len() + pad4(bytes.len()) - bytes.len(), 0);
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    put_u32(out, name.len() as u32);
    put_padded(out, name.as_bytes());
}

fn put_attrs(out: &mut Vec<u8>, attrs: &[(String, Attr)]) {
    if attrs.is_empty() {
        put_u32(out, 0);
        put_u32(out, 0);
        return;
    }
    put_u32(out, 0x0C);
    put_u32(out, attrs.len() as u32);
    for (name, value) in attrs {
        put_name(out, name);
        match value {
            Attr::Text(text) => {
                put_u32(out, 2);
                put_u32(out, text.len() as u32);
                put_padded(out, text.as_bytes());
            }
            Attr::Double(values) => {
                put_u32(out, 6);
                put_u32(out, values.len() as u32);
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
    }
}

impl ClassicFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the 64-bit offset variant.
    pub fn offset64(mut self) -> Self {
        self.offset64 = true;
        self
    }

    pub fn record_dim(mut self, name: &str) -> Self {
        self.dims.push((name.to_string(), 0));
        self
    }

    pub fn dim(mut self, name: &str, len: usize) -> Self {
        self.dims.push((name.to_string(), len));
        self
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.globals.push((key.to_string(), Attr::Text(value.to_string())));
        self
    }

    pub fn number(mut self, key: &str, value: f64) -> Self {
        self.globals.push((key.to_string(), Attr::Double(vec![value])));
        self
    }

    pub fn var(mut self, var: NcVar) -> Self {
        self.vars.push(var);
        self
    }

    fn dim_len(&self, name: &str) -> usize {
        self.dims
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, len)| *len)
            .unwrap_or_else(|| panic!("undefined dimension {name}"))
    }

    fn dim_id(&self, name: &str) -> u32 {
        self.dims
            .iter()
            .position(|(n, _)| n == name)
            .unwrap_or_else(|| panic!("undefined dimension {name}")) as u32
    }

    fn is_record(&self, var: &NcVar) -> bool {
        var.dims.first().is_some_and(|d| self.dim_len(d) == 0)
    }

    /// Values per record (or in total, for fixed variables).
    fn inner_len(&self, var: &NcVar) -> usize {
        let skip = usize::from(self.is_record(var));
        var.dims[skip..].iter().map(|d| self.dim_len(d)).product()
    }

    fn vsize(&self, var: &NcVar) -> usize {
        pad4(self.inner_len(var) * var.kind.size())
    }

    fn numrecs(&self) -> usize {
        self.vars
            .iter()
            .filter(|v| self.is_record(v))
            .map(|v| v.values.len() / self.inner_len(v).max(1))
            .max()
            .unwrap_or(0)
    }

    fn header(&self, begins: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(if self.offset64 { b"CDF\x02" } else { b"CDF\x01" });
        put_u32(&mut out, self.numrecs() as u32);

        if self.dims.is_empty() {
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
        } else {
            put_u32(&mut out, 0x0A);
            put_u32(&mut out, self.dims.len() as u32);
            for (name, len) in &self.dims {
                put_name(&mut out, name);
                put_u32(&mut out, *len as u32);
            }
        }

        put_attrs(&mut out, &self.globals);

        if self.vars.is_empty() {
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
        } else {
            put_u32(&mut out, 0x0B);
            put_u32(&mut out, self.vars.len() as u32);
            for (var, begin) in self.vars.iter().zip(begins) {
                put_name(&mut out, &var.name);
                put_u32(&mut out, var.dims.len() as u32);
                for dim in &var.dims {
                    put_u32(&mut out, self.dim_id(dim));
                }
                put_attrs(&mut out, &var.attrs);
                put_u32(&mut out, var.kind.code());
                put_u32(&mut out, self.vsize(var) as u32);
                if self.offset64 {
                    out.extend_from_slice(&begin.to_be_bytes());
                } else {
                    put_u32(&mut out, *begin as u32);
                }
            }
        }
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let header_len = self.header(&vec![0; self.vars.len()]).len() as u64;

        let mut begins = vec![0u64; self.vars.len()];
        let mut cursor = header_len;
        for (i, var) in self.vars.iter().enumerate() {
            if !self.is_record(var) {
                begins[i] = cursor;
                cursor += self.vsize(var) as u64;
            }
        }
        let records: Vec<usize> = (0..self.vars.len())
            .filter(|&i| self.is_record(&self.vars[i]))
            .collect();
        for &i in &records {
            begins[i] = cursor;
            cursor += self.vsize(&self.vars[i]) as u64;
        }

        let mut out = self.header(&begins);
        for var in self.vars.iter().filter(|v| !self.is_record(v)) {
            let start = out.len();
            for v in &var.values {
                var.kind.put(*v, &mut out);
            }
            out.resize(start + self.vsize(var), 0);
        }

        let single = records.len() == 1;
        for r in 0..self.numrecs() {
            for &i in &records {
                let var = &self.vars[i];
                let inner = self.inner_len(var);
                let start = out.len();
                for k in 0..inner {
                    let value = var.values.get(r * inner + k).copied().unwrap_or(0.0);
                    var.kind.put(value, &mut out);
                }
                if !single {
                    out.resize(start + self.vsize(var), 0);
                }
            }
        }
        out
    }

    pub fn write(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.encode()).unwrap();
    }
}
