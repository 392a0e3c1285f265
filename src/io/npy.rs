//! io/npy.rs — NumPy `.npy` arrays.
//!
//! Reads format versions 1.x–3.x with numeric dtypes in either byte order and
//! either memory order; writes version 1.0, `<f8`, C order.

use std::fs;
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Dense array, values in row-major (C) order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NpyArray {
    /// View as a matrix. 1-D arrays become a single column; arrays with more
    /// than two axes must squeeze down to two.
    pub fn into_matrix(self) -> Result<DMatrix<f64>> {
        super::squeezed_matrix(&self.shape, &self.data)
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Float,
    Int,
    Uint,
    Bool,
}

#[derive(Debug, Clone, Copy)]
struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

fn parse_dtype(descr: &str) -> Result<Dtype> {
    let bytes = descr.as_bytes();
    if bytes.len() < 3 {
        return Err(Error::Npy(format!("unsupported dtype {descr:?}")));
    }
    let big_endian = bytes[0] == b'>';
    let kind = match bytes[1] {
        b'f' => Kind::Float,
        b'i' => Kind::Int,
        b'u' => Kind::Uint,
        b'b' => Kind::Bool,
        _ => return Err(Error::Npy(format!("unsupported dtype {descr:?}"))),
    };
    let size: usize = descr[2..]
        .parse()
        .map_err(|_| Error::Npy(format!("unsupported dtype {descr:?}")))?;
    let ok = match kind {
        Kind::Float => matches!(size, 4 | 8),
        Kind::Int | Kind::Uint => matches!(size, 1 | 2 | 4 | 8),
        Kind::Bool => size == 1,
    };
    if !ok {
        return Err(Error::Npy(format!("unsupported dtype {descr:?}")));
    }
    Ok(Dtype {
        kind,
        size,
        big_endian,
    })
}

fn decode_value(chunk: &[u8], dt: Dtype) -> f64 {
    let mut buf = [0u8; 8];
    buf[..dt.size].copy_from_slice(chunk);
    if dt.big_endian {
        buf[..dt.size].reverse();
    }
    match (dt.kind, dt.size) {
        (Kind::Float, 8) => f64::from_le_bytes(buf),
        (Kind::Float, _) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        (Kind::Int, 1) => buf[0] as i8 as f64,
        (Kind::Int, 2) => i16::from_le_bytes([buf[0], buf[1]]) as f64,
        (Kind::Int, 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        (Kind::Int, _) => i64::from_le_bytes(buf) as f64,
        (Kind::Uint, _) | (Kind::Bool, _) => u64::from_le_bytes(buf) as f64,
    }
}

/// Value of `'key': <value>` in the header dict, up to the next top-level comma.
fn header_field<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .ok_or_else(|| Error::Npy(format!("header lacks {key:?}")))?
        + needle.len();
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| Error::Npy(format!("malformed {key:?} in header")))?;
    Ok(rest[..end].trim())
}

fn parse_shape(text: &str) -> Result<Vec<usize>> {
    text.trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| Error::Npy(format!("bad shape entry {s:?}")))
        })
        .collect()
}

/// Reorder Fortran-ordered values into C order.
fn fortran_to_c(shape: &[usize], data: &[f64]) -> Vec<f64> {
    let mut f_strides = vec![1usize; shape.len()];
    for k in 1..shape.len() {
        f_strides[k] = f_strides[k - 1] * shape[k - 1];
    }
    let mut out = Vec::with_capacity(data.len());
    let mut idx = vec![0usize; shape.len()];
    for _ in 0..data.len() {
        let offset: usize = idx.iter().zip(&f_strides).map(|(i, s)| i * s).sum();
        out.push(data[offset]);
        for k in (0..shape.len()).rev() {
            idx[k] += 1;
            if idx[k] < shape[k] {
                break;
            }
            idx[k] = 0;
        }
    }
    out
}

pub fn parse(bytes: &[u8]) -> Result<NpyArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(Error::Npy("missing magic string".into()));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(Error::Npy("truncated header".into()));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(Error::Npy(format!("unsupported format version {v}"))),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(Error::Npy("truncated header".into()));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| Error::Npy("header is not text".into()))?;

    let descr = header_field(header, "descr")?.trim_matches(|c| c == '\'' || c == '"');
    let dtype = parse_dtype(descr)?;
    let fortran = match header_field(header, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => return Err(Error::Npy(format!("bad fortran_order {other:?}"))),
    };
    let shape = parse_shape(header_field(header, "shape")?)?;

    let payload = &bytes[data_start..];
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::Npy(format!("shape {shape:?} overflows")))?;
    let n_bytes = count
        .checked_mul(dtype.size)
        .ok_or_else(|| Error::Npy(format!("shape {shape:?} overflows")))?;
    if payload.len() < n_bytes {
        return Err(Error::Npy(format!(
            "expected {n_bytes} data bytes, found {}",
            payload.len()
        )));
    }
    let values: Vec<f64> = payload
        .chunks_exact(dtype.size)
        .take(count)
        .map(|c| decode_value(c, dtype))
        .collect();
    let data = if fortran && shape.len() > 1 {
        fortran_to_c(&shape, &values)
    } else {
        values
    };
    Ok(NpyArray { shape, data })
}

pub fn read(path: &Path) -> Result<NpyArray> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    parse(&bytes)
}

/// Version 1.0 `<f8` C-order encoding of `data` with the given shape.
pub fn encode(shape: &[usize], data: &[f64]) -> Vec<u8> {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {dims}, }}");
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let pad = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.push_str(&" ".repeat(pad));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + data.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn write_matrix(path: &Path, m: &DMatrix<f64>) -> Result<()> {
    let mut data = Vec::with_capacity(m.len());
    for i in 0..m.nrows() {
        data.extend(m.row(i).iter().copied());
    }
    fs::write(path, encode(&[m.nrows(), m.ncols()], &data)).map_err(|e| Error::io(path, e))
}

pub fn write_vec(path: &Path, v: &[f64]) -> Result<()> {
    fs::write(path, encode(&[v.len()], v)).map_err(|e| Error::io(path, e))
}
