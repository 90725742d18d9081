//! On-disk files of a Vamana index.
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! raw data   u32 num, u32 dim, f32 x num*dim
//! .vectors   u64 num, u32 dim, f32 x num*dim
//! .ids       u64 num, i64 x num
//! .pq        u64 codebook_len, codebook, u64 num, u32 num_subspaces, u8 x num*num_subspaces
//! .meta      JSON
//! ```

use crate::pq::ProductQuantizer;
use crate::{Result, VamanaError};
use annex_core::MetricType;
use bytes::Buf;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const VECTORS_HEADER: usize = 8 + 4;

/// Paths of the files sharing one index prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFiles {
    prefix: PathBuf,
}

impl IndexFiles {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// `{prefix}.{ext}`; unlike `with_extension`, dots in the prefix are kept.
    fn with_suffix(&self, ext: &str) -> PathBuf {
        let mut path = OsString::from(self.prefix.as_os_str());
        path.push(".");
        path.push(ext);
        PathBuf::from(path)
    }

    pub fn graph(&self) -> PathBuf {
        self.with_suffix("graph")
    }

    pub fn pq(&self) -> PathBuf {
        self.with_suffix("pq")
    }

    pub fn vectors(&self) -> PathBuf {
        self.with_suffix("vectors")
    }

    pub fn ids(&self) -> PathBuf {
        self.with_suffix("ids")
    }

    pub fn meta(&self) -> PathBuf {
        self.with_suffix("meta")
    }

    /// Every file of the index, in staging order.
    pub fn all(&self) -> [PathBuf; 5] {
        [
            self.graph(),
            self.pq(),
            self.vectors(),
            self.ids(),
            self.meta(),
        ]
    }

    /// Create the prefix's parent directory if it is missing.
    pub fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.prefix.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Combined size of the files present locally.
    pub fn disk_size(&self) -> usize {
        self.all()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|m| m.len() as usize)
            .sum()
    }
}

/// Build summary written next to the index files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMeta {
    pub version: i32,
    pub metric: MetricType,
    pub dim: usize,
    pub count: usize,
    pub medoid: u32,
    pub max_degree: usize,
    pub search_list_size: usize,
    pub beamwidth: usize,
    pub alpha: f32,
    pub num_subspaces: usize,
}

pub fn write_meta(path: &Path, meta: &DiskMeta) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta)
        .map_err(|e| VamanaError::Format(format!("meta encode: {}", e)))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_meta(path: &Path) -> Result<DiskMeta> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VamanaError::Format(format!("{}: {}", path.display(), e)))
}

fn raw_err(path: &Path, reason: String) -> VamanaError {
    VamanaError::RawData {
        path: path.to_path_buf(),
        reason,
    }
}

/// Read only the `(num, dim)` header of a raw data file and check that the
/// file length matches it.
pub fn read_raw_header(path: &Path) -> Result<(usize, usize)> {
    let mut file = File::open(path).map_err(|e| raw_err(path, e.to_string()))?;
    let len = file
        .metadata()
        .map_err(|e| raw_err(path, e.to_string()))?
        .len();

    let mut header = [0u8; 8];
    file.read_exact(&mut header)
        .map_err(|_| raw_err(path, format!("{} bytes is shorter than the header", len)))?;
    let mut cursor = &header[..];
    let num = cursor.get_u32_le() as usize;
    let dim = cursor.get_u32_le() as usize;

    let expected = num
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| raw_err(path, format!("{} x {} overflows", num, dim)))?;
    if len - 8 != expected as u64 {
        return Err(raw_err(
            path,
            format!("header says {} x {} but {} data bytes follow", num, dim, len - 8),
        ));
    }
    Ok((num, dim))
}

/// Read a raw data file: `u32 num, u32 dim` followed by `num * dim` floats.
///
/// Returns `(num, dim, data)`.
pub fn read_raw_data(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let (num, dim) = read_raw_header(path)?;
    let bytes = fs::read(path).map_err(|e| raw_err(path, e.to_string()))?;
    let mut cursor = bytes.get(8..).unwrap_or(&[]);
    if cursor.remaining() != num * dim * 4 {
        return Err(raw_err(path, "file changed while reading".to_string()));
    }

    let data = (0..num * dim).map(|_| cursor.get_f32_le()).collect();
    Ok((num, dim, data))
}

pub fn write_vectors(path: &Path, vectors: &[f32], dim: usize) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let rows = if dim == 0 { 0 } else { vectors.len() / dim };
    writer.write_all(&(rows as u64).to_le_bytes())?;
    writer.write_all(&(dim as u32).to_le_bytes())?;
    for &val in vectors {
        writer.write_all(&val.to_le_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_ids(path: &Path, ids: &[i64]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&(ids.len() as u64).to_le_bytes())?;
    for &id in ids {
        writer.write_all(&id.to_le_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

pub fn read_ids(path: &Path) -> Result<Vec<i64>> {
    let bytes = fs::read(path)?;
    let mut cursor = bytes.as_slice();
    if cursor.remaining() < 8 {
        return Err(VamanaError::Format(format!("{} is truncated", path.display())));
    }
    let count = cursor.get_u64_le() as usize;
    if cursor.remaining() != count.saturating_mul(8) {
        return Err(VamanaError::Format(format!(
            "{} declares {} ids but holds {} bytes",
            path.display(),
            count,
            cursor.remaining()
        )));
    }
    Ok((0..count).map(|_| cursor.get_i64_le()).collect())
}

pub fn write_pq(path: &Path, pq: &ProductQuantizer, codes: &[u8]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let codebook_bytes = pq.to_bytes();
    writer.write_all(&(codebook_bytes.len() as u64).to_le_bytes())?;
    writer.write_all(&codebook_bytes)?;

    let rows = codes.len() / pq.num_subspaces().max(1);
    writer.write_all(&(rows as u64).to_le_bytes())?;
    writer.write_all(&(pq.num_subspaces() as u32).to_le_bytes())?;
    writer.write_all(codes)?;

    writer.flush()?;
    Ok(())
}

/// Load the quantizer and the flat code buffer.
pub fn read_pq(path: &Path) -> Result<(ProductQuantizer, Vec<u8>)> {
    let truncated = || VamanaError::Format(format!("{} is truncated", path.display()));

    let bytes = fs::read(path)?;
    let mut cursor = bytes.as_slice();
    if cursor.remaining() < 8 {
        return Err(truncated());
    }
    let codebook_len = cursor.get_u64_le() as usize;
    if cursor.remaining() < codebook_len {
        return Err(truncated());
    }
    let pq = ProductQuantizer::from_bytes(&cursor[..codebook_len])?;
    cursor.advance(codebook_len);

    if cursor.remaining() < 12 {
        return Err(truncated());
    }
    let rows = cursor.get_u64_le() as usize;
    let num_subspaces = cursor.get_u32_le() as usize;
    if num_subspaces != pq.num_subspaces() || cursor.remaining() != rows.saturating_mul(num_subspaces) {
        return Err(VamanaError::Format(format!(
            "{} codes do not match {} rows of {} subspaces",
            cursor.remaining(),
            rows,
            num_subspaces
        )));
    }
    Ok((pq, cursor.to_vec()))
}

/// Memory-mapped `.vectors` file.
#[derive(Debug)]
pub struct VectorFile {
    mmap: memmap2::Mmap,
    rows: usize,
    dim: usize,
}

impl VectorFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: index files are written once during build and never
        // modified while mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        if mmap.len() < VECTORS_HEADER {
            return Err(VamanaError::Format(format!("{} is truncated", path.display())));
        }
        let mut header = &mmap[..VECTORS_HEADER];
        let rows = header.get_u64_le() as usize;
        let dim = header.get_u32_le() as usize;
        if mmap.len() != VECTORS_HEADER + rows.saturating_mul(dim).saturating_mul(4) {
            return Err(VamanaError::Format(format!(
                "{} declares {} x {} but holds {} bytes",
                path.display(),
                rows,
                dim,
                mmap.len()
            )));
        }

        Ok(Self { mmap, rows, dim })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Decode row `pos` into `out`, replacing its contents.
    pub fn read_row(&self, pos: u32, out: &mut Vec<f32>) {
        out.clear();
        let start = VECTORS_HEADER + pos as usize * self.dim * 4;
        let mut bytes = &self.mmap[start..start + self.dim * 4];
        out.extend((0..self.dim).map(|_| bytes.get_f32_le()));
    }

    pub fn row(&self, pos: u32) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        self.read_row(pos, &mut out);
        out
    }
}
