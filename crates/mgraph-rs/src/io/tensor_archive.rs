//! Binary parameter archive.
//!
//! Layout: the 8-byte magic `MGRAPHTN`, a little-endian `u32` version, then either inline
//! per-tensor headers followed by their data (v1) or a bincode index followed by the
//! concatenated data of every tensor (v2). All element data is little-endian.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::{DType, Lod, Shape, Tensor, TensorData};

const MAGIC: &[u8; 8] = b"MGRAPHTN";
const VERSION_V1: u32 = 1;
const VERSION_V2: u32 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub dims: Vec<usize>,
    pub dtype: DType,
    pub lod: Lod,
    pub offset: u64,
    pub len: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ArchiveIndexV2 {
    entries: Vec<ArchiveIndexEntryV2>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ArchiveIndexEntryV2 {
    name: String,
    dims: Vec<u64>,
    dtype_tag: u32,
    lod: Vec<Vec<u64>>,
    offset: u64,
    len: u64,
}

/// Random-access reader over an archive. Tensors are decoded on demand.
pub struct TensorArchiveReader<R = BufReader<File>> {
    source: R,
    entries: Vec<ArchiveEntry>,
    by_name: HashMap<String, usize>,
}

impl TensorArchiveReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open tensor archive {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to read tensor archive {}", path.display()))
    }
}

impl<R: Read + Seek> TensorArchiveReader<R> {
    pub fn from_reader(mut source: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        source.read_exact(&mut magic)?;
        ensure!(&magic == MAGIC, "invalid tensor archive magic header");

        let entries = match read_u32(&mut source)? {
            VERSION_V1 => read_index_v1(&mut source)?,
            VERSION_V2 => read_index_v2(&mut source)?,
            other => bail!("unsupported tensor archive version {}", other),
        };
        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            ensure!(
                by_name.insert(entry.name.clone(), i).is_none(),
                "tensor '{}' appears twice in archive",
                entry.name
            );
        }
        Ok(Self {
            source,
            entries,
            by_name,
        })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&mut self, name: &str) -> Result<Tensor> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| anyhow!("tensor '{}' not found in archive", name))?;
        let entry = self.entries[idx].clone();
        self.read_entry(&entry)
    }

    pub fn read_entry(&mut self, entry: &ArchiveEntry) -> Result<Tensor> {
        let byte_len = usize::try_from(entry.len)
            .map_err(|_| anyhow!("tensor {} data length {} out of range", entry.name, entry.len))?;
        self.source.seek(SeekFrom::Start(entry.offset))?;
        let mut raw = vec![0u8; byte_len];
        self.source
            .read_exact(&mut raw)
            .with_context(|| format!("truncated data for tensor {}", entry.name))?;

        let data = decode_data(entry.dtype, &raw)
            .with_context(|| format!("tensor {} has malformed data", entry.name))?;
        let mut tensor = Tensor::from_data(Shape::new(&entry.dims), data)?;
        tensor.set_lod(entry.lod.clone());
        Ok(tensor)
    }
}

fn read_index_v1(source: &mut (impl Read + Seek)) -> Result<Vec<ArchiveEntry>> {
    let count = read_u32(source)? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let name_len = read_u32(source)? as usize;
        let mut name_bytes = vec![0u8; name_len];
        source.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes)?;

        let rank = read_u32(source)? as usize;
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(read_u64(source)?);
        }
        let dtype = dtype_from_tag(read_u32(source)?)?;
        let len = read_u64(source)?;
        let offset = source.stream_position()?;
        let skip = i64::try_from(len)
            .map_err(|_| anyhow!("tensor {} data length {} out of range", name, len))?;
        source.seek(SeekFrom::Current(skip))?;

        entries.push(ArchiveEntry {
            dims: dims_to_usize(&name, dims)?,
            name,
            dtype,
            lod: Lod::new(),
            offset,
            len,
        });
    }
    Ok(entries)
}

fn read_index_v2(source: &mut impl Read) -> Result<Vec<ArchiveEntry>> {
    let index_len = read_u32(source)? as usize;
    let mut index_bytes = vec![0u8; index_len];
    source.read_exact(&mut index_bytes)?;
    let index: ArchiveIndexV2 = bincode::deserialize(&index_bytes)?;

    index
        .entries
        .into_iter()
        .map(|e| -> Result<ArchiveEntry> {
            let lod = e
                .lod
                .into_iter()
                .map(|level| dims_to_usize(&e.name, level))
                .collect::<Result<Lod>>()?;
            Ok(ArchiveEntry {
                dims: dims_to_usize(&e.name, e.dims)?,
                dtype: dtype_from_tag(e.dtype_tag)?,
                lod,
                offset: e.offset,
                len: e.len,
                name: e.name,
            })
        })
        .collect()
}

pub struct TensorArchive;

impl TensorArchive {
    /// Reads every tensor of the archive at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<BTreeMap<String, Tensor>> {
        let mut reader = TensorArchiveReader::open(path)?;
        let entries = reader.entries().to_vec();
        entries
            .into_iter()
            .map(|entry| -> Result<(String, Tensor)> {
                Ok((entry.name.clone(), reader.read_entry(&entry)?))
            })
            .collect()
    }

    /// Writes the indexed (v2) format.
    pub fn save(path: impl AsRef<Path>, tensors: &BTreeMap<String, Tensor>) -> Result<()> {
        let snapshots = snapshot(tensors)?;

        let mut index = ArchiveIndexV2 {
            entries: Vec::with_capacity(snapshots.len()),
        };
        let mut running_offset: u64 = 0;
        for (name, tensor, data) in &snapshots {
            let len = data.byte_len() as u64;
            index.entries.push(ArchiveIndexEntryV2 {
                name: (*name).clone(),
                dims: tensor.dims().iter().map(|&d| d as u64).collect(),
                dtype_tag: data.dtype().tag(),
                lod: tensor
                    .lod()
                    .iter()
                    .map(|level| level.iter().map(|&o| o as u64).collect())
                    .collect(),
                offset: running_offset,
                len,
            });
            running_offset = running_offset
                .checked_add(len)
                .ok_or_else(|| anyhow!("tensor archive data offset overflow"))?;
        }

        // Offsets are relative until the index size is known; bincode encodes u64 with a
        // fixed width so rewriting them does not change that size.
        let index_len = bincode::serialized_size(&index)? as usize;
        ensure!(
            index_len <= u32::MAX as usize,
            "tensor archive index too large"
        );
        let data_start = (MAGIC.len() + 4 + 4 + index_len) as u64;
        for entry in index.entries.iter_mut() {
            entry.offset += data_start;
        }
        let index_bytes = bincode::serialize(&index)?;
        ensure!(
            index_bytes.len() == index_len,
            "tensor archive index length mismatch after offset fixup"
        );

        let mut writer = create(path)?;
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION_V2.to_le_bytes())?;
        writer.write_all(&(index_len as u32).to_le_bytes())?;
        writer.write_all(&index_bytes)?;
        for (_, _, data) in &snapshots {
            encode_data(data, &mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the legacy inline-header (v1) format. LoD metadata is not representable
    /// in v1 and is dropped.
    pub fn save_v1(path: impl AsRef<Path>, tensors: &BTreeMap<String, Tensor>) -> Result<()> {
        let snapshots = snapshot(tensors)?;
        let mut writer = create(path)?;
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION_V1.to_le_bytes())?;
        writer.write_all(&(snapshots.len() as u32).to_le_bytes())?;

        for (name, tensor, data) in &snapshots {
            let name_bytes = name.as_bytes();
            writer.write_all(&(name_bytes.len() as u32).to_le_bytes())?;
            writer.write_all(name_bytes)?;
            writer.write_all(&(tensor.dims().len() as u32).to_le_bytes())?;
            for &dim in tensor.dims() {
                writer.write_all(&(dim as u64).to_le_bytes())?;
            }
            writer.write_all(&data.dtype().tag().to_le_bytes())?;
            writer.write_all(&(data.byte_len() as u64).to_le_bytes())?;
            encode_data(data, &mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn create(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create tensor archive {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Copies each tensor's buffer out of its storage slot, in name order.
fn snapshot(tensors: &BTreeMap<String, Tensor>) -> Result<Vec<(&String, &Tensor, TensorData)>> {
    let mut snapshots = Vec::with_capacity(tensors.len());
    for (name, tensor) in tensors {
        let storage = tensor
            .storage()
            .ok_or_else(|| anyhow!("tensor '{}' has no data to archive", name))?;
        let data = storage.read().clone();
        snapshots.push((name, tensor, data));
    }
    Ok(snapshots)
}

macro_rules! decode_le {
    ($raw:expr, $ty:ty) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        $raw.chunks_exact(WIDTH)
            .map(|chunk| {
                let mut bytes = [0u8; WIDTH];
                bytes.copy_from_slice(chunk);
                <$ty>::from_le_bytes(bytes)
            })
            .collect()
    }};
}

fn decode_data(dtype: DType, raw: &[u8]) -> Result<TensorData> {
    ensure!(
        raw.len().is_multiple_of(dtype.size_in_bytes()),
        "data size {} misaligned for {:?}",
        raw.len(),
        dtype
    );
    Ok(match dtype {
        DType::F32 => TensorData::F32(decode_le!(raw, f32)),
        DType::F64 => TensorData::F64(decode_le!(raw, f64)),
        DType::I32 => TensorData::I32(decode_le!(raw, i32)),
        DType::I64 => TensorData::I64(decode_le!(raw, i64)),
    })
}

fn encode_data(data: &TensorData, writer: &mut impl Write) -> Result<()> {
    match data {
        TensorData::F32(values) => values
            .iter()
            .try_for_each(|v| writer.write_all(&v.to_le_bytes()))?,
        TensorData::F64(values) => values
            .iter()
            .try_for_each(|v| writer.write_all(&v.to_le_bytes()))?,
        TensorData::I32(values) => values
            .iter()
            .try_for_each(|v| writer.write_all(&v.to_le_bytes()))?,
        TensorData::I64(values) => values
            .iter()
            .try_for_each(|v| writer.write_all(&v.to_le_bytes()))?,
    }
    Ok(())
}

fn dtype_from_tag(tag: u32) -> Result<DType> {
    DType::from_tag(tag).ok_or_else(|| anyhow!("unknown dtype tag {} in tensor archive", tag))
}

fn dims_to_usize(name: &str, dims: Vec<u64>) -> Result<Vec<usize>> {
    dims.into_iter()
        .map(|d| usize::try_from(d).map_err(|_| anyhow!("tensor {} dim overflow", name)))
        .collect()
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
