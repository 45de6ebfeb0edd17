//! Chunked, deflate-compressed single-file container.
//!
//! Datasets are cut into fixed-size chunks on record boundaries and each
//! chunk is zlib-compressed. Saves go through a temp file and an atomic
//! rename, so a crash mid-save leaves the previous file intact.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use indexmap::IndexMap;

use crate::alignment::FORMAT_VERSION;
use crate::error::{HalError, Result};
use crate::storage::{check_version, wire, AccessMode, DataType, StorageBackend, HDF5_MAGIC};

/// Records per chunk, matching the container's historical default.
const CHUNK_RECORDS: u32 = 1000;
/// Deflate level; cheap but effective on segment arrays.
const COMPRESSION_LEVEL: u32 = 2;

pub struct ChunkedStore {
    path: PathBuf,
    mode: AccessMode,
    arrays: IndexMap<String, (DataType, Vec<u8>)>,
    meta: IndexMap<String, IndexMap<String, String>>,
}

impl ChunkedStore {
    pub fn create(path: &Path) -> Self {
        ChunkedStore {
            path: path.to_path_buf(),
            mode: AccessMode::Create,
            arrays: IndexMap::new(),
            meta: IndexMap::new(),
        }
    }

    pub fn open(path: &Path, mode: AccessMode) -> Result<Self> {
        let file = File::open(path).map_err(|e| HalError::io(path, e))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| HalError::Format(format!("{}: truncated header", path.display())))?;
        if magic != HDF5_MAGIC {
            return Err(HalError::Format(format!(
                "{}: bad chunked-container magic",
                path.display()
            )));
        }
        let version = wire::read_string(&mut r)?;
        check_version(path, &version)?;

        let mut meta = IndexMap::new();
        let num_groups = read_u32(&mut r, path)?;
        for _ in 0..num_groups {
            let group = wire::read_string(&mut r)?;
            let n = read_u32(&mut r, path)?;
            let mut entries = IndexMap::new();
            for _ in 0..n {
                let key = wire::read_string(&mut r)?;
                let value = wire::read_string(&mut r)?;
                entries.insert(key, value);
            }
            meta.insert(group, entries);
        }

        let mut arrays = IndexMap::new();
        let num_datasets = read_u32(&mut r, path)?;
        for _ in 0..num_datasets {
            let name = wire::read_string(&mut r)?;
            let code = r
                .read_u8()
                .map_err(|_| HalError::Format("truncated dataset header".into()))?;
            let stride = read_u32(&mut r, path)?;
            let dtype = DataType::from_parts(code, stride)?;
            let raw_len = r
                .read_u64::<LittleEndian>()
                .map_err(|_| HalError::Format("truncated dataset header".into()))?;
            let num_chunks = read_u32(&mut r, path)?;
            let mut data = Vec::with_capacity(raw_len as usize);
            for _ in 0..num_chunks {
                let comp_len = read_u32(&mut r, path)?;
                let mut comp = vec![0u8; comp_len as usize];
                r.read_exact(&mut comp)
                    .map_err(|_| HalError::Format("truncated chunk".into()))?;
                let mut dec = ZlibDecoder::new(&comp[..]);
                dec.read_to_end(&mut data)
                    .map_err(|_| HalError::Format("corrupt chunk".into()))?;
            }
            if data.len() as u64 != raw_len {
                return Err(HalError::Format(format!(
                    "dataset {name} decompressed to {} bytes, expected {raw_len}",
                    data.len()
                )));
            }
            arrays.insert(name, (dtype, data));
        }

        Ok(ChunkedStore {
            path: path.to_path_buf(),
            mode,
            arrays,
            meta,
        })
    }
}

fn read_u32<R: Read>(r: &mut R, path: &Path) -> Result<u32> {
    r.read_u32::<LittleEndian>()
        .map_err(|_| HalError::Format(format!("{}: truncated field", path.display())))
}

impl StorageBackend for ChunkedStore {
    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn put_array(&mut self, name: &str, dtype: DataType, data: Vec<u8>) -> Result<()> {
        self.arrays.insert(name.to_string(), (dtype, data));
        Ok(())
    }

    fn get_array(&self, name: &str) -> Result<&[u8]> {
        self.arrays
            .get(name)
            .map(|(_, d)| d.as_slice())
            .ok_or_else(|| HalError::NotFound(format!("array {name}")))
    }

    fn has_array(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    fn put_meta(&mut self, group: &str, key: &str, value: &str) {
        self.meta
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn meta_group(&self, group: &str) -> IndexMap<String, String> {
        self.meta.get(group).cloned().unwrap_or_default()
    }

    fn flush(&mut self) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| HalError::io(&self.path, e))?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            let write = |w: &mut BufWriter<&File>| -> std::io::Result<()> {
                w.write_all(HDF5_MAGIC)?;
                wire::write_string(w, FORMAT_VERSION)?;

                w.write_u32::<LittleEndian>(self.meta.len() as u32)?;
                for (group, entries) in &self.meta {
                    wire::write_string(w, group)?;
                    w.write_u32::<LittleEndian>(entries.len() as u32)?;
                    for (k, v) in entries {
                        wire::write_string(w, k)?;
                        wire::write_string(w, v)?;
                    }
                }

                w.write_u32::<LittleEndian>(self.arrays.len() as u32)?;
                for (name, (dtype, data)) in &self.arrays {
                    wire::write_string(w, name)?;
                    w.write_u8(dtype.code())?;
                    w.write_u32::<LittleEndian>(dtype.stride())?;
                    w.write_u64::<LittleEndian>(data.len() as u64)?;
                    let chunk_bytes = (dtype.stride() * CHUNK_RECORDS).max(1) as usize;
                    let chunks: Vec<&[u8]> = if data.is_empty() {
                        Vec::new()
                    } else {
                        data.chunks(chunk_bytes).collect()
                    };
                    w.write_u32::<LittleEndian>(chunks.len() as u32)?;
                    for chunk in chunks {
                        let mut enc =
                            ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
                        enc.write_all(chunk)?;
                        let comp = enc.finish()?;
                        w.write_u32::<LittleEndian>(comp.len() as u32)?;
                        w.write_all(&comp)?;
                    }
                }
                w.flush()
            };
            write(&mut w).map_err(|e| HalError::io(&self.path, e))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| HalError::io(&self.path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.hal");
        let mut store = ChunkedStore::create(&path);
        store.put_meta("Meta", "species", "yeast");
        store.put_meta("Phylogeny", "tree", "(a:1)root;");
        store
            .put_array("Genomes/a/dnaArray", DataType::UInt8, vec![1, 2, 3, 4, 5])
            .unwrap();
        // a dataset bigger than one chunk
        let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        store
            .put_array("Genomes/a/topArray", DataType::TopRecord { stride: 1 }, big.clone())
            .unwrap();
        store.flush().unwrap();

        let loaded = ChunkedStore::open(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(loaded.meta_group("Meta").get("species").unwrap(), "yeast");
        assert_eq!(loaded.get_array("Genomes/a/dnaArray").unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(loaded.get_array("Genomes/a/topArray").unwrap(), &big[..]);
        assert!(loaded.get_array("Genomes/b/dnaArray").is_err());
    }
}
