//! Flat arena container laid out for memory mapping.
//!
//! The first 128 bytes are the header; everything else is reachable from
//! the root-object offset. Structures reference each other by file offset
//! only, never by pointer, so the arena can be grown and relocated. The
//! dirty byte is set for the whole write session and cleared on clean
//! close; finding it set on open means a writer crashed.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;

use crate::alignment::FORMAT_VERSION;
use crate::error::{HalError, Result};
use crate::storage::{check_version, wire, AccessMode, DataType, StorageBackend, MMAP_MAGIC};

const HEADER_SIZE: usize = 128;
const MMAP_FORMAT_VERSION: &str = "1.0";

const OFF_FORMAT: usize = 0;
const OFF_MMAP_VERSION: usize = 8;
const OFF_HAL_VERSION: usize = 16;
const OFF_NEXT: usize = 24;
const OFF_ROOT: usize = 32;
const OFF_DIRTY: usize = 40;

#[derive(Debug)]
pub struct MmapStore {
    path: PathBuf,
    mode: AccessMode,
    arrays: IndexMap<String, (DataType, Vec<u8>)>,
    meta: IndexMap<String, IndexMap<String, String>>,
}

fn write_header(buf: &mut [u8], next_offset: u64, root_offset: u64, dirty: bool) {
    buf[..HEADER_SIZE].fill(0);
    buf[OFF_FORMAT..OFF_FORMAT + MMAP_MAGIC.len()].copy_from_slice(MMAP_MAGIC);
    buf[OFF_MMAP_VERSION..OFF_MMAP_VERSION + MMAP_FORMAT_VERSION.len()]
        .copy_from_slice(MMAP_FORMAT_VERSION.as_bytes());
    buf[OFF_HAL_VERSION..OFF_HAL_VERSION + FORMAT_VERSION.len()]
        .copy_from_slice(FORMAT_VERSION.as_bytes());
    LittleEndian::write_u64(&mut buf[OFF_NEXT..OFF_NEXT + 8], next_offset);
    LittleEndian::write_u64(&mut buf[OFF_ROOT..OFF_ROOT + 8], root_offset);
    buf[OFF_DIRTY] = dirty as u8;
}

fn header_string(buf: &[u8], at: usize) -> String {
    let field = &buf[at..at + 8];
    let end = field.iter().position(|&b| b == 0).unwrap_or(8);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

impl MmapStore {
    pub fn create(path: &Path) -> Self {
        MmapStore {
            path: path.to_path_buf(),
            mode: AccessMode::Create,
            arrays: IndexMap::new(),
            meta: IndexMap::new(),
        }
    }

    /// Write a header-only file with the dirty byte set, so a session that
    /// dies before the first save is detectable as a crashed writer.
    pub fn write_placeholder(path: &Path) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE];
        write_header(&mut header, HEADER_SIZE as u64, HEADER_SIZE as u64, true);
        let mut file = File::create(path).map_err(|e| HalError::io(path, e))?;
        file.write_all(&header).map_err(|e| HalError::io(path, e))?;
        Ok(())
    }

    pub fn open(path: &Path, mode: AccessMode) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| HalError::io(path, e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| HalError::io(path, e))?;
        if bytes.len() < HEADER_SIZE {
            return Err(HalError::Format(format!(
                "{}: file size {} is less than the header size {HEADER_SIZE}",
                path.display(),
                bytes.len()
            )));
        }
        if &bytes[..MMAP_MAGIC.len()] != MMAP_MAGIC {
            return Err(HalError::Format(format!(
                "{}: invalid header, expected format name {:?}",
                path.display(),
                std::str::from_utf8(MMAP_MAGIC).unwrap()
            )));
        }
        let mmap_version = header_string(&bytes, OFF_MMAP_VERSION);
        check_version(path, &mmap_version)?;
        let hal_version = header_string(&bytes, OFF_HAL_VERSION);
        check_version(path, &hal_version)?;
        if bytes[OFF_DIRTY] != 0 {
            return Err(HalError::Format(format!(
                "{}: dirty bit is set; the file is most likely from a crashed \
                 writer and in an inconsistent state",
                path.display()
            )));
        }
        let next_offset = LittleEndian::read_u64(&bytes[OFF_NEXT..OFF_NEXT + 8]);
        let root_offset = LittleEndian::read_u64(&bytes[OFF_ROOT..OFF_ROOT + 8]);
        if next_offset < HEADER_SIZE as u64 || next_offset > bytes.len() as u64 {
            return Err(HalError::Format(format!(
                "{}: nextOffset out of bounds, probably corruption",
                path.display()
            )));
        }
        if root_offset < HEADER_SIZE as u64 || root_offset >= bytes.len() as u64 {
            return Err(HalError::Format(format!(
                "{}: rootOffset out of bounds, probably corruption",
                path.display()
            )));
        }
        // Root object: the array and metadata directory.
        let mut r = Cursor::new(&bytes[root_offset as usize..]);
        let mut arrays = IndexMap::new();
        let num_arrays = r
            .read_u32::<LittleEndian>()
            .map_err(|_| HalError::Format("truncated root object".into()))?;
        for _ in 0..num_arrays {
            let name = wire::read_string(&mut r)?;
            let code = r
                .read_u8()
                .map_err(|_| HalError::Format("truncated root object".into()))?;
            let stride = r
                .read_u32::<LittleEndian>()
                .map_err(|_| HalError::Format("truncated root object".into()))?;
            let dtype = DataType::from_parts(code, stride)?;
            let offset = r
                .read_u64::<LittleEndian>()
                .map_err(|_| HalError::Format("truncated root object".into()))?;
            let len = r
                .read_u64::<LittleEndian>()
                .map_err(|_| HalError::Format("truncated root object".into()))?;
            let end = offset.checked_add(len).filter(|&e| e <= bytes.len() as u64);
            let Some(end) = end else {
                return Err(HalError::Format(format!(
                    "{}: array {name} extends past end of file",
                    path.display()
                )));
            };
            arrays.insert(
                name,
                (dtype, bytes[offset as usize..end as usize].to_vec()),
            );
        }
        let mut meta = IndexMap::new();
        let num_groups = r
            .read_u32::<LittleEndian>()
            .map_err(|_| HalError::Format("truncated root object".into()))?;
        for _ in 0..num_groups {
            let group = wire::read_string(&mut r)?;
            let n = r
                .read_u32::<LittleEndian>()
                .map_err(|_| HalError::Format("truncated root object".into()))?;
            let mut entries = IndexMap::new();
            for _ in 0..n {
                let key = wire::read_string(&mut r)?;
                let value = wire::read_string(&mut r)?;
                entries.insert(key, value);
            }
            meta.insert(group, entries);
        }

        if mode == AccessMode::ReadWrite {
            // The write session starts now; mark the on-disk file dirty.
            let mut f = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| HalError::io(path, e))?;
            f.seek(SeekFrom::Start(OFF_DIRTY as u64))
                .map_err(|e| HalError::io(path, e))?;
            f.write_all(&[1]).map_err(|e| HalError::io(path, e))?;
        }

        Ok(MmapStore {
            path: path.to_path_buf(),
            mode,
            arrays,
            meta,
        })
    }
}

impl StorageBackend for MmapStore {
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
        // Arenas grow by appending at the cursor; a save lays the arrays
        // out in one pass and plants the directory last.
        let mut body: Vec<u8> = Vec::new();
        let mut directory: Vec<(String, DataType, u64, u64)> = Vec::new();
        for (name, (dtype, data)) in &self.arrays {
            // 8-byte alignment for record arrays
            while (HEADER_SIZE + body.len()) % 8 != 0 {
                body.push(0);
            }
            let offset = (HEADER_SIZE + body.len()) as u64;
            body.extend_from_slice(data);
            directory.push((name.clone(), *dtype, offset, data.len() as u64));
        }
        while (HEADER_SIZE + body.len()) % 8 != 0 {
            body.push(0);
        }
        let root_offset = (HEADER_SIZE + body.len()) as u64;
        let mut dir_bytes = Vec::new();
        dir_bytes
            .write_u32::<LittleEndian>(directory.len() as u32)
            .unwrap();
        for (name, dtype, offset, len) in &directory {
            wire::write_string(&mut dir_bytes, name).unwrap();
            dir_bytes.write_u8(dtype.code()).unwrap();
            dir_bytes.write_u32::<LittleEndian>(dtype.stride()).unwrap();
            dir_bytes.write_u64::<LittleEndian>(*offset).unwrap();
            dir_bytes.write_u64::<LittleEndian>(*len).unwrap();
        }
        dir_bytes
            .write_u32::<LittleEndian>(self.meta.len() as u32)
            .unwrap();
        for (group, entries) in &self.meta {
            wire::write_string(&mut dir_bytes, group).unwrap();
            dir_bytes
                .write_u32::<LittleEndian>(entries.len() as u32)
                .unwrap();
            for (k, v) in entries {
                wire::write_string(&mut dir_bytes, k).unwrap();
                wire::write_string(&mut dir_bytes, v).unwrap();
            }
        }

        let next_offset = root_offset + dir_bytes.len() as u64;
        let mut header = [0u8; HEADER_SIZE];
        write_header(&mut header, next_offset, root_offset, false);

        let mut file = File::create(&self.path).map_err(|e| HalError::io(&self.path, e))?;
        file.write_all(&header).map_err(|e| HalError::io(&self.path, e))?;
        file.write_all(&body).map_err(|e| HalError::io(&self.path, e))?;
        file.write_all(&dir_bytes)
            .map_err(|e| HalError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.hal");
        let mut store = MmapStore::create(&path);
        store.put_meta("Phylogeny", "tree", "(a:1)root;");
        store
            .put_array("Genomes/a/dnaArray", DataType::UInt8, vec![9, 8, 7])
            .unwrap();
        store.flush().unwrap();

        let loaded = MmapStore::open(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(
            loaded.meta_group("Phylogeny").get("tree").unwrap(),
            "(a:1)root;"
        );
        assert_eq!(loaded.get_array("Genomes/a/dnaArray").unwrap(), &[9, 8, 7]);
    }

    #[test]
    fn test_dirty_file_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashed.hal");
        MmapStore::write_placeholder(&path).unwrap();
        let err = MmapStore::open(&path, AccessMode::ReadOnly).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dirty"), "unexpected error: {msg}");
    }

    #[test]
    fn test_open_for_write_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.hal");
        let mut store = MmapStore::create(&path);
        store.put_meta("Meta", "k", "v");
        store.flush().unwrap();

        let _rw = MmapStore::open(&path, AccessMode::ReadWrite).unwrap();
        // Until the session saves again, the on-disk file is dirty.
        let err = MmapStore::open(&path, AccessMode::ReadOnly).unwrap_err();
        assert!(err.to_string().contains("dirty"));
    }
}
