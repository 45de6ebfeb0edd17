//! Storage backend contract and the record codec shared by both backends.
//!
//! The backends know nothing about genomes or trees: they hold named typed
//! arrays and small key-value metadata groups inside a single file. The
//! alignment is laid out under well-known names:
//!
//! - `Meta/` — free-form attributes
//! - `Phylogeny/` — the Newick tree string
//! - `Version/` — semantic `major.minor` format version
//! - `Genomes/<name>/{dnaArray,topArray,bottomArray,sequenceIdxArray,
//!   sequenceNameArray}` plus a `Genomes/<name>/meta` group

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;

use crate::alignment::{Alignment, FORMAT_VERSION};
use crate::chunked_store::ChunkedStore;
use crate::dna::DnaArray;
use crate::error::{HalError, Result};
use crate::genome::Genome;
use crate::mmap_store::MmapStore;
use crate::segment::{BottomSegmentData, ChildRef, TopSegmentData};
use crate::sequence::Sequence;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Chunked, deflate-compressed container for long-term storage.
    Chunked,
    /// Flat arena file laid out for memory mapping; fastest to create.
    Mmap,
}

/// Element types a backend can store. The compound types carry their
/// record stride so a backend can chunk on record boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    UInt8,
    TopRecord { stride: u32 },
    BottomRecord { stride: u32 },
    SequenceRecord { stride: u32 },
}

impl DataType {
    pub fn code(&self) -> u8 {
        match self {
            DataType::UInt8 => 0,
            DataType::TopRecord { .. } => 1,
            DataType::BottomRecord { .. } => 2,
            DataType::SequenceRecord { .. } => 3,
        }
    }

    pub fn stride(&self) -> u32 {
        match self {
            DataType::UInt8 => 1,
            DataType::TopRecord { stride }
            | DataType::BottomRecord { stride }
            | DataType::SequenceRecord { stride } => *stride,
        }
    }

    pub fn from_parts(code: u8, stride: u32) -> Result<Self> {
        match code {
            0 => Ok(DataType::UInt8),
            1 => Ok(DataType::TopRecord { stride }),
            2 => Ok(DataType::BottomRecord { stride }),
            3 => Ok(DataType::SequenceRecord { stride }),
            _ => Err(HalError::Format(format!("unknown datatype code {code}"))),
        }
    }
}

/// What the core needs from a container: named typed arrays with chunked
/// I/O and small metadata groups. Implementations own their page cache;
/// the core never sees file offsets.
pub trait StorageBackend {
    fn mode(&self) -> AccessMode;
    fn put_array(&mut self, name: &str, dtype: DataType, data: Vec<u8>) -> Result<()>;
    fn get_array(&self, name: &str) -> Result<&[u8]>;
    fn has_array(&self, name: &str) -> bool;
    fn put_meta(&mut self, group: &str, key: &str, value: &str);
    fn meta_group(&self, group: &str) -> IndexMap<String, String>;
    /// Write everything through to the file.
    fn flush(&mut self) -> Result<()>;
}

pub const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";
pub const MMAP_MAGIC: &[u8] = b"HAL-MMAP";

/// Sniff the first bytes of a file to pick the backend.
pub fn detect(path: &Path) -> Result<BackendKind> {
    let mut file = File::open(path).map_err(|e| HalError::io(path, e))?;
    let mut head = [0u8; 9];
    let n = file.read(&mut head).map_err(|e| HalError::io(path, e))?;
    if n >= 8 && head.starts_with(MMAP_MAGIC) {
        Ok(BackendKind::Mmap)
    } else if n >= 5 && head.starts_with(&HDF5_MAGIC[..5]) {
        Ok(BackendKind::Chunked)
    } else {
        Err(HalError::Format(format!(
            "{} is neither a chunked nor a memory-mapped alignment file",
            path.display()
        )))
    }
}

/// Refuse files written by a strictly newer major format version.
pub fn check_version(path: &Path, found: &str) -> Result<()> {
    let major = |v: &str| -> u32 {
        v.split('.')
            .next()
            .and_then(|m| m.parse().ok())
            .unwrap_or(0)
    };
    if major(found) > major(FORMAT_VERSION) {
        return Err(HalError::Format(format!(
            "{} was written with format version {found}, newer than supported {FORMAT_VERSION}",
            path.display()
        )));
    }
    Ok(())
}

/// Reserve an mmap file at create time so the dirty bit covers the whole
/// session.
pub fn mark_created(path: &Path) -> Result<()> {
    MmapStore::write_placeholder(path)
}

/// Load an alignment from `path`, sniffing the format.
pub fn load(
    path: &Path,
    mode: AccessMode,
) -> Result<(Tree, Vec<Genome>, IndexMap<String, String>, BackendKind)> {
    let kind = detect(path)?;
    let store: Box<dyn StorageBackend> = match kind {
        BackendKind::Chunked => Box::new(ChunkedStore::open(path, mode)?),
        BackendKind::Mmap => Box::new(MmapStore::open(path, mode)?),
    };
    let (tree, genomes, meta) = read_alignment(store.as_ref(), path)?;
    Ok((tree, genomes, meta, kind))
}

/// Save an alignment to `path` with the requested backend.
pub fn save(aln: &Alignment, path: &Path, kind: BackendKind) -> Result<()> {
    let mut store: Box<dyn StorageBackend> = match kind {
        BackendKind::Chunked => Box::new(ChunkedStore::create(path)),
        BackendKind::Mmap => Box::new(MmapStore::create(path)),
    };
    write_alignment(aln, store.as_mut())?;
    store.flush()
}

const TOP_STRIDE: usize = 33;
const BOTTOM_FIXED: usize = 24;
const CHILD_STRIDE: usize = 9;
const SEQ_STRIDE: usize = 48;

fn encode_tops(tops: &[TopSegmentData]) -> Vec<u8> {
    let mut out = vec![0u8; tops.len() * TOP_STRIDE];
    for (i, t) in tops.iter().enumerate() {
        let rec = &mut out[i * TOP_STRIDE..(i + 1) * TOP_STRIDE];
        LittleEndian::write_i64(&mut rec[0..8], t.start);
        LittleEndian::write_u64(&mut rec[8..16], t.length);
        LittleEndian::write_i64(&mut rec[16..24], t.parent_index);
        LittleEndian::write_i64(&mut rec[24..32], t.bottom_parse_index);
        rec[32] = t.parent_reversed as u8;
    }
    // paralogy links ride in a trailer after the fixed records
    let mut trailer = vec![0u8; tops.len() * 8];
    for (i, t) in tops.iter().enumerate() {
        LittleEndian::write_i64(&mut trailer[i * 8..(i + 1) * 8], t.next_paralogy_index);
    }
    out.extend_from_slice(&trailer);
    out
}

fn decode_tops(data: &[u8]) -> Result<Vec<TopSegmentData>> {
    let n = data.len() / (TOP_STRIDE + 8);
    if n * (TOP_STRIDE + 8) != data.len() {
        return Err(HalError::Format("topArray has a partial record".into()));
    }
    let trailer = &data[n * TOP_STRIDE..];
    let mut tops = Vec::with_capacity(n);
    for i in 0..n {
        let rec = &data[i * TOP_STRIDE..(i + 1) * TOP_STRIDE];
        tops.push(TopSegmentData {
            start: LittleEndian::read_i64(&rec[0..8]),
            length: LittleEndian::read_u64(&rec[8..16]),
            parent_index: LittleEndian::read_i64(&rec[16..24]),
            bottom_parse_index: LittleEndian::read_i64(&rec[24..32]),
            parent_reversed: rec[32] != 0,
            next_paralogy_index: LittleEndian::read_i64(&trailer[i * 8..(i + 1) * 8]),
        });
    }
    Ok(tops)
}

fn encode_bottoms(bottoms: &[BottomSegmentData], num_children: usize) -> Vec<u8> {
    let stride = BOTTOM_FIXED + CHILD_STRIDE * num_children;
    let mut out = vec![0u8; bottoms.len() * stride];
    for (i, b) in bottoms.iter().enumerate() {
        let rec = &mut out[i * stride..(i + 1) * stride];
        LittleEndian::write_i64(&mut rec[0..8], b.start);
        LittleEndian::write_u64(&mut rec[8..16], b.length);
        LittleEndian::write_i64(&mut rec[16..24], b.top_parse_index);
        for (c, child) in b.children.iter().enumerate() {
            let slot = &mut rec[BOTTOM_FIXED + c * CHILD_STRIDE..BOTTOM_FIXED + (c + 1) * CHILD_STRIDE];
            LittleEndian::write_i64(&mut slot[0..8], child.index);
            slot[8] = child.reversed as u8;
        }
    }
    out
}

fn decode_bottoms(data: &[u8], num_children: usize) -> Result<Vec<BottomSegmentData>> {
    let stride = BOTTOM_FIXED + CHILD_STRIDE * num_children;
    if data.len() % stride != 0 {
        return Err(HalError::Format("bottomArray has a partial record".into()));
    }
    let n = data.len() / stride;
    let mut bottoms = Vec::with_capacity(n);
    for i in 0..n {
        let rec = &data[i * stride..(i + 1) * stride];
        let mut children = Vec::with_capacity(num_children);
        for c in 0..num_children {
            let slot = &rec[BOTTOM_FIXED + c * CHILD_STRIDE..BOTTOM_FIXED + (c + 1) * CHILD_STRIDE];
            children.push(ChildRef {
                index: LittleEndian::read_i64(&slot[0..8]),
                reversed: slot[8] != 0,
            });
        }
        bottoms.push(BottomSegmentData {
            start: LittleEndian::read_i64(&rec[0..8]),
            length: LittleEndian::read_u64(&rec[8..16]),
            top_parse_index: LittleEndian::read_i64(&rec[16..24]),
            children,
        });
    }
    Ok(bottoms)
}

fn encode_sequences(seqs: &[Sequence]) -> (Vec<u8>, Vec<u8>) {
    let mut idx = vec![0u8; seqs.len() * SEQ_STRIDE];
    let mut names = Vec::new();
    for (i, s) in seqs.iter().enumerate() {
        let rec = &mut idx[i * SEQ_STRIDE..(i + 1) * SEQ_STRIDE];
        LittleEndian::write_i64(&mut rec[0..8], s.start);
        LittleEndian::write_u64(&mut rec[8..16], s.length);
        LittleEndian::write_u64(&mut rec[16..24], s.top_start as u64);
        LittleEndian::write_u64(&mut rec[24..32], s.num_tops as u64);
        LittleEndian::write_u64(&mut rec[32..40], s.bottom_start as u64);
        LittleEndian::write_u64(&mut rec[40..48], s.num_bottoms as u64);
        names.extend_from_slice(s.name.as_bytes());
        names.push(0);
    }
    (idx, names)
}

fn decode_sequences(idx: &[u8], names: &[u8]) -> Result<Vec<Sequence>> {
    if idx.len() % SEQ_STRIDE != 0 {
        return Err(HalError::Format("sequenceIdxArray has a partial record".into()));
    }
    let n = idx.len() / SEQ_STRIDE;
    let mut name_iter = names.split(|&b| b == 0);
    let mut seqs = Vec::with_capacity(n);
    for i in 0..n {
        let rec = &idx[i * SEQ_STRIDE..(i + 1) * SEQ_STRIDE];
        let name = name_iter
            .next()
            .ok_or_else(|| HalError::Format("sequenceNameArray too short".into()))?;
        seqs.push(Sequence {
            name: String::from_utf8_lossy(name).into_owned(),
            start: LittleEndian::read_i64(&rec[0..8]),
            length: LittleEndian::read_u64(&rec[8..16]),
            top_start: LittleEndian::read_u64(&rec[16..24]) as usize,
            num_tops: LittleEndian::read_u64(&rec[24..32]) as usize,
            bottom_start: LittleEndian::read_u64(&rec[32..40]) as usize,
            num_bottoms: LittleEndian::read_u64(&rec[40..48]) as usize,
        });
    }
    Ok(seqs)
}

/// Lay an alignment out into a backend's arrays and metadata groups.
pub fn write_alignment(aln: &Alignment, store: &mut dyn StorageBackend) -> Result<()> {
    for (k, v) in aln.meta() {
        store.put_meta("Meta", k, v);
    }
    store.put_meta("Phylogeny", "tree", &aln.newick());
    store.put_meta("Version", "version", FORMAT_VERSION);
    let tree = aln.tree();
    for id in tree.ids() {
        let genome = aln.genome(id);
        let prefix = format!("Genomes/{}", genome.name());
        for (k, v) in genome.meta() {
            store.put_meta(&format!("{prefix}/meta"), k, v);
        }
        store.put_meta(
            &format!("{prefix}/meta"),
            "numChildSlots",
            &genome.num_child_slots().to_string(),
        );
        store.put_array(
            &format!("{prefix}/dnaArray"),
            DataType::UInt8,
            genome.dna().as_bytes().to_vec(),
        )?;
        let (idx, names) = encode_sequences(genome.sequences());
        store.put_array(
            &format!("{prefix}/sequenceIdxArray"),
            DataType::SequenceRecord { stride: SEQ_STRIDE as u32 },
            idx,
        )?;
        store.put_array(&format!("{prefix}/sequenceNameArray"), DataType::UInt8, names)?;
        store.put_array(
            &format!("{prefix}/topArray"),
            DataType::TopRecord { stride: TOP_STRIDE as u32 },
            encode_tops(genome.tops()),
        )?;
        store.put_array(
            &format!("{prefix}/bottomArray"),
            DataType::BottomRecord {
                stride: (BOTTOM_FIXED + CHILD_STRIDE * genome.num_child_slots()) as u32,
            },
            encode_bottoms(genome.bottoms(), genome.num_child_slots()),
        )?;
    }
    Ok(())
}

/// Length-prefixed wire helpers shared by the two container formats.
pub(crate) mod wire {
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use std::io::{Read, Write};

    use crate::error::{HalError, Result};

    pub fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(s.len() as u32)?;
        w.write_all(s.as_bytes())
    }

    pub fn read_string<R: Read>(r: &mut R) -> Result<String> {
        let len = r
            .read_u32::<LittleEndian>()
            .map_err(|_| HalError::Format("truncated string length".into()))?;
        if len > (1 << 20) {
            return Err(HalError::Format(format!("implausible string length {len}")));
        }
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)
            .map_err(|_| HalError::Format("truncated string".into()))?;
        String::from_utf8(buf).map_err(|_| HalError::Format("string is not utf-8".into()))
    }
}

/// Rebuild the model from a backend.
pub fn read_alignment(
    store: &dyn StorageBackend,
    path: &Path,
) -> Result<(Tree, Vec<Genome>, IndexMap<String, String>)> {
    let version = store
        .meta_group("Version")
        .get("version")
        .cloned()
        .unwrap_or_else(|| "0.0".to_string());
    check_version(path, &version)?;
    let newick = store
        .meta_group("Phylogeny")
        .get("tree")
        .cloned()
        .ok_or_else(|| HalError::Format("missing Phylogeny group".into()))?;
    let tree = Tree::from_newick(&newick)?;
    let meta = store.meta_group("Meta");

    let mut genomes = Vec::with_capacity(tree.len());
    for id in tree.ids() {
        let name = tree.name(id);
        let prefix = format!("Genomes/{name}");
        let gmeta = store.meta_group(&format!("{prefix}/meta"));
        let num_children: usize = gmeta
            .get("numChildSlots")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| tree.num_children(id));
        if num_children != tree.num_children(id) {
            return Err(HalError::InvariantViolation(format!(
                "genome {name} has {num_children} child slots but {} tree children",
                tree.num_children(id)
            )));
        }
        let idx = store.get_array(&format!("{prefix}/sequenceIdxArray"))?;
        let names = store.get_array(&format!("{prefix}/sequenceNameArray"))?;
        let sequences = decode_sequences(idx, names)?;
        let length: u64 = sequences.iter().map(|s| s.length).sum();
        let dna = DnaArray::from_bytes(
            store.get_array(&format!("{prefix}/dnaArray"))?.to_vec(),
            length,
        )?;
        let tops = decode_tops(store.get_array(&format!("{prefix}/topArray"))?)?;
        let bottoms =
            decode_bottoms(store.get_array(&format!("{prefix}/bottomArray"))?, num_children)?;
        let mut genome = Genome::new(name);
        let mut gm = gmeta.clone();
        gm.shift_remove("numChildSlots");
        *genome.meta_mut() = gm;
        genome.set_arrays(sequences, dna, tops, bottoms, num_children);
        genomes.push(genome);
    }
    Ok((tree, genomes, meta))
}
