// Library exports for halign
pub mod alignment;
pub mod chunked_store;
pub mod column_iter;
pub mod dna;
pub mod error;
pub mod genome;
pub mod liftover;
pub mod mapped_segment;
pub mod mmap_store;
pub mod paf_export;
pub mod position_cache;
pub mod randgen;
pub mod rearrangement;
pub mod segment;
pub mod segment_iter;
pub mod sequence;
pub mod stats;
pub mod storage;
pub mod tree;
pub mod validate;
