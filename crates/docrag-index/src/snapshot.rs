//! On-disk snapshot of a [`FlatIndex`].
//!
//! Layout: 4-byte magic, 32-byte blake3 digest of the payload, then the
//! bincode-encoded payload (dimension, generation, position → chunk table and
//! the flat vector buffer). Writes go to a sibling temp file that is renamed
//! over the target, so a crash never leaves a half-written snapshot behind.

use bincode::{Decode, Encode};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use docrag_core::error::{Error, Result};
use docrag_core::types::ChunkId;

use crate::flat::FlatIndex;

const MAGIC: &[u8; 4] = b"DRIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + blake3::OUT_LEN;

#[derive(Debug, Encode, Decode)]
struct Snapshot {
    version: u32,
    dim: u64,
    generation: u64,
    chunk_ids: Vec<ChunkId>,
    data: Vec<f32>,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn encode(index: &FlatIndex) -> Result<Vec<u8>> {
    let snapshot = Snapshot {
        version: FORMAT_VERSION,
        dim: index.dim() as u64,
        generation: index.generation(),
        chunk_ids: index.chunk_ids().to_vec(),
        data: index.raw_data().to_vec(),
    };
    let payload = bincode::encode_to_vec(&snapshot, bincode::config::standard())
        .map_err(|e| Error::Operation(format!("encode index snapshot: {e}")))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(blake3::hash(&payload).as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<FlatIndex> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::IndexCorrupt("missing snapshot header".into()));
    }
    let (digest, payload) = bytes[MAGIC.len()..].split_at(blake3::OUT_LEN);
    if blake3::hash(payload).as_bytes() != digest {
        return Err(Error::IndexCorrupt("snapshot checksum mismatch".into()));
    }
    let (snapshot, _): (Snapshot, usize) = bincode::decode_from_slice(payload, bincode::config::standard())
        .map_err(|e| Error::IndexCorrupt(format!("undecodable snapshot: {e}")))?;
    if snapshot.version != FORMAT_VERSION {
        return Err(Error::IndexCorrupt(format!("unsupported snapshot version {}", snapshot.version)));
    }
    FlatIndex::from_parts(snapshot.dim as usize, snapshot.generation, snapshot.chunk_ids, snapshot.data)
}

/// Persist `index` at `path`, replacing any previous snapshot.
pub fn save(index: &FlatIndex, path: &Path) -> Result<()> {
    let bytes = encode(index)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(Error::storage)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes).map_err(Error::storage)?;
    fs::rename(&tmp, path).map_err(Error::storage)?;
    debug!(path = %path.display(), entries = index.len(), generation = index.generation(), "index snapshot saved");
    Ok(())
}

/// Load a snapshot; `Ok(None)` when no snapshot exists yet.
pub fn load(path: &Path) -> Result<Option<FlatIndex>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::IndexCorrupt(format!("unreadable snapshot {}: {e}", path.display()))),
    };
    decode(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::l2_normalize;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(4);
        index.append(1, &l2_normalize(&[1.0, 2.0, 3.0, 4.0]).unwrap()).unwrap();
        index.append(5, &l2_normalize(&[0.0, 1.0, 0.0, 1.0]).unwrap()).unwrap();
        index
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut bytes = encode(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn truncated_or_foreign_bytes_are_corrupt() {
        assert!(matches!(decode(b"DRIX"), Err(Error::IndexCorrupt(_))));
        assert!(matches!(decode(&[0u8; 64]), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn save_overwrites_and_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/index.bin");
        let mut index = sample();
        save(&index, &path).unwrap();
        index.clear();
        save(&index, &path).unwrap();
        let loaded = load(&path).unwrap().expect("snapshot");
        assert!(loaded.is_empty());
        assert_eq!(loaded.generation(), 1);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(&tmp.path().join("absent.bin")).unwrap().is_none());
    }
}
