use anyhow::Result;
use docrag_core::error::Error;
use docrag_index::{l2_normalize, snapshot, FlatIndex};

fn unit(values: &[f32]) -> Vec<f32> {
    l2_normalize(values).expect("non-zero")
}

#[test]
fn snapshot_round_trip_preserves_positions() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("index.bin");

    let mut index = FlatIndex::new(3);
    index.append(4, &unit(&[1.0, 0.0, 0.0]))?;
    index.append(9, &unit(&[0.0, 1.0, 1.0]))?;
    index.rebuild(vec![(9, unit(&[0.0, 1.0, 1.0])), (12, unit(&[1.0, 1.0, 1.0]))])?;
    snapshot::save(&index, &path)?;

    let loaded = snapshot::load(&path)?.expect("snapshot exists");
    assert_eq!(loaded, index);
    assert_eq!(loaded.chunk_ids(), &[9, 12]);
    assert_eq!(loaded.generation(), 1);

    let hits = loaded.search(&unit(&[0.0, 1.0, 1.0]), 1)?;
    assert_eq!((hits[0].position, hits[0].chunk_id), (0, 9));
    Ok(())
}

#[test]
fn corrupted_snapshot_is_reported() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("index.bin");

    let mut index = FlatIndex::new(2);
    index.append(1, &unit(&[1.0, 1.0]))?;
    snapshot::save(&index, &path)?;

    let mut bytes = std::fs::read(&path)?;
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x5a;
    std::fs::write(&path, &bytes)?;
    assert!(matches!(snapshot::load(&path), Err(Error::IndexCorrupt(_))));

    std::fs::write(&path, b"not an index")?;
    assert!(matches!(snapshot::load(&path), Err(Error::IndexCorrupt(_))));
    Ok(())
}

#[test]
fn empty_index_round_trips() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("empty.bin");
    snapshot::save(&FlatIndex::new(384), &path)?;
    let loaded = snapshot::load(&path)?.expect("snapshot exists");
    assert!(loaded.is_empty());
    assert_eq!(loaded.dim(), 384);
    Ok(())
}
