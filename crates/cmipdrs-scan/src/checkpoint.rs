//! Periodic persistence of the inventory during long scans.

use std::path::{Path, PathBuf};

use cmipdrs_core::{ArchiveError, Era, Inventory, Result, read_json, write_json};

/// Writes the inventory every few directories, optionally rotating shards.
///
/// Output files are named `<ERA>_<NNN>.json`. Without sharding only
/// `<ERA>_000.json` is ever written. With sharding, directory entries are
/// dropped from memory once their shard is full; counters and buckets carry
/// over into the next shard.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    output_dir: PathBuf,
    era: Era,
    checkpoint_every: usize,
    shard_every: Option<usize>,
    shard: usize,
    dirs_since_write: usize,
    dirs_in_shard: usize,
    written: Vec<PathBuf>,
}

impl Checkpointer {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        era: Era,
        checkpoint_every: usize,
        shard_every: Option<usize>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            era,
            checkpoint_every: checkpoint_every.max(1),
            shard_every: shard_every.filter(|&n| n > 0),
            shard: 0,
            dirs_since_write: 0,
            dirs_in_shard: 0,
            written: Vec::new(),
        }
    }

    /// Path of the shard currently being filled.
    pub fn current_path(&self) -> PathBuf {
        shard_path(&self.output_dir, self.era, self.shard)
    }

    /// Shards written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Call after each directory has been merged into the inventory.
    pub fn directory_done(&mut self, inventory: &mut Inventory) -> Result<()> {
        self.dirs_since_write += 1;
        self.dirs_in_shard += 1;

        let shard_full = self.shard_every.is_some_and(|n| self.dirs_in_shard >= n);
        if shard_full || self.dirs_since_write >= self.checkpoint_every {
            self.write(inventory)?;
        }
        if shard_full {
            self.shard += 1;
            self.dirs_in_shard = 0;
            inventory.take_directories();
            tracing::info!(shard = self.shard, "rotated inventory shard");
        }
        Ok(())
    }

    /// Final write at the end of a scan.
    pub fn finish(&mut self, inventory: &Inventory) -> Result<PathBuf> {
        self.write(inventory)?;
        Ok(self.current_path())
    }

    fn write(&mut self, inventory: &Inventory) -> Result<()> {
        let path = self.current_path();
        write_json(&path, inventory)?;
        tracing::info!(
            path = %path.display(),
            directories = inventory.directories().len(),
            files = inventory.file_count(),
            "checkpoint written"
        );
        if !self.written.contains(&path) {
            self.written.push(path);
        }
        self.dirs_since_write = 0;
        Ok(())
    }
}

/// `<dir>/<ERA>_<NNN>.json`
pub fn shard_path(output_dir: &Path, era: Era, shard: usize) -> PathBuf {
    output_dir.join(format!("{era}_{shard:03}.json"))
}

/// Existing shards of an era in `output_dir`, in shard order.
pub fn find_shards(output_dir: &Path, era: Era) -> Result<Vec<PathBuf>> {
    let prefix = format!("{era}_");
    let entries = std::fs::read_dir(output_dir).map_err(|e| ArchiveError::io(output_dir, e))?;
    let mut shards: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|n| n.strip_suffix(".json"))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect();
    shards.sort();
    Ok(shards)
}

/// Load inventories and merge them in order.
pub fn load_inventories(paths: &[PathBuf]) -> Result<Inventory> {
    let mut merged = Inventory::new();
    for path in paths {
        let shard: Inventory = read_json(path)?;
        tracing::debug!(path = %path.display(), directories = shard.directories().len(), "loaded inventory");
        merged.merge(shard);
    }
    Ok(merged)
}
