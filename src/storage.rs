use crate::error::StorageError;
use crate::prelude::*;
use crate::registry::{ChestRegistry, ContainerRecord, Half, Link};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

pub const STORE_FILE: &str = "chests.dat";

// On disk this is an uncompressed NBT compound holding a `chests` list. Loading reads
// the list as raw values and decodes each entry on its own, so one bad entry can be
// skipped without losing the rest of the file.
#[derive(Debug, Serialize, Deserialize)]
struct ChestFile<T> {
    #[serde(default = "Vec::new")]
    chests: Vec<T>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoredChest {
    #[serde(skip_serializing_if = "Option::is_none")]
    world: Option<String>,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    z: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<PlayerId>,
    #[serde(default)]
    experience: i32,
    #[serde(default)]
    expiry_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_time: Option<i64>,
    #[serde(default)]
    warning_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    linked_x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    linked_y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    linked_z: Option<i32>,
    #[serde(default)]
    linked_primary: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

impl StoredChest {
    fn from_record(pos: &BlockPos, record: &ContainerRecord) -> Self {
        let link = record.linked.as_ref();
        Self {
            world: Some(pos.world.clone()),
            x: pos.pos.x,
            y: pos.pos.y,
            z: pos.pos.z,
            owner: Some(record.owner),
            experience: record.stored_experience.min(i32::MAX as u32) as i32,
            expiry_time: record.expires_at,
            created_time: Some(record.created_at),
            warning_sent: record.warning_sent,
            linked_x: link.map(|l| l.partner.pos.x),
            linked_y: link.map(|l| l.partner.pos.y),
            linked_z: link.map(|l| l.partner.pos.z),
            linked_primary: matches!(link, Some(Link { half: Half::Primary, .. })),
        }
    }

    /// `Err` carries the reason the entry was skipped.
    fn into_record(self, world_exists: &dyn Fn(&str) -> bool, now: Millis) -> Result<(BlockPos, ContainerRecord, Option<Link>), String> {
        let world = self.world.ok_or("no world")?;
        if !world_exists(&world) {
            return Err(format!("unknown world {world:?}"));
        }
        let owner = self.owner.ok_or("no owner")?;
        if self.expiry_time < 0 || self.experience < 0 {
            return Err("negative expiry or experience".into());
        }
        if self.expiry_time > 0 && self.expiry_time <= now {
            return Err("already expired".into());
        }
        let pos = BlockPos::new(world, self.x, self.y, self.z);
        let created_at = match (self.created_time, self.expiry_time) {
            (Some(created), 0) => created,
            (Some(created), expiry) => created.min(expiry),
            (None, 0) => now,
            (None, expiry) => now.min(expiry),
        };
        let mut record = ContainerRecord::new(owner, self.experience as u32, created_at, self.expiry_time);
        record.warning_sent = self.warning_sent;
        let link = match (self.linked_x, self.linked_y, self.linked_z) {
            (Some(x), Some(y), Some(z)) => Some(Link {
                partner: BlockPos::new(pos.world.clone(), x, y, z),
                half: if self.linked_primary { Half::Primary } else { Half::Secondary },
            }),
            _ => None,
        };
        Ok((pos, record, link))
    }
}

impl ChestRegistry {
    /// Writes every record that hasn't expired by `now`.
    pub fn save(&self, mut sink: impl Write, now: Millis) -> Result<usize, StorageError> {
        let file = ChestFile {
            chests: self.snapshot().iter()
                .filter(|(_, record)| !record.is_expired(now))
                .map(|(pos, record)| StoredChest::from_record(pos, record))
                .collect(),
        };
        let bytes = fastnbt::to_bytes(&file)?;
        sink.write_all(&bytes).map_err(|source| StorageError::Io { path: STORE_FILE.into(), source })?;
        Ok(file.chests.len())
    }

    /// Registers every valid entry from `source`. Bad entries are logged and skipped.
    pub fn load(&mut self, mut source: impl Read, world_exists: &dyn Fn(&str) -> bool, now: Millis) -> Result<LoadReport, StorageError> {
        let mut bytes = vec![];
        source.read_to_end(&mut bytes).map_err(|source| StorageError::Io { path: STORE_FILE.into(), source })?;
        let file: ChestFile<fastnbt::Value> = fastnbt::from_bytes(&bytes)?;

        let mut report = LoadReport::default();
        let mut links = HashMap::new();
        for (i, value) in file.chests.iter().enumerate() {
            let entry = fastnbt::from_value::<StoredChest>(value).map_err(|e| format!("unreadable entry: {e}"));
            match entry.and_then(|entry| entry.into_record(world_exists, now)) {
                Ok((pos, record, link)) => {
                    log::debug!("loaded death chest at {pos} for {}", record.owner);
                    if let Some(link) = link {
                        links.insert(pos.clone(), link);
                    }
                    self.register(pos, record);
                    report.loaded += 1;
                }
                Err(reason) => {
                    log::warn!("skipping stored death chest #{i}: {reason}");
                    report.skipped += 1;
                }
            }
        }
        self.restore_links(links);
        log::info!("loaded {} death chests from storage ({} skipped)", report.loaded, report.skipped);
        Ok(report)
    }

    // Only pairs whose halves both made it back and name each other get relinked.
    fn restore_links(&mut self, links: HashMap<BlockPos, Link>) {
        for (primary, link) in &links {
            if link.half != Half::Primary {
                continue;
            }
            let secondary = &link.partner;
            let points_back = links.get(secondary)
                .map_or(false, |back| back.half == Half::Secondary && back.partner == *primary);
            let matching = match (self.lookup(primary), self.lookup(secondary)) {
                (Some(a), Some(b)) => a.owner == b.owner && a.expires_at == b.expires_at,
                _ => false,
            };
            if !points_back || !matching {
                log::warn!("twin chest at {primary} lost its other half, keeping it as a single chest");
                continue;
            }
            self.link(primary, secondary);
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>, now: Millis) -> Result<usize, StorageError> {
        let path = path.as_ref();
        let io_err = |source| StorageError::Io { path: path.to_owned(), source };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        // write next to the target and swap in, so a failed save never truncates the old file
        let tmp = path.with_extension("dat.tmp");
        let mut buf = vec![];
        let count = self.save(&mut buf, now)?;
        std::fs::write(&tmp, &buf).map_err(|source| StorageError::Io { path: tmp.clone(), source })?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        log::debug!("saved {count} death chests to {}", path.display());
        Ok(count)
    }

    /// A missing file is an empty store.
    pub fn load_from(&mut self, path: impl AsRef<Path>, world_exists: &dyn Fn(&str) -> bool, now: Millis) -> Result<LoadReport, StorageError> {
        let path = path.as_ref();
        match std::fs::File::open(path) {
            Ok(file) => self.load(std::io::BufReader::new(file), world_exists, now),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LoadReport::default()),
            Err(source) => Err(StorageError::Io { path: path.to_owned(), source }),
        }
    }
}
