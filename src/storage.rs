/*!
 # Persistence layer

 Fixed-layout binary records on the storage medium, plus the
 directory-based template lifecycle. The on-medium layout:

 * `volume.bin` — one byte, level 0-10
 * `belManual.bin` — the four manual presets in one record
 * `tj_active_name.bin` — 32-byte name of the active template
 * `templates/<name>.bin` — template record
 * `templates/<name>/<0..6>` — per-day bell list records

 Medium availability is probed once when the storage handle is opened and
 cached; every operation checks that gate first and fails fast with
 [`Error::StorageUnavailable`] without touching the filesystem. Failures
 are surfaced once to the caller and never retried here.
*/

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, instrument, warn};

use crate::schedule::{
    BellEntry, BellList, BellTime, ManualPreset, ScheduleKind, ScheduleTemplate,
    MANUAL_PRESET_SLOTS, MAX_BELLS, MAX_NAME_LEN, MAX_TEMPLATES,
};
use crate::{Error, Result};

const FILE_VOLUME: &str = "volume.bin";
const FILE_MANUAL: &str = "belManual.bin";
const FILE_ACTIVE: &str = "tj_active_name.bin";
const DIR_TEMPLATES: &str = "templates";

const RECORD_VERSION: u8 = 1;
const NAME_FIELD: usize = 32;
const PATH_FIELD: usize = 128;
const DAY_SLOTS: usize = 7;

const ENTRY_LEN: usize = NAME_FIELD + 2 + PATH_FIELD;
const BELL_LIST_RECORD_LEN: usize = 2 + MAX_BELLS * ENTRY_LEN;
const TEMPLATE_RECORD_LEN: usize = 1 + NAME_FIELD + 1;
const PRESET_RECORD_LEN: usize = 1 + MANUAL_PRESET_SLOTS * (1 + NAME_FIELD + PATH_FIELD);

/// Result of a template enumeration: the records found plus the resolved
/// active-template name (rewritten on medium when the previous pointer no
/// longer matched anything)
#[derive(Debug)]
pub struct TemplateIndex {
    pub templates: Vec<ScheduleTemplate>,
    pub active: String,
}

/// Handle to the storage medium root
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    available: bool,
}

impl Storage {
    /// Opens the medium root, probing availability once. The probe also
    /// ensures the templates directory exists.
    pub fn open(root: impl Into<PathBuf>) -> Storage {
        let root = root.into();
        let available = root.is_dir() && fs::create_dir_all(root.join(DIR_TEMPLATES)).is_ok();
        if available {
            info!(root = %root.display(), "storage medium detected");
        } else {
            warn!(root = %root.display(), "storage medium not available");
        }
        Storage { root, available }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn guard(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::StorageUnavailable)
        }
    }

    fn templates_dir(&self) -> PathBuf {
        self.root.join(DIR_TEMPLATES)
    }

    fn template_record_path(&self, name: &str) -> PathBuf {
        self.templates_dir().join(format!("{name}.bin"))
    }

    fn template_dir_path(&self, name: &str) -> PathBuf {
        self.templates_dir().join(name)
    }

    fn day_slot_path(&self, name: &str, slot: usize) -> PathBuf {
        self.template_dir_path(name).join(slot.to_string())
    }

    // ── Volume ───────────────────────────────────────────────────────

    pub fn load_volume(&self) -> Result<u8> {
        self.guard()?;
        let path = self.root.join(FILE_VOLUME);
        let bytes = read_record(&path, 1)?;
        Ok(bytes[0].min(crate::audio::MAX_VOLUME))
    }

    pub fn store_volume(&self, level: u8) -> Result<()> {
        self.guard()?;
        let path = self.root.join(FILE_VOLUME);
        write_record(&path, &[level.min(crate::audio::MAX_VOLUME)])
    }

    // ── Manual presets ───────────────────────────────────────────────

    pub fn load_presets(&self) -> Result<[ManualPreset; MANUAL_PRESET_SLOTS]> {
        self.guard()?;
        let path = self.root.join(FILE_MANUAL);
        let bytes = read_record(&path, PRESET_RECORD_LEN)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        check_version(&path, read_u8(&path, &mut cursor)?)?;
        let mut presets: [ManualPreset; MANUAL_PRESET_SLOTS] = Default::default();
        for preset in presets.iter_mut() {
            preset.enabled = read_u8(&path, &mut cursor)? != 0;
            preset.name = read_fixed_str(&path, &mut cursor, NAME_FIELD)?;
            preset.audio_file = read_fixed_str(&path, &mut cursor, PATH_FIELD)?;
        }
        Ok(presets)
    }

    pub fn store_presets(&self, presets: &[ManualPreset; MANUAL_PRESET_SLOTS]) -> Result<()> {
        self.guard()?;
        let mut buf = Vec::with_capacity(PRESET_RECORD_LEN);
        buf.push(RECORD_VERSION);
        for preset in presets {
            buf.push(preset.enabled as u8);
            push_fixed_str(&mut buf, &preset.name, NAME_FIELD);
            push_fixed_str(&mut buf, &preset.audio_file, PATH_FIELD);
        }
        write_record(&self.root.join(FILE_MANUAL), &buf)
    }

    // ── Active template pointer ──────────────────────────────────────

    pub fn load_active_name(&self) -> Result<String> {
        self.guard()?;
        let path = self.root.join(FILE_ACTIVE);
        let bytes = read_record(&path, NAME_FIELD)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        read_fixed_str(&path, &mut cursor, NAME_FIELD)
    }

    pub fn store_active_name(&self, name: &str) -> Result<()> {
        self.guard()?;
        validate_name(name)?;
        let mut buf = Vec::with_capacity(NAME_FIELD);
        push_fixed_str(&mut buf, name, NAME_FIELD);
        debug!(name, "updating active template pointer");
        write_record(&self.root.join(FILE_ACTIVE), &buf)
    }

    // ── Template records ─────────────────────────────────────────────

    pub fn load_template(&self, name: &str) -> Result<ScheduleTemplate> {
        self.guard()?;
        validate_name(name)?;
        self.read_template_record(&self.template_record_path(name))
    }

    fn read_template_record(&self, path: &Path) -> Result<ScheduleTemplate> {
        let bytes = read_record(path, TEMPLATE_RECORD_LEN)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        check_version(path, read_u8(path, &mut cursor)?)?;
        let name = read_fixed_str(path, &mut cursor, NAME_FIELD)?;
        let kind = match read_u8(path, &mut cursor)? {
            0 => ScheduleKind::Daily,
            1 => ScheduleKind::Weekly,
            other => {
                return Err(Error::MalformedRecord {
                    path: path.to_path_buf(),
                    detail: format!("unknown schedule kind {other}"),
                })
            }
        };
        Ok(ScheduleTemplate { name, kind })
    }

    pub fn store_template(&self, template: &ScheduleTemplate) -> Result<()> {
        self.guard()?;
        validate_name(&template.name)?;
        let mut buf = Vec::with_capacity(TEMPLATE_RECORD_LEN);
        buf.push(RECORD_VERSION);
        push_fixed_str(&mut buf, &template.name, NAME_FIELD);
        buf.push(match template.kind {
            ScheduleKind::Daily => 0,
            ScheduleKind::Weekly => 1,
        });
        write_record(&self.template_record_path(&template.name), &buf)
    }

    // ── Bell lists ───────────────────────────────────────────────────

    pub fn load_bell_list(&self, template: &ScheduleTemplate, slot: usize) -> Result<BellList> {
        self.guard()?;
        validate_name(&template.name)?;
        debug_assert!(slot < DAY_SLOTS);
        let path = self.day_slot_path(&template.name, slot);
        let bytes = read_record(&path, BELL_LIST_RECORD_LEN)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        check_version(&path, read_u8(&path, &mut cursor)?)?;
        let count = read_u8(&path, &mut cursor)? as usize;
        if count > MAX_BELLS {
            return Err(Error::MalformedRecord {
                path,
                detail: format!("entry count {count} exceeds {MAX_BELLS}"),
            });
        }
        let mut list = BellList::new();
        for _ in 0..count {
            let name = read_fixed_str(&path, &mut cursor, NAME_FIELD)?;
            let code = cursor
                .read_u16::<LittleEndian>()
                .map_err(|source| Error::RecordIo {
                    path: path.clone(),
                    source,
                })?;
            let audio_file = read_fixed_str(&path, &mut cursor, PATH_FIELD)?;
            let time = BellTime::from_code(code).map_err(|_| Error::MalformedRecord {
                path: path.clone(),
                detail: format!("invalid time code {code}"),
            })?;
            list.insert(BellEntry {
                name,
                time,
                audio_file,
            })?;
        }
        Ok(list)
    }

    pub fn store_bell_list(
        &self,
        template: &ScheduleTemplate,
        slot: usize,
        list: &BellList,
    ) -> Result<()> {
        self.guard()?;
        validate_name(&template.name)?;
        debug_assert!(slot < DAY_SLOTS);
        let mut buf = Vec::with_capacity(BELL_LIST_RECORD_LEN);
        buf.push(RECORD_VERSION);
        buf.push(list.len() as u8);
        for entry in list.iter() {
            push_fixed_str(&mut buf, &entry.name, NAME_FIELD);
            buf.write_u16::<LittleEndian>(entry.time.code())
                .expect("vec write is infallible");
            push_fixed_str(&mut buf, &entry.audio_file, PATH_FIELD);
        }
        buf.resize(BELL_LIST_RECORD_LEN, 0);
        write_record(&self.day_slot_path(&template.name, slot), &buf)
    }

    // ── Template lifecycle ───────────────────────────────────────────

    /// Creates a template: record file, directory, and all seven day
    /// slots seeded with empty bell lists.
    ///
    /// Multi-step with no rollback: a failure partway leaves the template
    /// inconsistent on the medium, surfaced as
    /// [`Error::InconsistentTemplate`] and not silently repaired.
    #[instrument(skip(self, seed), fields(name = %seed.name))]
    pub fn create_template(&self, seed: &ScheduleTemplate) -> Result<()> {
        self.guard()?;
        validate_name(&seed.name)?;
        if self.template_record_path(&seed.name).exists() {
            return Err(Error::TemplateExists(seed.name.clone()));
        }
        if self.count_template_records()? >= MAX_TEMPLATES {
            return Err(Error::TemplateLimit(MAX_TEMPLATES));
        }

        self.store_template(seed)?;
        let dir = self.template_dir_path(&seed.name);
        fs::create_dir(&dir).map_err(|source| Error::InconsistentTemplate {
            name: seed.name.clone(),
            detail: format!("record written but directory creation failed: {source}"),
        })?;
        let empty = BellList::new();
        for slot in 0..DAY_SLOTS {
            self.store_bell_list(seed, slot, &empty)
                .map_err(|err| Error::InconsistentTemplate {
                    name: seed.name.clone(),
                    detail: format!("day slot {slot} seeding failed: {err}"),
                })?;
        }
        info!(name = %seed.name, kind = seed.kind.label(), "template created");
        Ok(())
    }

    /// Renames a template's record file and directory, rewrites the
    /// record with the new name, and updates the active pointer if and
    /// only if the renamed template was the active one.
    ///
    /// Fail-stop: a directory rename failure after the record rename
    /// leaves the two halves under different names.
    #[instrument(skip(self))]
    pub fn rename_template(&self, old: &str, new: &str) -> Result<()> {
        self.guard()?;
        validate_name(old)?;
        validate_name(new)?;
        if self.template_record_path(new).exists() {
            return Err(Error::TemplateExists(new.to_string()));
        }
        let template = self.load_template(old)?;

        let record_from = self.template_record_path(old);
        let record_to = self.template_record_path(new);
        fs::rename(&record_from, &record_to).map_err(|source| Error::RecordIo {
            path: record_from,
            source,
        })?;

        let dir_from = self.template_dir_path(old);
        let dir_to = self.template_dir_path(new);
        fs::rename(&dir_from, &dir_to).map_err(|source| Error::InconsistentTemplate {
            name: old.to_string(),
            detail: format!("record renamed but directory rename failed: {source}"),
        })?;

        self.store_template(&ScheduleTemplate {
            name: new.to_string(),
            kind: template.kind,
        })?;

        if self.load_active_name().unwrap_or_default() == old {
            self.store_active_name(new)?;
        }
        info!(old, new, "template renamed");
        Ok(())
    }

    /// Deletes a template: directory tree first, then the record file.
    /// If the tree removal fails the record file is left in place.
    #[instrument(skip(self))]
    pub fn delete_template(&self, name: &str) -> Result<()> {
        self.guard()?;
        validate_name(name)?;
        let dir = self.template_dir_path(name);
        fs::remove_dir_all(&dir).map_err(|source| Error::RecordIo { path: dir, source })?;
        let record = self.template_record_path(name);
        fs::remove_file(&record).map_err(|source| Error::RecordIo {
            path: record,
            source,
        })?;
        info!(name, "template deleted");
        Ok(())
    }

    /// Enumerates the templates directory in iteration order, skipping
    /// subdirectories (they hold per-day bell lists).
    ///
    /// Side effect: when `active` matches none of the enumerated
    /// templates, the last enumerated one is adopted as active and the
    /// pointer record rewritten — enumeration order is load-bearing.
    #[instrument(skip(self))]
    pub fn list_templates(&self, active: &str) -> Result<TemplateIndex> {
        self.guard()?;
        let dir = self.templates_dir();
        let mut templates = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|source| Error::RecordIo {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::RecordIo {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if templates.len() >= MAX_TEMPLATES {
                warn!(max = MAX_TEMPLATES, "template limit hit during enumeration");
                break;
            }
            match self.read_template_record(&path) {
                Ok(template) => templates.push(template),
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable template record"),
            }
        }

        let mut resolved = active.to_string();
        if !templates.iter().any(|t| t.name == resolved) {
            if let Some(last) = templates.last() {
                warn!(
                    missing = active,
                    adopted = %last.name,
                    "active template not found, adopting fallback"
                );
                resolved = last.name.clone();
                self.store_active_name(&resolved)?;
            }
        }
        Ok(TemplateIndex {
            templates,
            active: resolved,
        })
    }

    fn count_template_records(&self) -> Result<usize> {
        let dir = self.templates_dir();
        let entries = fs::read_dir(&dir).map_err(|source| Error::RecordIo {
            path: dir.clone(),
            source,
        })?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|source| Error::RecordIo {
                path: dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}

// ── Record encoding helpers ──────────────────────────────────────────

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn read_record(path: &Path, expected_len: usize) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| Error::RecordIo {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() != expected_len {
        return Err(Error::MalformedRecord {
            path: path.to_path_buf(),
            detail: format!("size {} (expected {expected_len})", bytes.len()),
        });
    }
    Ok(bytes)
}

fn write_record(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|source| Error::RecordIo {
        path: path.to_path_buf(),
        source,
    })
}

fn check_version(path: &Path, version: u8) -> Result<()> {
    if version != RECORD_VERSION {
        return Err(Error::MalformedRecord {
            path: path.to_path_buf(),
            detail: format!("record version {version} (expected {RECORD_VERSION})"),
        });
    }
    Ok(())
}

fn read_u8(path: &Path, cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor.read_u8().map_err(|source| Error::RecordIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a fixed-width NUL-padded string field
fn read_fixed_str(path: &Path, cursor: &mut Cursor<&[u8]>, width: usize) -> Result<String> {
    let start = cursor.position() as usize;
    let value = {
        let slice = *cursor.get_ref();
        if start + width > slice.len() {
            return Err(Error::MalformedRecord {
                path: path.to_path_buf(),
                detail: "truncated string field".to_string(),
            });
        }
        let field = &slice[start..start + width];
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        String::from_utf8_lossy(&field[..end]).into_owned()
    };
    cursor.set_position((start + width) as u64);
    Ok(value)
}

/// Appends a string as a fixed-width NUL-padded field
fn push_fixed_str(buf: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(width - 1);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + width - take, 0);
}
