use crate::actor::ActorId;
use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Day-partitioned sections of the archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Gold,
    Crafting,
    Transactions,
}

impl Section {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Section::Gold => "gold",
            Section::Crafting => "crafting",
            Section::Transactions => "transactions",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub unchanged: usize,
}

impl WriteStats {
    pub fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.unchanged
    }
}

/// Replace characters that cannot appear in file names. Names that would
/// resolve to the current or parent directory become `_`.
pub fn safe_name(name: &str) -> String {
    if name.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// The JSON archive rooted at one output directory.
#[derive(Clone, Debug)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new<P: Into<PathBuf>>(root: P) -> Archive {
        Archive { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<section>/YYYY/MM/DD.json`
    pub fn day_path(&self, section: Section, day: NaiveDate) -> PathBuf {
        self.root
            .join(section.dir_name())
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{:02}.json", day.day()))
    }

    /// `<root>/crafting/<server>/<character>.json`
    pub fn ledger_path(&self, requester: &ActorId) -> PathBuf {
        self.root
            .join(Section::Crafting.dir_name())
            .join(safe_name(&requester.server))
            .join(format!("{}.json", safe_name(&requester.name)))
    }

    pub fn chart_path(&self) -> PathBuf {
        self.root.join("transactions.png")
    }

    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(Error::json(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path)(e)),
        }
    }

    /// Serialize `value` and replace the file at `path` with it, unless the
    /// file already holds exactly these bytes. The new content goes to a
    /// sibling temp file first and is renamed into place.
    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<WriteOutcome> {
        let mut bytes = serde_json::to_vec_pretty(value).map_err(Error::json(path))?;
        bytes.push(b'\n');
        self.write_bytes(path, &bytes)
    }

    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<WriteOutcome> {
        if fs::read(path).map(|current| current == bytes).unwrap_or(false) {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes).map_err(Error::io(&tmp_path))?;
        fs::rename(&tmp_path, path).map_err(Error::io(path))?;

        tracing::debug!(path = %path.display(), "written");
        Ok(WriteOutcome::Written)
    }

    /// Read every `YYYY/MM/DD.json` file of a section, ordered by day.
    /// Anything else under the section directory is ignored.
    pub fn read_days<T: DeserializeOwned>(&self, section: Section) -> Result<BTreeMap<NaiveDate, T>> {
        let mut days = BTreeMap::new();
        let base = self.root.join(section.dir_name());

        for (year, year_dir) in numbered_entries(&base, 4)? {
            for (month, month_dir) in numbered_entries(&year_dir, 2)? {
                for (day, path) in numbered_entries(&month_dir, 2)? {
                    let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) else {
                        continue;
                    };
                    if let Some(value) = self.read(&path)? {
                        days.insert(date, value);
                    }
                }
            }
        }

        Ok(days)
    }
}

/// Directory entries named by a fixed-width number (`2024`, `06`,
/// `01.json`), with the number parsed out.
fn numbered_entries(dir: &Path, width: usize) -> Result<Vec<(u32, PathBuf)>> {
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir)(e)),
    };

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(Error::io(dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let stem = name.strip_suffix(".json").unwrap_or(name);
        if stem.len() != width || !stem.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(number) = stem.parse() {
            entries.push((number, entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use crate::actor::ActorId;
    use crate::archive::{safe_name, Archive, Section, WriteOutcome};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::fs;

    use anyhow::{anyhow, Result};

    #[test]
    fn paths() -> Result<()> {
        let archive = Archive::new("/out");
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).ok_or(anyhow!("invalid date"))?;
        assert_eq!(
            archive.day_path(Section::Gold, day).to_str(),
            Some("/out/gold/2024/06/01.json")
        );
        assert_eq!(
            archive
                .ledger_path(&ActorId::new("Foo", "Bar"))
                .to_str(),
            Some("/out/crafting/Bar/Foo.json")
        );
        assert_eq!(safe_name("a/b:c"), "a_b_c");
        assert_eq!(safe_name(".."), "_");
        assert_eq!(safe_name("."), "_");
        assert_eq!(safe_name(""), "_");
        assert_eq!(safe_name("Mr.Fix"), "Mr.Fix");

        // a requester parsed from `X-..` stays inside the crafting directory
        let requester = ActorId::try_from("X-..")?;
        assert_eq!(
            archive.ledger_path(&requester).to_str(),
            Some("/out/crafting/_/X.json")
        );
        Ok(())
    }

    #[test]
    fn write_is_idempotent() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = Archive::new(tmp.path());
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).ok_or(anyhow!("invalid date"))?;
        let path = archive.day_path(Section::Gold, day);
        let value: BTreeMap<&str, i64> = [("total", 1)].into_iter().collect();

        assert_eq!(archive.write(&path, &value)?, WriteOutcome::Written);
        let first = fs::read(&path)?;
        assert_eq!(archive.write(&path, &value)?, WriteOutcome::Unchanged);
        assert_eq!(fs::read(&path)?, first);
        assert!(!path.with_extension("tmp").exists());

        Ok(())
    }

    #[test]
    fn read_days_skips_foreign_entries() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = Archive::new(tmp.path());
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).ok_or(anyhow!("invalid date"))?;
        archive.write(&archive.day_path(Section::Crafting, day), &vec![1, 2])?;
        archive.write(&archive.ledger_path(&ActorId::new("Foo", "Bar")), &vec![3])?;
        fs::create_dir_all(tmp.path().join("crafting/2024/13"))?;

        let days: BTreeMap<NaiveDate, Vec<i64>> = archive.read_days(Section::Crafting)?;
        assert_eq!(days.len(), 1);
        assert_eq!(days[&day], vec![1, 2]);

        let none: BTreeMap<NaiveDate, Vec<i64>> = archive.read_days(Section::Gold)?;
        assert!(none.is_empty());
        Ok(())
    }
}
