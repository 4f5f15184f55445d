use std::collections::{BTreeMap, BTreeSet};

use linkbot_backend::FirmwareVersion;
use log::debug;

const HEX_EXTENSION: &str = ".hex";
const EEPROM_EXTENSION: &str = ".eeprom";

/// A file name split at its last `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitFilename<'a> {
    pub stem: &'a str,
    /// Includes the leading dot. `None` when the name has no dot past its
    /// first character, so a dotfile like `.hex` is all stem.
    pub extension: Option<&'a str>,
}

#[must_use]
pub fn split_filename(name: &str) -> SplitFilename<'_> {
    match name.rfind('.') {
        Some(idx) if idx > 0 => SplitFilename {
            stem: &name[..idx],
            extension: Some(&name[idx..]),
        },
        _ => SplitFilename {
            stem: name,
            extension: None,
        },
    }
}

/// Stems for which both a `.hex` and an `.eeprom` file are present, sorted.
pub fn firmware_file_stems<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    #[derive(Default)]
    struct Halves {
        hex: bool,
        eeprom: bool,
    }

    let mut by_stem: BTreeMap<String, Halves> = BTreeMap::new();
    for name in names {
        let split = split_filename(name.as_ref());
        let halves = by_stem.entry(split.stem.to_string()).or_default();
        match split.extension {
            Some(HEX_EXTENSION) => halves.hex = true,
            Some(EEPROM_EXTENSION) => halves.eeprom = true,
            _ => {}
        }
    }

    by_stem
        .into_iter()
        .filter(|(_, halves)| halves.hex && halves.eeprom)
        .map(|(stem, _)| stem)
        .collect()
}

/// Version named by a firmware stem such as `v4.5.1` or `V4.5.1`.
#[must_use]
pub fn version_from_stem(stem: &str) -> Option<FirmwareVersion> {
    let rest = stem.strip_prefix(['v', 'V'])?;
    FirmwareVersion::parse_triple(rest).ok()
}

/// Versions whose hex and eeprom halves are both on disk.
pub fn local_firmware_versions<I, S>(names: I) -> BTreeSet<FirmwareVersion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    firmware_file_stems(names)
        .into_iter()
        .filter_map(|stem| {
            let version = version_from_stem(&stem);
            if version.is_none() {
                debug!("Ignoring firmware pair with non-version stem: {stem}");
            }
            version
        })
        .collect()
}
