use std::path::PathBuf;
use log::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Column holding the device serial in the metadata table.
const SERIAL_COLUMN: usize = 1;
/// Column holding the device model name in the metadata table.
const MODEL_COLUMN: usize = 3;

/// Directory name for a device's logs.
///
/// Identifiers made only of `[A-Za-z0-9_-]` are used as is. Any other
/// character is replaced with `_` and an 8-character hash of the raw
/// identifier is appended, so `192.168.1.5:5555` and `192_168_1_5_5555`
/// still land in different directories.
pub fn device_dir_name(device: &str) -> String {
    let sanitized: String = device
        .chars()
        .map(|c| if is_dir_safe(c) { c } else { '_' })
        .collect();

    if !device.is_empty() && sanitized == device {
        return sanitized;
    }

    let hash = xxh3_64(device.as_bytes());
    format!("{}_{:08x}", sanitized, hash & 0xFFFF_FFFF)
}

fn is_dir_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Maps a device identifier to its display name.
///
/// Lookups never fail: a missing table, an unreadable row or an unknown
/// identifier all yield `None`.
pub trait DeviceResolver {
    fn resolve(&self, device: &str) -> Option<String>;
}

/// Resolver backed by a CSV export of the device inventory sheet.
///
/// The first row is a header. Serials are read from the second column and
/// model names from the fourth.
pub struct CsvDeviceResolver {
    table: PathBuf,
}

impl CsvDeviceResolver {
    pub fn new(table: impl Into<PathBuf>) -> Self {
        Self { table: table.into() }
    }

    fn lookup(&self, device: &str) -> csv::Result<Option<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.table)?;

        for record in reader.records() {
            let record = record?;
            if record.get(SERIAL_COLUMN).map(str::trim) == Some(device) {
                return Ok(record
                    .get(MODEL_COLUMN)
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty()));
            }
        }

        Ok(None)
    }
}

impl DeviceResolver for CsvDeviceResolver {
    fn resolve(&self, device: &str) -> Option<String> {
        debug!("Looking up device {}", device);

        if !self.table.is_file() {
            warn!("Device info table not found: {}", self.table.display());
            return None;
        }

        match self.lookup(device) {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to read device info table {}: {}", self.table.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_device_dir_name_keeps_safe_ids() {
        assert_eq!(device_dir_name("R58M1234"), "R58M1234");
        assert_eq!(device_dir_name("emulator-5554"), "emulator-5554");
        assert_eq!(device_dir_name("192_168_1_5_5555"), "192_168_1_5_5555");
    }

    #[test]
    fn test_device_dir_name_replaces_unsafe_chars() {
        let name = device_dir_name("192.168.1.5:5555");
        assert!(name.starts_with("192_168_1_5_5555_"));
        assert_eq!(name.len(), "192_168_1_5_5555_".len() + 8);
        assert!(name.chars().all(is_dir_safe));

        assert!(device_dir_name("a/b\\c").starts_with("a_b_c_"));
        assert!(device_dir_name("").starts_with('_'));
    }

    #[test]
    fn test_device_dir_name_is_stable() {
        assert_eq!(device_dir_name("192.168.1.5:5555"), device_dir_name("192.168.1.5:5555"));
    }

    #[test]
    fn test_device_dirs_are_distinct() {
        assert_ne!(device_dir_name("R58M1234"), device_dir_name("emulator-5554"));
        assert_ne!(device_dir_name("192.168.1.5:5555"), device_dir_name("192_168_1_5_5555"));
        assert_ne!(device_dir_name("192.168.1.5:5555"), device_dir_name("192:168:1:5:5555"));
    }

    #[test]
    fn test_csv_resolver_finds_model() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("device_info.csv");
        fs::write(
            &table,
            "index,serial,brand,model\n1,R58M1234,Samsung,Galaxy S10\n2,emulator-5554,Google,Pixel Emulator\n",
        )
        .unwrap();

        let resolver = CsvDeviceResolver::new(&table);
        assert_eq!(resolver.resolve("R58M1234"), Some("Galaxy S10".to_string()));
        assert_eq!(resolver.resolve("emulator-5554"), Some("Pixel Emulator".to_string()));
        assert_eq!(resolver.resolve("unknown"), None);
    }

    #[test]
    fn test_csv_resolver_short_rows_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("device_info.csv");
        fs::write(&table, "index,serial\n1,R58M1234\n").unwrap();

        let resolver = CsvDeviceResolver::new(&table);
        assert_eq!(resolver.resolve("R58M1234"), None);
    }

    #[test]
    fn test_csv_resolver_missing_table() {
        let resolver = CsvDeviceResolver::new("/nonexistent/device_info.csv");
        assert_eq!(resolver.resolve("R58M1234"), None);
    }
}
