//! Hardware identity from the SMBIOS strings the kernel exports under
//! `/sys/class/dmi/id`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::debug;

use crate::errors::FanControlError;

pub const DMI_BASE: &str = "/sys/class/dmi/id";

/// Substring match on vendor and product, like the kernel's `DMI_MATCH`.
#[derive(Debug, Clone, Copy)]
pub struct DmiMatch {
    pub vendor: &'static str,
    pub product: &'static str,
}

/// GPD Win 4 with the 7840U/8840U board.
pub const SUPPORTED_SYSTEMS: &[DmiMatch] = &[DmiMatch {
    vendor: "GPD",
    product: "G1618-04",
}];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmiIdentity {
    pub sys_vendor: String,
    pub product_name: String,
}

impl DmiIdentity {
    /// Read the identity strings below `base`. Missing files read as empty.
    pub fn read(base: &Path) -> Result<Self, FanControlError> {
        Ok(Self {
            sys_vendor: read_dmi_field(base, "sys_vendor")?,
            product_name: read_dmi_field(base, "product_name")?,
        })
    }

    pub fn matches(&self, entry: &DmiMatch) -> bool {
        self.sys_vendor.contains(entry.vendor) && self.product_name.contains(entry.product)
    }
}

/// Fail with `DeviceAbsent` unless the machine under `base` is in `table`.
pub fn check_system(base: &Path, table: &[DmiMatch]) -> Result<DmiIdentity, FanControlError> {
    let identity = DmiIdentity::read(base)?;
    debug!(
        "dmi: vendor '{}', product '{}'",
        identity.sys_vendor, identity.product_name
    );
    if table.iter().any(|entry| identity.matches(entry)) {
        Ok(identity)
    } else {
        Err(FanControlError::DeviceAbsent {
            vendor: identity.sys_vendor,
            product: identity.product_name,
        })
    }
}

fn read_dmi_field(base: &Path, field: &str) -> Result<String, FanControlError> {
    let path = base.join(field);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(error) if error.kind() == ErrorKind::PermissionDenied => Err(
            FanControlError::PermissionDenied(format!("{}: {}", path.display(), error)),
        ),
        Err(error) => Err(FanControlError::Io(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper: a fake `/sys/class/dmi/id` directory.
    struct FakeDmi {
        root: TempDir,
    }

    impl FakeDmi {
        fn new() -> Self {
            Self {
                root: TempDir::new().expect("failed to create temp dir"),
            }
        }

        fn base_path(&self) -> PathBuf {
            self.root.path().to_path_buf()
        }

        fn set(&self, field: &str, value: &str) -> &Self {
            fs::write(self.root.path().join(field), format!("{}\n", value)).unwrap();
            self
        }
    }

    #[test]
    fn matches_win4() {
        let fake = FakeDmi::new();
        fake.set("sys_vendor", "GPD").set("product_name", "G1618-04");

        let identity = check_system(&fake.base_path(), SUPPORTED_SYSTEMS).unwrap();
        assert_eq!(identity.sys_vendor, "GPD");
        assert_eq!(identity.product_name, "G1618-04");
    }

    #[test]
    fn matches_substrings() {
        let fake = FakeDmi::new();
        fake.set("sys_vendor", "GPD Technology")
            .set("product_name", "G1618-04 rev B");

        assert!(check_system(&fake.base_path(), SUPPORTED_SYSTEMS).is_ok());
    }

    #[test]
    fn other_gpd_models_are_absent() {
        let fake = FakeDmi::new();
        fake.set("sys_vendor", "GPD").set("product_name", "G1617-01");

        let result = check_system(&fake.base_path(), SUPPORTED_SYSTEMS);
        match result {
            Err(FanControlError::DeviceAbsent { vendor, product }) => {
                assert_eq!(vendor, "GPD");
                assert_eq!(product, "G1617-01");
            }
            other => panic!("expected DeviceAbsent, got {:?}", other),
        }
    }

    #[test]
    fn missing_dmi_tree_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent = temp_dir.path().join("no_such_dir");

        assert_eq!(DmiIdentity::read(&nonexistent).unwrap(), DmiIdentity::default());
        assert!(matches!(
            check_system(&nonexistent, SUPPORTED_SYSTEMS),
            Err(FanControlError::DeviceAbsent { .. })
        ));
    }
}
