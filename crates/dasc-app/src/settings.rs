use std::path::{Path, PathBuf};

use dasc_foundation::ConfigError;
use dasc_types::SystemKind;
use serde::Deserialize;

/// Typed view of `config.ini` (spec.md §6 "Configuration"), loaded once at
/// startup and validated before the engine is built.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub system: SystemSettings,
    pub constants: ConstantsSettings,
    pub path: PathSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSettings {
    /// `Mekorot` (Columnar HDF5) or `Prisma` (SEG-Y), case-insensitive.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstantsSettings {
    /// Chunk duration in seconds (`CHUNK_SIZE`).
    pub concat_time: f64,
    /// Canonical samples/second (`SPS`).
    pub sps: u32,
    /// Canonical spatial spacing in metres (`DX`).
    pub dx: f64,
    /// Legacy dual-stream drift-re-alignment tolerance; unused by the
    /// single-stream engine (spec.md §9 Open Question 3) but still read and
    /// validated so a malformed `config.ini` is caught at startup rather
    /// than silently ignored.
    pub time_diff_threshold: f64,
    /// Legacy dual-stream "declare data missing" gap threshold; same status
    /// as `time_diff_threshold` above.
    pub data_lose_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    /// Input root.
    pub localpath: String,
    /// Output root (`<SAVE>` throughout spec.md).
    pub naspath_final: String,
}

impl Settings {
    /// Loads `config.ini`-format configuration from `path` via the `config`
    /// crate, then validates it. Parse and validation failures are both
    /// `EngineError::Config` (recovery strategy: abort — a malformed
    /// configuration is never worth guessing at).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Ini))
            .build()
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;

        let settings: Settings = raw
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system_kind()?;

        if self.constants.sps == 0 {
            return Err(ConfigError::Validation {
                field: "CONSTANTS.SPS".into(),
                reason: "must be positive".into(),
            });
        }
        if !(self.constants.concat_time > 0.0) {
            return Err(ConfigError::Validation {
                field: "CONSTANTS.CONCAT_TIME".into(),
                reason: "must be positive".into(),
            });
        }
        if !(self.constants.dx > 0.0) {
            return Err(ConfigError::Validation {
                field: "CONSTANTS.DX".into(),
                reason: "must be positive".into(),
            });
        }
        if self.path.localpath.trim().is_empty() {
            return Err(ConfigError::MissingField("PATH.LOCALPATH".into()));
        }
        if self.path.naspath_final.trim().is_empty() {
            return Err(ConfigError::MissingField("PATH.NASPATH_final".into()));
        }
        Ok(())
    }

    pub fn system_kind(&self) -> Result<SystemKind, ConfigError> {
        match self.system.name.to_ascii_lowercase().as_str() {
            "mekorot" => Ok(SystemKind::Columnar),
            "prisma" => Ok(SystemKind::SegY),
            other => Err(ConfigError::Validation {
                field: "SYSTEM.NAME".into(),
                reason: format!("unknown system '{other}', expected Mekorot or Prisma"),
            }),
        }
    }

    pub fn local_root(&self) -> PathBuf {
        PathBuf::from(&self.path.localpath)
    }

    pub fn save_root(&self) -> PathBuf {
        PathBuf::from(&self.path.naspath_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{contents}").unwrap();
        f
    }

    const VALID: &str = r#"
[SYSTEM]
NAME=Mekorot

[CONSTANTS]
CONCAT_TIME=60
SPS=100
DX=1.0
TIME_DIFF_THRESHOLD=1.0
DATA_LOSE_THRESHOLD=5.0

[PATH]
LOCALPATH=/data/in
NASPATH_final=/data/out
"#;

    #[test]
    fn loads_and_validates_a_well_formed_ini() {
        let f = write_ini(VALID);
        let settings = Settings::load(f.path()).unwrap();
        assert_eq!(settings.system_kind().unwrap(), SystemKind::Columnar);
        assert_eq!(settings.constants.sps, 100);
        assert_eq!(settings.save_root(), PathBuf::from("/data/out"));
    }

    #[test]
    fn prisma_maps_to_segy() {
        let f = write_ini(&VALID.replace("Mekorot", "Prisma"));
        let settings = Settings::load(f.path()).unwrap();
        assert_eq!(settings.system_kind().unwrap(), SystemKind::SegY);
    }

    #[test]
    fn unknown_system_name_fails_validation() {
        let f = write_ini(&VALID.replace("Mekorot", "Bogus"));
        let err = Settings::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn zero_sps_fails_validation() {
        let f = write_ini(&VALID.replace("SPS=100", "SPS=0"));
        let err = Settings::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
