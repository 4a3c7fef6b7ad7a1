//! Resolver configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables of the resolver that are not part of the hardware tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Allow VEBOX to bypass composition for mega features like CSC
    pub vebox_bypass_comp: bool,
    /// Generate the HDR 3D LUT with a render kernel before the VEBOX pass
    pub hdr_3dlut_kernel: bool,
    /// Allow the film mode detection render kernel for deinterlace
    pub fmd_kernel: bool,
    /// Upper bound on submissions for one frame
    pub max_passes: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            vebox_bypass_comp: true,
            hdr_3dlut_kernel: false,
            fmd_kernel: false,
            max_passes: 16,
        }
    }
}

impl ResolverConfig {
    pub fn with_vebox_bypass_comp(mut self, enabled: bool) -> Self {
        self.vebox_bypass_comp = enabled;
        self
    }

    pub fn with_hdr_3dlut_kernel(mut self, enabled: bool) -> Self {
        self.hdr_3dlut_kernel = enabled;
        self
    }

    pub fn with_fmd_kernel(mut self, enabled: bool) -> Self {
        self.fmd_kernel = enabled;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    /// Reject values the resolver cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_passes == 0 {
            return Err(Error::Config("max_passes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert!(config.vebox_bypass_comp);
        assert!(!config.hdr_3dlut_kernel);
        assert_eq!(config.max_passes, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::default()
            .with_hdr_3dlut_kernel(true)
            .with_max_passes(4);
        assert!(config.hdr_3dlut_kernel);
        assert_eq!(config.max_passes, 4);
    }

    #[test]
    fn test_zero_passes_rejected() {
        let err = ResolverConfig::from_toml_str("max_passes = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hdr_3dlut_kernel = true\nvebox_bypass_comp = false").unwrap();
        let config = ResolverConfig::load(file.path()).unwrap();
        assert!(config.hdr_3dlut_kernel);
        assert!(!config.vebox_bypass_comp);
        assert_eq!(config.max_passes, 16);
    }
}
