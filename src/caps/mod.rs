//! Hardware capability tables
//!
//! Read-only description of what the VEBOX pre-processor and the SFC scaler
//! can do for each pixel format, plus the rules for scaler multi-pass and
//! compute composition limits. The resolver never derives these values; it
//! only looks them up.

mod entry;
mod rules;

pub use entry::{FormatTable, SfcEntry, VeboxEntry};
pub use rules::{FcLimits, Rules, ScalingPassRule, SfcMultiPass};

use crate::error::{Error, Result};
use crate::types::Format;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete capability description of one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HwCaps {
    /// Human readable platform name
    pub name: String,
    pub sfc: FormatTable<SfcEntry>,
    pub vebox: FormatTable<VeboxEntry>,
    pub rules: Rules,
}

impl HwCaps {
    /// Parse a capability table from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let caps: HwCaps = toml::from_str(text)?;
        caps.validate()?;
        tracing::debug!(
            "Loaded caps '{}' ({} sfc formats, {} vebox formats)",
            caps.name,
            caps.sfc.len(),
            caps.vebox.len()
        );
        Ok(caps)
    }

    /// Load a capability table from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject tables the resolver cannot compute with
    pub fn validate(&self) -> Result<()> {
        let alignments = self
            .sfc
            .iter()
            .map(|(f, e)| ("sfc", f, e.horizontal_align, e.vertical_align))
            .chain(
                self.vebox
                    .iter()
                    .map(|(f, e)| ("vebox", f, e.horizontal_align, e.vertical_align)),
            );
        for (engine, format, horizontal, vertical) in alignments {
            if horizontal == 0 || vertical == 0 {
                return Err(Error::Config(format!(
                    "{}.{}: alignment must be at least 1",
                    engine,
                    format.name()
                )));
            }
        }

        for (format, entry) in self.sfc.iter() {
            if !(entry.min_scaling_ratio > 0.0 && entry.min_scaling_ratio <= entry.max_scaling_ratio) {
                return Err(Error::Config(format!(
                    "sfc.{}: scaling ratio range {}..{} is empty",
                    format.name(),
                    entry.min_scaling_ratio,
                    entry.max_scaling_ratio
                )));
            }
        }

        if self.rules.fc.max_layers == 0 {
            return Err(Error::Config("rules.fc.max_layers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_fc_limits(mut self, fc: FcLimits) -> Self {
        self.rules.fc = fc;
        self
    }

    /// Does any engine other than render know `format`?
    pub fn is_known(&self, format: Format) -> bool {
        self.sfc.contains(format) || self.vebox.contains(format)
    }
}

/// Built-in capability tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapsPreset {
    /// Full VEBOX + SFC with two-pass scaling and 8-layer composition
    #[default]
    Reference,
    /// VEBOX without the scaler
    NoScaler,
    /// Render engine only
    ComputeOnly,
    /// Reference engines with single-pass scaling and 2-layer composition
    LowPower,
}

impl CapsPreset {
    pub const ALL: [CapsPreset; 4] = [
        CapsPreset::Reference,
        CapsPreset::NoScaler,
        CapsPreset::ComputeOnly,
        CapsPreset::LowPower,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CapsPreset::Reference => "reference",
            CapsPreset::NoScaler => "no-scaler",
            CapsPreset::ComputeOnly => "compute-only",
            CapsPreset::LowPower => "low-power",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CapsPreset::Reference => "VEBOX + SFC, two-pass scaling, 8-layer composition",
            CapsPreset::NoScaler => "VEBOX only, scaling and color conversion on render",
            CapsPreset::ComputeOnly => "Render engine only",
            CapsPreset::LowPower => "VEBOX + SFC, single-pass scaling, 2-layer composition",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

fn reference_sfc() -> FormatTable<SfcEntry> {
    let mut table = FormatTable::new();
    for format in [Format::Nv12, Format::P010, Format::P016] {
        table.insert(format, SfcEntry::full(2, 2));
    }
    for format in [Format::Yuy2, Format::Y210] {
        table.insert(format, SfcEntry::full(2, 1));
    }
    for format in [
        Format::Ayuv,
        Format::Y410,
        Format::Argb8,
        Format::Abgr8,
        Format::R10g10b10a2,
        Format::B10g10r10a2,
    ] {
        table.insert(format, SfcEntry::full(1, 1));
    }
    // Planar 4:2:0 is written but never read by the scaler.
    table.insert(Format::Yv12, SfcEntry::output_only(2, 2));
    table.insert(Format::Xrgb8, SfcEntry::output_only(1, 1));
    table
}

fn reference_vebox() -> FormatTable<VeboxEntry> {
    let yuv = VeboxEntry {
        input: true,
        output: true,
        iecp: true,
        back_end_csc: true,
        denoise: true,
        deinterlace: true,
        ste: true,
        tcc: true,
        hdr: false,
        gamut_compress: false,
        horizontal_align: 2,
        vertical_align: 2,
    };
    let deep = VeboxEntry {
        hdr: true,
        gamut_compress: true,
        ..yuv
    };
    let packed = VeboxEntry {
        deinterlace: false,
        vertical_align: 1,
        ..yuv
    };
    let rgb = VeboxEntry {
        input: true,
        output: true,
        iecp: true,
        back_end_csc: true,
        horizontal_align: 1,
        vertical_align: 1,
        ..VeboxEntry::default()
    };

    FormatTable::new()
        .with(Format::Nv12, yuv)
        .with(Format::P010, deep)
        .with(Format::P016, deep)
        .with(Format::Yuy2, VeboxEntry { vertical_align: 1, ..yuv })
        .with(Format::Y210, VeboxEntry { vertical_align: 1, ..deep })
        .with(Format::Ayuv, packed)
        .with(Format::Y410, VeboxEntry { hdr: true, ..packed })
        .with(Format::Argb8, rgb)
        .with(Format::Abgr8, rgb)
        .with(Format::R10g10b10a2, VeboxEntry::output_only(1, 1))
        .with(Format::B10g10r10a2, VeboxEntry::output_only(1, 1))
}

impl From<CapsPreset> for HwCaps {
    fn from(preset: CapsPreset) -> Self {
        match preset {
            CapsPreset::Reference => HwCaps {
                name: preset.name().to_string(),
                sfc: reference_sfc(),
                vebox: reference_vebox(),
                rules: Rules {
                    sfc_multi_pass: SfcMultiPass::two_pass(),
                    fc: FcLimits::default(),
                },
            },
            CapsPreset::NoScaler => HwCaps {
                name: preset.name().to_string(),
                sfc: FormatTable::new(),
                vebox: reference_vebox(),
                rules: Rules::default(),
            },
            CapsPreset::ComputeOnly => HwCaps {
                name: preset.name().to_string(),
                rules: Rules::default(),
                ..Default::default()
            },
            CapsPreset::LowPower => HwCaps {
                name: preset.name().to_string(),
                sfc: reference_sfc(),
                vebox: reference_vebox(),
                rules: Rules {
                    sfc_multi_pass: SfcMultiPass::default(),
                    fc: FcLimits {
                        max_layers: 2,
                        ..FcLimits::default()
                    },
                },
            },
        }
    }
}
