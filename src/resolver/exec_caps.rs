//! Per-submission execution decision

use serde::{Deserialize, Serialize};

/// Engine combination of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSet {
    Vebox,
    /// VEBOX feeding the scaler
    VeboxSfc,
    Render,
    /// Nothing to execute
    Bypass,
}

impl EngineSet {
    pub fn name(&self) -> &'static str {
        match self {
            EngineSet::Vebox => "vebox",
            EngineSet::VeboxSfc => "vebox+sfc",
            EngineSet::Render => "render",
            EngineSet::Bypass => "bypass",
        }
    }
}

impl std::fmt::Display for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What one submission executes and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteCaps {
    // Engines
    pub vebox: bool,
    pub sfc: bool,
    pub render: bool,
    /// Compute composition of one or more layers
    pub composite: bool,
    /// VEBOX image enhancement block active
    pub iecp: bool,

    pub output_in_use: bool,
    pub isolated: bool,
    pub render_hdr: bool,
    pub di_2nd_field: bool,
    pub force_csc_to_render: bool,
    pub vebox_argb_out: bool,
    pub vebox_argb10_out: bool,

    // Features executed on the scaler
    pub sfc_csc: bool,
    pub sfc_scaling: bool,
    pub sfc_rotmir: bool,
    /// First pass of a two-pass scaler job
    pub sfc_2pass_first: bool,

    // Features executed on the VEBOX
    pub dn: bool,
    pub di: bool,
    pub ste: bool,
    pub tcc: bool,
    pub procamp: bool,
    /// Back-end color conversion
    pub be_csc: bool,
    pub cgc: bool,
    pub hdr_3dlut: bool,
    pub lut3d_output: bool,

    // Dedicated render kernels
    pub di_fmd_kernel: bool,
    pub hdr_3dlut_kernel: bool,

    /// Nothing is left after this submission
    pub last_submission: bool,
}

impl ExecuteCaps {
    pub fn engine_set(&self) -> EngineSet {
        if self.sfc {
            EngineSet::VeboxSfc
        } else if self.vebox {
            EngineSet::Vebox
        } else if self.render {
            EngineSet::Render
        } else {
            EngineSet::Bypass
        }
    }

    pub fn on_vebox_or_sfc(&self) -> bool {
        self.vebox || self.sfc
    }

    /// Names of the flags that are set, for logs and the CLI
    pub fn flags(&self) -> Vec<&'static str> {
        let all = [
            (self.composite, "composite"),
            (self.iecp, "iecp"),
            (self.output_in_use, "output"),
            (self.isolated, "isolated"),
            (self.render_hdr, "render_hdr"),
            (self.di_2nd_field, "di_2nd_field"),
            (self.force_csc_to_render, "force_csc_to_render"),
            (self.sfc_csc, "sfc_csc"),
            (self.sfc_scaling, "sfc_scaling"),
            (self.sfc_rotmir, "sfc_rotmir"),
            (self.sfc_2pass_first, "sfc_2pass_first"),
            (self.dn, "dn"),
            (self.di, "di"),
            (self.ste, "ste"),
            (self.tcc, "tcc"),
            (self.procamp, "procamp"),
            (self.be_csc, "be_csc"),
            (self.cgc, "cgc"),
            (self.hdr_3dlut, "hdr_3dlut"),
            (self.lut3d_output, "lut3d_output"),
            (self.di_fmd_kernel, "di_fmd_kernel"),
            (self.hdr_3dlut_kernel, "hdr_3dlut_kernel"),
            (self.last_submission, "last"),
        ];
        all.into_iter().filter(|(set, _)| *set).map(|(_, name)| name).collect()
    }
}
