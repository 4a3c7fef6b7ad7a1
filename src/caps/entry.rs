//! Per-format capability records for the fixed-function engines

use crate::types::Format;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scaler (SFC) capabilities for one pixel format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SfcEntry {
    /// Format accepted as scaler input
    pub input: bool,
    /// Format writable as scaler output
    pub output: bool,
    pub csc: bool,
    pub scaling: bool,
    pub rotation: bool,
    pub mirror: bool,
    /// Minimum width/height in pixels
    pub min_resolution: u32,
    /// Maximum width/height in pixels
    pub max_resolution: u32,
    pub min_scaling_ratio: f32,
    pub max_scaling_ratio: f32,
    pub horizontal_align: u32,
    pub vertical_align: u32,
}

impl Default for SfcEntry {
    fn default() -> Self {
        Self {
            input: false,
            output: false,
            csc: false,
            scaling: false,
            rotation: false,
            mirror: false,
            min_resolution: 0,
            max_resolution: 0,
            min_scaling_ratio: 1.0,
            max_scaling_ratio: 1.0,
            horizontal_align: 1,
            vertical_align: 1,
        }
    }
}

impl SfcEntry {
    /// Fully featured entry with the given alignment
    pub const fn full(horizontal_align: u32, vertical_align: u32) -> Self {
        Self {
            input: true,
            output: true,
            csc: true,
            scaling: true,
            rotation: true,
            mirror: true,
            min_resolution: 128,
            max_resolution: 16384,
            min_scaling_ratio: 0.125,
            max_scaling_ratio: 8.0,
            horizontal_align,
            vertical_align,
        }
    }

    /// Entry that can only be written by the scaler
    pub const fn output_only(horizontal_align: u32, vertical_align: u32) -> Self {
        Self {
            input: false,
            output: true,
            csc: false,
            scaling: false,
            rotation: false,
            mirror: false,
            min_resolution: 128,
            max_resolution: 16384,
            min_scaling_ratio: 0.125,
            max_scaling_ratio: 8.0,
            horizontal_align,
            vertical_align,
        }
    }
}

/// Pre-processor (VEBOX) capabilities for one pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeboxEntry {
    pub input: bool,
    pub output: bool,
    /// Image enhancement and color processing block
    pub iecp: bool,
    /// Back-end color conversion
    pub back_end_csc: bool,
    pub denoise: bool,
    pub deinterlace: bool,
    pub ste: bool,
    pub tcc: bool,
    pub hdr: bool,
    pub gamut_compress: bool,
    pub horizontal_align: u32,
    pub vertical_align: u32,
}

impl Default for VeboxEntry {
    fn default() -> Self {
        Self {
            input: false,
            output: false,
            iecp: false,
            back_end_csc: false,
            denoise: false,
            deinterlace: false,
            ste: false,
            tcc: false,
            hdr: false,
            gamut_compress: false,
            horizontal_align: 1,
            vertical_align: 1,
        }
    }
}

impl VeboxEntry {
    /// Output-only entry with the given alignment
    pub const fn output_only(horizontal_align: u32, vertical_align: u32) -> Self {
        Self {
            input: false,
            output: true,
            iecp: false,
            back_end_csc: false,
            denoise: false,
            deinterlace: false,
            ste: false,
            tcc: false,
            hdr: false,
            gamut_compress: false,
            horizontal_align,
            vertical_align,
        }
    }
}

/// Capability table keyed by pixel format. Absent formats are unsupported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatTable<E> {
    entries: BTreeMap<Format, E>,
}

impl<E> Default for FormatTable<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Copy + Default> FormatTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `format`, or an all-unsupported entry
    pub fn get(&self, format: Format) -> E {
        self.entries.get(&format).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, format: Format) -> &mut E {
        self.entries.entry(format).or_default()
    }

    pub fn insert(&mut self, format: Format, entry: E) {
        self.entries.insert(format, entry);
    }

    pub fn with(mut self, format: Format, entry: E) -> Self {
        self.insert(format, entry);
        self
    }

    pub fn contains(&self, format: Format) -> bool {
        self.entries.contains_key(&format)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Format, &E)> {
        self.entries.iter().map(|(f, e)| (*f, e))
    }
}
