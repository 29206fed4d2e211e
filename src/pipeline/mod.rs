//! Camera pipeline facade
//!
//! The tuning server never touches pixels or runs the analysis loops itself.
//! Everything it needs from the camera goes through the [`CameraPipeline`]
//! trait:
//!
//! - **Probes** - asynchronous one-shot requests for a module's current
//!   parameters, answered on the pipeline's own thread
//! - **Apply** - push an internal parameter image into a control channel
//! - **Images** - metadata and the latest buffer of the processed and raw
//!   dump outputs
//! - **Lifecycle** - start/stop streaming on behalf of the tuning tool
//!
//! [`simulated::SimulatedPipeline`] is the in-process implementation used
//! when no camera is attached.

pub mod simulated;

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

pub use crate::probe::ProbeRequest;
pub use simulated::SimulatedPipeline;

/// Control channel a module's parameters travel on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineControl {
    AeCtrl,
    AwbCtrl,
    AwbMod,
    CcmCtrl,
    CcmMod,
    DnyuvCtrl,
    DnyuvMod,
    LccfCtrl,
    LccfMod,
    SatCtrl,
    SatMod,
    ShrpCtrl,
    ShrpMod,
    YcrvCtrl,
    YcrvMod,
    CarMod,
    CfaMod,
    CtcMod,
    DbcMod,
    GmargbMod,
    ObcMod,
    OecfMod,
    R2yMod,
    ScMod,
}

impl PipelineControl {
    pub fn name(self) -> &'static str {
        match self {
            PipelineControl::AeCtrl => "AE_CTRL",
            PipelineControl::AwbCtrl => "AWB_CTRL",
            PipelineControl::AwbMod => "AWB_MOD",
            PipelineControl::CcmCtrl => "CCM_CTRL",
            PipelineControl::CcmMod => "CCM_MOD",
            PipelineControl::DnyuvCtrl => "DNYUV_CTRL",
            PipelineControl::DnyuvMod => "DNYUV_MOD",
            PipelineControl::LccfCtrl => "LCCF_CTRL",
            PipelineControl::LccfMod => "LCCF_MOD",
            PipelineControl::SatCtrl => "SAT_CTRL",
            PipelineControl::SatMod => "SAT_MOD",
            PipelineControl::ShrpCtrl => "SHRP_CTRL",
            PipelineControl::ShrpMod => "SHRP_MOD",
            PipelineControl::YcrvCtrl => "YCRV_CTRL",
            PipelineControl::YcrvMod => "YCRV_MOD",
            PipelineControl::CarMod => "CAR_MOD",
            PipelineControl::CfaMod => "CFA_MOD",
            PipelineControl::CtcMod => "CTC_MOD",
            PipelineControl::DbcMod => "DBC_MOD",
            PipelineControl::GmargbMod => "GMARGB_MOD",
            PipelineControl::ObcMod => "OBC_MOD",
            PipelineControl::OecfMod => "OECF_MOD",
            PipelineControl::R2yMod => "R2Y_MOD",
            PipelineControl::ScMod => "SC_MOD",
        }
    }

    /// Controls whose trailing status block is rewritten by live analysis
    /// every frame
    pub fn has_live_status(self) -> bool {
        matches!(
            self,
            PipelineControl::AeCtrl | PipelineControl::AwbCtrl | PipelineControl::YcrvCtrl
        )
    }
}

impl fmt::Display for PipelineControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Images
// ============================================================================

/// Image output selected by the tuning tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Fully processed YUV output
    Processed,
    /// Raw bayer dump
    RawDump,
}

impl ImageKind {
    pub const UO: u32 = 0x1;
    pub const SS0: u32 = 0x2;
    pub const SS1: u32 = 0x4;
    pub const DUMP: u32 = 0x8;

    /// Supported kinds only; the scaler outputs are not exported
    pub fn from_wire(kind: u32) -> Option<Self> {
        match kind {
            Self::UO => Some(ImageKind::Processed),
            Self::DUMP => Some(ImageKind::RawDump),
            _ => None,
        }
    }

    pub fn wire(self) -> u32 {
        match self {
            ImageKind::Processed => Self::UO,
            ImageKind::RawDump => Self::DUMP,
        }
    }
}

/// Bayer mosaic order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum Mosaic {
    #[default]
    None = 0,
    Rggb = 1,
    Grbg = 2,
    Gbrg = 3,
    Bggr = 4,
}

/// Image metadata as reported to the tuning tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub bit_depth: u32,
    pub mosaic: Mosaic,
    pub mem_size: u32,
}

impl ImageInfo {
    /// Encoded size of the metadata prefix of an IMAGE_POP packet
    pub const SIZE: usize = 24;

    /// 8-bit NV12 output: luma plane plus half-height chroma plane
    pub fn processed(width: u32, height: u32, stride: u32) -> Self {
        Self {
            width,
            height,
            stride,
            bit_depth: 8,
            mosaic: Mosaic::None,
            mem_size: height * stride * 3 / 2,
        }
    }

    /// Single-plane bayer dump
    pub fn raw(width: u32, height: u32, stride: u32, bit_depth: u32, mosaic: Mosaic) -> Self {
        Self {
            width,
            height,
            stride,
            bit_depth,
            mosaic,
            mem_size: height * stride,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let words = [
            self.width,
            self.height,
            self.stride,
            self.bit_depth,
            self.mosaic as u32,
            self.mem_size,
        ];
        for (chunk, word) in buf.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        buf
    }
}

/// Latest buffer of one image output
#[derive(Clone)]
pub struct ImageFrame {
    pub info: ImageInfo,
    pub data: Arc<[u8]>,
}

impl fmt::Debug for ImageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFrame")
            .field("info", &self.info)
            .field("len", &self.data.len())
            .finish()
    }
}

impl ImageFrame {
    /// Pixel bytes bounded by the advertised buffer size
    pub fn pixels(&self) -> &[u8] {
        let len = (self.info.mem_size as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// Streaming lifecycle requests from the tuning tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
}

// ============================================================================
// Facade trait
// ============================================================================

/// Everything the tuning server needs from the camera pipeline
///
/// Implementations are shared by every session thread and must be
/// thread-safe. Probe completions are expected on a pipeline-owned thread.
#[cfg_attr(test, mockall::automock)]
pub trait CameraPipeline: Send + Sync {
    /// Queue a probe; the answer arrives later through the request itself
    fn submit_probe(&self, request: ProbeRequest) -> Result<()>;

    /// Push an internal parameter image into a control channel
    fn apply(&self, control: PipelineControl, params: &[u8]) -> Result<()>;

    /// Metadata of an image output
    ///
    /// Fails with `PipelineUnavailable` while the output has no format.
    fn image_info(&self, kind: ImageKind) -> Result<ImageInfo>;

    /// Most recent completed buffer of an image output
    fn latest_frame(&self, kind: ImageKind) -> Option<ImageFrame>;

    /// Start or stop streaming
    fn lifecycle(&self, action: LifecycleAction) -> Result<()>;

    /// Release pipeline resources; called once, last, at server shutdown
    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_kind_wire_values() {
        assert_eq!(ImageKind::from_wire(0x1), Some(ImageKind::Processed));
        assert_eq!(ImageKind::from_wire(0x8), Some(ImageKind::RawDump));
        assert_eq!(ImageKind::from_wire(ImageKind::SS0), None);
        assert_eq!(ImageKind::from_wire(ImageKind::SS1), None);
        assert_eq!(ImageKind::RawDump.wire(), 0x8);
    }

    #[test]
    fn test_processed_mem_size() {
        let info = ImageInfo::processed(1920, 1080, 1920);
        assert_eq!(info.mem_size, 1920 * 1080 * 3 / 2);
        assert_eq!(info.bit_depth, 8);
        assert_eq!(info.mosaic, Mosaic::None);
    }

    #[test]
    fn test_raw_mem_size() {
        let info = ImageInfo::raw(640, 480, 1280, 10, Mosaic::Grbg);
        assert_eq!(info.mem_size, 480 * 1280);
        assert_eq!(info.mosaic as u32, 2);
    }

    #[test]
    fn test_info_encoding_order() {
        let info = ImageInfo::raw(4, 2, 8, 12, Mosaic::Bggr);
        let bytes = info.encode();
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, vec![4, 2, 8, 12, 4, 16]);
    }

    #[test]
    fn test_frame_pixels_bounded_by_mem_size() {
        let frame = ImageFrame {
            info: ImageInfo::raw(2, 2, 2, 8, Mosaic::Rggb),
            data: Arc::from(vec![1u8; 10]),
        };
        assert_eq!(frame.pixels().len(), 4);
    }
}
