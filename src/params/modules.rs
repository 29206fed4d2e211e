//! Built-in module descriptors
//!
//! One descriptor per tunable module. Modules whose wire layout is the
//! internal layout with a one-byte enable flag use the generic copy; the
//! rest carry a pair of override functions below.
//!
//! # Layout notation
//!
//! Sizes are written as sums of their fields so the packed layouts can be
//! read off the constants. Internal enable flags are [`BOOL_WIDTH`] wide.

use super::layout::{ByteReader, ByteWriter, BOOL_WIDTH};
use super::{Conversion, ParameterDescriptor};
use crate::pipeline::PipelineControl;

// ============================================================================
// Module and control ids
// ============================================================================

/// Pipeline module ids (wire id = 10000 + id)
pub mod module_id {
    pub const OBC: u32 = 8;
    pub const SC: u32 = 11;
    pub const DBC: u32 = 14;
    pub const CTC: u32 = 15;
    pub const OECF: u32 = 17;
    pub const LCCF: u32 = 19;
    pub const AWB: u32 = 21;
    pub const CFA: u32 = 24;
    pub const CAR: u32 = 25;
    pub const CCM: u32 = 26;
    pub const GMARGB: u32 = 28;
    pub const R2Y: u32 = 29;
    pub const YCRV: u32 = 32;
    pub const SHRP: u32 = 33;
    pub const DNYUV: u32 = 34;
    pub const SAT: u32 = 35;
}

/// Control loop ids (wire id = 10000 + id)
pub mod control_id {
    pub const AE: u32 = 128;
    pub const AWB: u32 = 129;
    pub const LCCF: u32 = 147;
    pub const CCM: u32 = 153;
    pub const YCRV: u32 = 159;
    pub const SHRP: u32 = 160;
    pub const DNYUV: u32 = 161;
    pub const SAT: u32 = 162;
}

// ============================================================================
// Shared table dimensions
// ============================================================================

const ISO_LEVELS: usize = 10;
const TEMPERATURE_LEVELS: usize = 6;
/// Per-entry u16 ISO or colour temperature key kept only internally
const TABLE_KEY: usize = 2;
/// (x, y) u16 pair on the wire
const POINT: usize = 4;

const GAMMA_POINTS: usize = 15;
const Y_CURVE_POINTS: usize = 65;
const Y_HIST_BINS: usize = 64;

const GAMMA_X: [u16; GAMMA_POINTS] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 384, 512, 640, 768, 896, 1023,
];

/// Y curve abscissae: steps of 16 up to 512, then steps of 16 from 527
const Y_CURVE_X: [u16; Y_CURVE_POINTS] = y_curve_x();

const fn y_curve_x() -> [u16; Y_CURVE_POINTS] {
    let mut out = [0u16; Y_CURVE_POINTS];
    let mut i = 0;
    while i < Y_CURVE_POINTS {
        out[i] = if i <= 32 {
            (i * 16) as u16
        } else {
            (527 + (i - 33) * 16) as u16
        };
        i += 1;
    }
    out
}

/// Read-only x coordinates of a point table starting at `base`
const fn point_x_fields<const N: usize>(base: usize) -> [(usize, usize); N] {
    let mut out = [(0, 0); N];
    let mut i = 0;
    while i < N {
        out[i] = (base + i * POINT, 2);
        i += 1;
    }
    out
}

fn write_points(w: &mut ByteWriter<'_>, xs: &[u16], r: &mut ByteReader<'_>) {
    for &x in xs {
        w.u16(x).u16(r.u16());
    }
}

fn read_point_ys(r: &mut ByteReader<'_>, w: &mut ByteWriter<'_>, count: usize) {
    for _ in 0..count {
        r.skip(2);
        w.u16(r.u16());
    }
}

// ============================================================================
// AE control (dynamic)
// ============================================================================

/// Target brightness through the exposure lock tables
const AE_SETTING_BODY: usize = 633;
/// expectSnrExpo u32 + expectSnrAgc f64 + expectAdc f64
const AE_MANUAL_TARGET: usize = 4 + 8 + 8;
const AE_STATUS: usize = 25;
const AE_INTERNAL: usize = BOOL_WIDTH + AE_SETTING_BODY + BOOL_WIDTH + AE_MANUAL_TARGET + AE_STATUS;
const AE_WIRE: usize = 1 + AE_SETTING_BODY + AE_MANUAL_TARGET + AE_STATUS;
const AE_READ_ONLY: [(usize, usize); 1] = [(1 + AE_SETTING_BODY + AE_MANUAL_TARGET, AE_STATUS)];

fn ae_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(AE_SETTING_BODY));
    // module enable is driven by the pipeline, never exported
    r.skip(BOOL_WIDTH);
    w.put(r.bytes(AE_MANUAL_TARGET + AE_STATUS));
}

fn ae_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(AE_SETTING_BODY));
    w.skip(BOOL_WIDTH).put(r.bytes(AE_MANUAL_TARGET));
}

// ============================================================================
// AWB control (dynamic)
// ============================================================================

/// (temperature u16, red gain f64, blue gain f64) per level
const AWB_TEMPERATURE_TABLE: usize = TEMPERATURE_LEVELS * (2 + 8 + 8);
const AWB_STATUS: usize = 34;
const AWB_CTRL_INTERNAL: usize = BOOL_WIDTH + 8 + 4 + AWB_TEMPERATURE_TABLE + AWB_STATUS;
const AWB_CTRL_WIRE: usize = 1 + 8 + 1 + AWB_TEMPERATURE_TABLE + AWB_STATUS;
const AWB_CTRL_READ_ONLY: [(usize, usize); 1] =
    [(AWB_CTRL_WIRE - AWB_STATUS, AWB_STATUS)];

fn table_count_to_wire(count: i32) -> u8 {
    count.clamp(0, i32::from(u8::MAX)) as u8
}

fn awb_ctrl_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(8));
    w.u8(table_count_to_wire(r.i32()));
    w.put(r.bytes(AWB_TEMPERATURE_TABLE + AWB_STATUS));
}

fn awb_ctrl_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(8));
    w.i32(i32::from(r.u8()));
    w.put(r.bytes(AWB_TEMPERATURE_TABLE));
}

// ============================================================================
// CCM control (static)
// ============================================================================

/// 3x3 f64 matrix + 3 i16 offsets
const CCM_MATRIX: usize = 9 * 8 + 3 * 2;
const CCM_CTRL_INTERNAL: usize = BOOL_WIDTH + 4 + TEMPERATURE_LEVELS * (TABLE_KEY + CCM_MATRIX);
const CCM_CTRL_WIRE: usize = 1 + 1 + TEMPERATURE_LEVELS * CCM_MATRIX;

fn ccm_ctrl_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).u8(table_count_to_wire(r.i32()));
    for _ in 0..TEMPERATURE_LEVELS {
        r.skip(TABLE_KEY);
        w.put(r.bytes(CCM_MATRIX));
    }
}

fn ccm_ctrl_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).i32(i32::from(r.u8()));
    for _ in 0..TEMPERATURE_LEVELS {
        w.skip(TABLE_KEY).put(r.bytes(CCM_MATRIX));
    }
}

// ============================================================================
// ISO indexed control tables (static): DNYUV, LCCF, SAT, SHRP
// ============================================================================

const DNYUV_LEVEL: usize = 42;
const LCCF_LEVEL: usize = 64;
const SAT_LEVEL: usize = 20;
const SHRP_LEVEL: usize = 40;

const fn iso_internal(level: usize) -> usize {
    BOOL_WIDTH + ISO_LEVELS * (TABLE_KEY + level)
}

const fn iso_wire(level: usize) -> usize {
    1 + ISO_LEVELS * level
}

fn iso_table_to_wire<const LEVEL: usize>(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag()));
    for _ in 0..ISO_LEVELS {
        r.skip(TABLE_KEY);
        w.put(r.bytes(LEVEL));
    }
}

fn iso_table_to_internal<const LEVEL: usize>(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0);
    for _ in 0..ISO_LEVELS {
        w.skip(TABLE_KEY).put(r.bytes(LEVEL));
    }
}

// ============================================================================
// Y curve control (dynamic)
// ============================================================================

/// Update speed through the damping factors
const YCRV_SETTING_BODY: usize = 61;
const YCRV_CTRL_INTERNAL: usize =
    BOOL_WIDTH + YCRV_SETTING_BODY + Y_CURVE_POINTS * 2 + Y_HIST_BINS * 4 + Y_CURVE_POINTS * 2;
/// Histogram as (index u8, count u32) followed by the undamped and damped curves
const YCRV_CTRL_WIRE: usize =
    1 + YCRV_SETTING_BODY + Y_HIST_BINS * 5 + Y_CURVE_POINTS * POINT * 2;
const YCRV_CTRL_READ_ONLY: [(usize, usize); 1] =
    [(1 + YCRV_SETTING_BODY, YCRV_CTRL_WIRE - 1 - YCRV_SETTING_BODY)];

fn ycrv_ctrl_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(YCRV_SETTING_BODY));

    let y_curve = r.bytes(Y_CURVE_POINTS * 2);
    let histogram = r.bytes(Y_HIST_BINS * 4);
    let undamped = r.bytes(Y_CURVE_POINTS * 2);

    let mut hist = ByteReader::new(histogram);
    for index in 0..Y_HIST_BINS {
        w.u8(index as u8).u32(hist.u32());
    }
    write_points(&mut w, &Y_CURVE_X, &mut ByteReader::new(undamped));
    write_points(&mut w, &Y_CURVE_X, &mut ByteReader::new(y_curve));
}

fn ycrv_ctrl_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(YCRV_SETTING_BODY));
}

// ============================================================================
// CCM module (dynamic)
// ============================================================================

const CCM_MOD_INTERNAL: usize = BOOL_WIDTH + TABLE_KEY + CCM_MATRIX;
const CCM_MOD_WIRE: usize = 1 + CCM_MATRIX;

fn ccm_mod_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag()));
    r.skip(TABLE_KEY);
    w.put(r.bytes(CCM_MATRIX));
}

fn ccm_mod_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).skip(TABLE_KEY).put(r.bytes(CCM_MATRIX));
}

// ============================================================================
// DNYUV module (dynamic)
// ============================================================================

const DNYUV_WEIGHTS: usize = 10;
/// 7 (level u16, factor u8) points
const DNYUV_CURVE: usize = 7 * 3;
const DNYUV_MOD_SIZE: usize = BOOL_WIDTH + 2 * DNYUV_WEIGHTS + 2 * DNYUV_CURVE;

// internal: ys weights, uv weights, y curve, uv curve
// wire:     ys weights, y curve, uv weights, uv curve
fn dnyuv_mod_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag()));
    let ys = r.bytes(DNYUV_WEIGHTS);
    let uvs = r.bytes(DNYUV_WEIGHTS);
    let y_curve = r.bytes(DNYUV_CURVE);
    let uv_curve = r.bytes(DNYUV_CURVE);
    w.put(ys).put(y_curve).put(uvs).put(uv_curve);
}

fn dnyuv_mod_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0);
    let ys = r.bytes(DNYUV_WEIGHTS);
    let y_curve = r.bytes(DNYUV_CURVE);
    let uvs = r.bytes(DNYUV_WEIGHTS);
    let uv_curve = r.bytes(DNYUV_CURVE);
    w.put(ys).put(uvs).put(y_curve).put(uv_curve);
}

// ============================================================================
// Gamma module (static)
// ============================================================================

const GAMMA_INTERNAL: usize = BOOL_WIDTH + GAMMA_POINTS * 2;
const GAMMA_WIRE: usize = 1 + GAMMA_POINTS * POINT;
const GAMMA_READ_ONLY: [(usize, usize); GAMMA_POINTS] = point_x_fields::<GAMMA_POINTS>(1);

fn gamma_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag()));
    write_points(&mut w, &GAMMA_X, &mut r);
}

fn gamma_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0);
    read_point_ys(&mut r, &mut w, GAMMA_POINTS);
}

// ============================================================================
// LCCF module (dynamic)
// ============================================================================

/// centre x, centre y (u16 on the wire, i16 internally), radius u8
const LCCF_GEOMETRY: usize = 2 + 2 + 1;
const LCCF_FACTORS: usize = 8 * 8;
const LCCF_MOD_INTERNAL: usize = BOOL_WIDTH + LCCF_GEOMETRY + TABLE_KEY + LCCF_FACTORS;
const LCCF_MOD_WIRE: usize = 1 + LCCF_GEOMETRY + LCCF_FACTORS;

fn lccf_mod_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(LCCF_GEOMETRY));
    r.skip(TABLE_KEY);
    w.put(r.bytes(LCCF_FACTORS));
}

fn lccf_mod_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0)
        .put(r.bytes(LCCF_GEOMETRY))
        .skip(TABLE_KEY)
        .put(r.bytes(LCCF_FACTORS));
}

// ============================================================================
// OBC module (static)
// ============================================================================

/// 4 channels x 4 window corners
const OBC_GAINS: usize = 16;
const OBC_OFFSETS: usize = 16;
const OBC_INTERNAL: usize = BOOL_WIDTH + 2 + OBC_GAINS * 8 + OBC_OFFSETS;
const OBC_WIRE: usize = 1 + 2 + OBC_GAINS * 4 + OBC_OFFSETS;

fn obc_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(2));
    for _ in 0..OBC_GAINS {
        w.f32(r.f64() as f32);
    }
    w.put(r.bytes(OBC_OFFSETS));
}

fn obc_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(2));
    for _ in 0..OBC_GAINS {
        w.f64(f64::from(r.f32()));
    }
    w.put(r.bytes(OBC_OFFSETS));
}

// ============================================================================
// SC module (static)
// ============================================================================

/// AF config 7 + AWB window 8 + colour weights 13x13 + intensity curve 17x3
const SC_SETTING_BODY: usize = 7 + 8 + 13 * 13 + 17 * 3;
/// image size 4 + crop/decimation 14, computed by the pipeline
const SC_INFO: usize = 4 + 14;
const SC_SIZE: usize = BOOL_WIDTH + SC_SETTING_BODY + SC_INFO;
const SC_READ_ONLY: [(usize, usize); 1] = [(1 + SC_SETTING_BODY, SC_INFO)];

fn sc_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(SC_SETTING_BODY + SC_INFO));
}

fn sc_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(SC_SETTING_BODY));
}

// ============================================================================
// SHRP module (dynamic)
// ============================================================================

const SHRP_WEIGHTS: usize = 15;
/// 4 (level u16, factor f64) points
const SHRP_CURVE: usize = 4 * (2 + 8);
const SHRP_FACTORS: usize = 8 + 8;
const SHRP_MOD_INTERNAL: usize = BOOL_WIDTH + SHRP_WEIGHTS + SHRP_FACTORS + TABLE_KEY + SHRP_CURVE;
const SHRP_MOD_WIRE: usize = 1 + SHRP_WEIGHTS + SHRP_CURVE + SHRP_FACTORS;

// internal: weights, pos/neg factors, iso key, curve
// wire:     weights, curve, pos/neg factors
fn shrp_mod_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag())).put(r.bytes(SHRP_WEIGHTS));
    let factors = r.bytes(SHRP_FACTORS);
    r.skip(TABLE_KEY);
    w.put(r.bytes(SHRP_CURVE)).put(factors);
}

fn shrp_mod_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0).put(r.bytes(SHRP_WEIGHTS));
    let curve = r.bytes(SHRP_CURVE);
    w.put(r.bytes(SHRP_FACTORS)).skip(TABLE_KEY).put(curve);
}

// ============================================================================
// Y curve module (dynamic)
// ============================================================================

const YCRV_MOD_INTERNAL: usize = BOOL_WIDTH + Y_CURVE_POINTS * 2;
const YCRV_MOD_WIRE: usize = 1 + Y_CURVE_POINTS * POINT;
const YCRV_MOD_READ_ONLY: [(usize, usize); Y_CURVE_POINTS] = point_x_fields::<Y_CURVE_POINTS>(1);

fn ycrv_mod_to_wire(internal: &[u8], wire: &mut [u8]) {
    let mut r = ByteReader::new(internal);
    let mut w = ByteWriter::new(wire);
    w.u8(u8::from(r.flag()));
    write_points(&mut w, &Y_CURVE_X, &mut r);
}

fn ycrv_mod_to_internal(wire: &[u8], internal: &mut [u8]) {
    let mut r = ByteReader::new(wire);
    let mut w = ByteWriter::new(internal);
    w.flag(r.u8() != 0);
    read_point_ys(&mut r, &mut w, Y_CURVE_POINTS);
}

// ============================================================================
// Table
// ============================================================================

fn custom(
    to_wire: super::ConvertFn,
    to_internal: super::ConvertFn,
) -> Conversion {
    Conversion::Custom {
        to_wire,
        to_internal,
    }
}

fn generic(
    module_id: u32,
    name: &'static str,
    control: PipelineControl,
    size: usize,
    dynamic: bool,
) -> ParameterDescriptor {
    ParameterDescriptor {
        module_id,
        name,
        control,
        internal_size: BOOL_WIDTH + size - 1,
        wire_size: size,
        dynamic,
        read_only: &[],
        conversion: Conversion::Generic,
    }
}

/// Every built-in descriptor
pub fn builtin_descriptors() -> Vec<ParameterDescriptor> {
    use PipelineControl as C;

    vec![
        ParameterDescriptor {
            module_id: control_id::AE,
            name: "AE control",
            control: C::AeCtrl,
            internal_size: AE_INTERNAL,
            wire_size: AE_WIRE,
            dynamic: true,
            read_only: &AE_READ_ONLY,
            conversion: custom(ae_to_wire, ae_to_internal),
        },
        ParameterDescriptor {
            module_id: control_id::AWB,
            name: "AWB control",
            control: C::AwbCtrl,
            internal_size: AWB_CTRL_INTERNAL,
            wire_size: AWB_CTRL_WIRE,
            dynamic: true,
            read_only: &AWB_CTRL_READ_ONLY,
            conversion: custom(awb_ctrl_to_wire, awb_ctrl_to_internal),
        },
        ParameterDescriptor {
            module_id: control_id::CCM,
            name: "CCM control",
            control: C::CcmCtrl,
            internal_size: CCM_CTRL_INTERNAL,
            wire_size: CCM_CTRL_WIRE,
            dynamic: false,
            read_only: &[],
            conversion: custom(ccm_ctrl_to_wire, ccm_ctrl_to_internal),
        },
        ParameterDescriptor {
            module_id: control_id::DNYUV,
            name: "DNYUV control",
            control: C::DnyuvCtrl,
            internal_size: iso_internal(DNYUV_LEVEL),
            wire_size: iso_wire(DNYUV_LEVEL),
            dynamic: false,
            read_only: &[],
            conversion: custom(
                iso_table_to_wire::<DNYUV_LEVEL>,
                iso_table_to_internal::<DNYUV_LEVEL>,
            ),
        },
        ParameterDescriptor {
            module_id: control_id::LCCF,
            name: "LCCF control",
            control: C::LccfCtrl,
            internal_size: iso_internal(LCCF_LEVEL),
            wire_size: iso_wire(LCCF_LEVEL),
            dynamic: false,
            read_only: &[],
            conversion: custom(
                iso_table_to_wire::<LCCF_LEVEL>,
                iso_table_to_internal::<LCCF_LEVEL>,
            ),
        },
        ParameterDescriptor {
            module_id: control_id::SAT,
            name: "SAT control",
            control: C::SatCtrl,
            internal_size: iso_internal(SAT_LEVEL),
            wire_size: iso_wire(SAT_LEVEL),
            dynamic: false,
            read_only: &[],
            conversion: custom(
                iso_table_to_wire::<SAT_LEVEL>,
                iso_table_to_internal::<SAT_LEVEL>,
            ),
        },
        ParameterDescriptor {
            module_id: control_id::SHRP,
            name: "SHRP control",
            control: C::ShrpCtrl,
            internal_size: iso_internal(SHRP_LEVEL),
            wire_size: iso_wire(SHRP_LEVEL),
            dynamic: false,
            read_only: &[],
            conversion: custom(
                iso_table_to_wire::<SHRP_LEVEL>,
                iso_table_to_internal::<SHRP_LEVEL>,
            ),
        },
        ParameterDescriptor {
            module_id: control_id::YCRV,
            name: "YCRV control",
            control: C::YcrvCtrl,
            internal_size: YCRV_CTRL_INTERNAL,
            wire_size: YCRV_CTRL_WIRE,
            dynamic: true,
            read_only: &YCRV_CTRL_READ_ONLY,
            conversion: custom(ycrv_ctrl_to_wire, ycrv_ctrl_to_internal),
        },
        generic(module_id::AWB, "AWB", C::AwbMod, 25, true),
        generic(module_id::CAR, "CAR", C::CarMod, 1, false),
        ParameterDescriptor {
            module_id: module_id::CCM,
            name: "CCM",
            control: C::CcmMod,
            internal_size: CCM_MOD_INTERNAL,
            wire_size: CCM_MOD_WIRE,
            dynamic: true,
            read_only: &[],
            conversion: custom(ccm_mod_to_wire, ccm_mod_to_internal),
        },
        generic(module_id::CFA, "CFA", C::CfaMod, 3, false),
        generic(module_id::CTC, "CTC", C::CtcMod, 7, false),
        generic(module_id::DBC, "DBC", C::DbcMod, 5, false),
        ParameterDescriptor {
            module_id: module_id::DNYUV,
            name: "DNYUV",
            control: C::DnyuvMod,
            internal_size: DNYUV_MOD_SIZE,
            wire_size: DNYUV_MOD_SIZE - BOOL_WIDTH + 1,
            dynamic: true,
            read_only: &[],
            conversion: custom(dnyuv_mod_to_wire, dnyuv_mod_to_internal),
        },
        ParameterDescriptor {
            module_id: module_id::GMARGB,
            name: "GMARGB",
            control: C::GmargbMod,
            internal_size: GAMMA_INTERNAL,
            wire_size: GAMMA_WIRE,
            dynamic: false,
            read_only: &GAMMA_READ_ONLY,
            conversion: custom(gamma_to_wire, gamma_to_internal),
        },
        ParameterDescriptor {
            module_id: module_id::LCCF,
            name: "LCCF",
            control: C::LccfMod,
            internal_size: LCCF_MOD_INTERNAL,
            wire_size: LCCF_MOD_WIRE,
            dynamic: true,
            read_only: &[],
            conversion: custom(lccf_mod_to_wire, lccf_mod_to_internal),
        },
        ParameterDescriptor {
            module_id: module_id::OBC,
            name: "OBC",
            control: C::ObcMod,
            internal_size: OBC_INTERNAL,
            wire_size: OBC_WIRE,
            dynamic: false,
            read_only: &[],
            conversion: custom(obc_to_wire, obc_to_internal),
        },
        generic(module_id::OECF, "OECF", C::OecfMod, 257, false),
        generic(module_id::R2Y, "R2Y", C::R2yMod, 73, false),
        generic(module_id::SAT, "SAT", C::SatMod, 42, true),
        ParameterDescriptor {
            module_id: module_id::SC,
            name: "SC",
            control: C::ScMod,
            internal_size: SC_SIZE,
            wire_size: SC_SIZE - BOOL_WIDTH + 1,
            dynamic: false,
            read_only: &SC_READ_ONLY,
            conversion: custom(sc_to_wire, sc_to_internal),
        },
        ParameterDescriptor {
            module_id: module_id::SHRP,
            name: "SHRP",
            control: C::ShrpMod,
            internal_size: SHRP_MOD_INTERNAL,
            wire_size: SHRP_MOD_WIRE,
            dynamic: true,
            read_only: &[],
            conversion: custom(shrp_mod_to_wire, shrp_mod_to_internal),
        },
        ParameterDescriptor {
            module_id: module_id::YCRV,
            name: "YCRV",
            control: C::YcrvMod,
            internal_size: YCRV_MOD_INTERNAL,
            wire_size: YCRV_MOD_WIRE,
            dynamic: true,
            read_only: &YCRV_MOD_READ_ONLY,
            conversion: custom(ycrv_mod_to_wire, ycrv_mod_to_internal),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(id: u32) -> ParameterDescriptor {
        builtin_descriptors()
            .into_iter()
            .find(|d| d.module_id == id)
            .unwrap()
    }

    #[test]
    fn test_packed_sizes() {
        let expected: [(u32, usize, usize, bool); 24] = [
            (control_id::AE, 680, 679, true),
            (control_id::AWB, 155, 152, true),
            (control_id::CCM, 485, 470, false),
            (control_id::DNYUV, 441, 421, false),
            (control_id::LCCF, 661, 641, false),
            (control_id::SAT, 221, 201, false),
            (control_id::SHRP, 421, 401, false),
            (control_id::YCRV, 578, 902, true),
            (module_id::AWB, 25, 25, true),
            (module_id::CAR, 1, 1, false),
            (module_id::CCM, 81, 79, true),
            (module_id::CFA, 3, 3, false),
            (module_id::CTC, 7, 7, false),
            (module_id::DBC, 5, 5, false),
            (module_id::DNYUV, 63, 63, true),
            (module_id::GMARGB, 31, 61, false),
            (module_id::LCCF, 72, 70, true),
            (module_id::OBC, 147, 83, false),
            (module_id::OECF, 257, 257, false),
            (module_id::R2Y, 73, 73, false),
            (module_id::SAT, 42, 42, true),
            (module_id::SC, 254, 254, false),
            (module_id::SHRP, 74, 72, true),
            (module_id::YCRV, 131, 261, true),
        ];
        assert_eq!(builtin_descriptors().len(), expected.len());
        for (id, internal, wire, dynamic) in expected {
            let d = find(id);
            assert_eq!(d.internal_size, internal, "{} internal", d.name);
            assert_eq!(d.wire_size, wire, "{} wire", d.name);
            assert_eq!(d.dynamic, dynamic, "{} dynamic", d.name);
        }
    }

    #[test]
    fn test_y_curve_abscissae() {
        assert_eq!(Y_CURVE_X[0], 0);
        assert_eq!(Y_CURVE_X[32], 512);
        assert_eq!(Y_CURVE_X[33], 527);
        assert_eq!(Y_CURVE_X[63], 1007);
        assert_eq!(Y_CURVE_X[64], 1023);
    }

    #[test]
    fn test_gamma_points_carry_fixed_x() {
        let d = find(module_id::GMARGB);
        let mut internal = vec![0u8; d.internal_size];
        internal[0] = 1;
        for i in 0..GAMMA_POINTS {
            let y = (i as u16) * 60;
            internal[1 + i * 2..3 + i * 2].copy_from_slice(&y.to_le_bytes());
        }
        let wire = d.to_wire(&internal);
        assert_eq!(wire[0], 1);
        for i in 0..GAMMA_POINTS {
            let mut r = ByteReader::new(&wire[1 + i * POINT..]);
            assert_eq!(r.u16(), GAMMA_X[i]);
            assert_eq!(r.u16(), (i as u16) * 60);
        }
    }

    #[test]
    fn test_obc_gain_narrowing() {
        let d = find(module_id::OBC);
        let mut internal = vec![0u8; d.internal_size];
        {
            let mut w = ByteWriter::new(&mut internal);
            w.flag(true).u8(7).u8(9);
            for i in 0..OBC_GAINS {
                w.f64(1.0 + i as f64 * 0.25);
            }
            w.put(&[3u8; OBC_OFFSETS]);
        }
        let wire = d.to_wire(&internal);
        let mut r = ByteReader::new(&wire);
        assert_eq!(r.u8(), 1);
        assert_eq!((r.u8(), r.u8()), (7, 9));
        for i in 0..OBC_GAINS {
            assert_eq!(r.f32(), 1.0 + i as f32 * 0.25);
        }
        assert_eq!(r.bytes(OBC_OFFSETS), &[3u8; OBC_OFFSETS]);
    }

    #[test]
    fn test_ae_set_preserves_module_enable_and_status() {
        let d = find(control_id::AE);
        let mut internal = vec![0u8; d.internal_size];
        let module_enable_at = BOOL_WIDTH + AE_SETTING_BODY;
        internal[module_enable_at] = 1;
        let status_at = module_enable_at + BOOL_WIDTH + AE_MANUAL_TARGET;
        internal[status_at..].fill(0x5A);

        let mut wire = vec![0xEEu8; d.wire_size];
        wire[0] = 0;
        d.to_internal(&wire, &mut internal);

        assert_eq!(internal[0], 0);
        assert_eq!(internal[module_enable_at], 1);
        assert!(internal[BOOL_WIDTH..module_enable_at].iter().all(|&b| b == 0xEE));
        assert!(internal[status_at..].iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_awb_table_count_widens() {
        let d = find(control_id::AWB);
        let mut wire = vec![0u8; d.wire_size];
        wire[0] = 1;
        wire[9] = 6;
        let mut internal = vec![0u8; d.internal_size];
        d.to_internal(&wire, &mut internal);

        let mut r = ByteReader::new(&internal);
        assert!(r.flag());
        r.skip(8);
        assert_eq!(r.i32(), 6);
    }

    #[test]
    fn test_dnyuv_mod_reorders_curves() {
        let d = find(module_id::DNYUV);
        let mut internal = vec![0u8; d.internal_size];
        let mut at = BOOL_WIDTH;
        for (value, len) in [(1u8, 10), (2, 10), (3, 21), (4, 21)] {
            internal[at..at + len].fill(value);
            at += len;
        }
        let wire = d.to_wire(&internal);
        assert!(wire[1..11].iter().all(|&b| b == 1));
        assert!(wire[11..32].iter().all(|&b| b == 3));
        assert!(wire[32..42].iter().all(|&b| b == 2));
        assert!(wire[42..63].iter().all(|&b| b == 4));

        let mut back = vec![0u8; d.internal_size];
        d.to_internal(&wire, &mut back);
        assert_eq!(&back[BOOL_WIDTH..], &internal[BOOL_WIDTH..]);
    }

    #[test]
    fn test_ycrv_ctrl_histogram_is_indexed() {
        let d = find(control_id::YCRV);
        let mut internal = vec![0u8; d.internal_size];
        let hist_at = BOOL_WIDTH + YCRV_SETTING_BODY + Y_CURVE_POINTS * 2;
        internal[hist_at + 4 * 5..hist_at + 4 * 6].copy_from_slice(&1234u32.to_le_bytes());

        let wire = d.to_wire(&internal);
        let entry = 1 + YCRV_SETTING_BODY + 5 * 5;
        assert_eq!(wire[entry], 5);
        assert_eq!(&wire[entry + 1..entry + 5], &1234u32.to_le_bytes());
        let last_x = YCRV_CTRL_WIRE - POINT;
        assert_eq!(&wire[last_x..last_x + 2], &1023u16.to_le_bytes());
    }

    #[test]
    fn test_shrp_mod_moves_factors_after_curve() {
        let d = find(module_id::SHRP);
        let mut wire = vec![0u8; d.wire_size];
        wire[0] = 1;
        let factors_at = 1 + SHRP_WEIGHTS + SHRP_CURVE;
        wire[factors_at..factors_at + 8].copy_from_slice(&0.75f64.to_le_bytes());

        let mut internal = vec![0u8; d.internal_size];
        d.to_internal(&wire, &mut internal);
        let mut r = ByteReader::new(&internal);
        r.skip(BOOL_WIDTH + SHRP_WEIGHTS);
        assert_eq!(r.f64(), 0.75);
    }
}
