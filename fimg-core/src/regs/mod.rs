// FIMG-3DSE register map.
//
// Offsets are relative to the 3D core register base. Every block of the
// pipeline (global, host interface, vertex shader, primitive engine, raster
// engine, pixel shader, texture units, per-fragment) has its own window.
// Typed views of the packed registers live in `types`.

pub mod types;

pub use types::*;

// ---------------------------------------------------------------------------
// Global block
// ---------------------------------------------------------------------------

pub const FGGB_PIPESTATE: u32 = 0x0000;
/// Cache flush trigger (write-only, never shadowed).
pub const FGGB_CACHECTL: u32 = 0x0004;
pub const FGGB_RST: u32 = 0x0008;
pub const FGGB_VERSION: u32 = 0x0010;

/// `FGGB_CACHECTL` bits flushing both texture caches.
pub const CACHECTL_FLUSH_TEXTURE: u32 = 0x3 << 12;

// ---------------------------------------------------------------------------
// Host interface
// ---------------------------------------------------------------------------

pub const FGHI_CONTROL: u32 = 0x8010;
pub const FGHI_IDXOFFSET: u32 = 0x8014;

/// Attribute control (format, component swizzle, last flag).
pub const fn fghi_attr(slot: usize) -> u32 {
    0x8040 + 4 * slot as u32
}

/// Vertex buffer control (stride, transfer range).
pub const fn fghi_vbctrl(slot: usize) -> u32 {
    0x8080 + 4 * slot as u32
}

/// Vertex buffer base address.
pub const fn fghi_vbbase(slot: usize) -> u32 {
    0x80C0 + 4 * slot as u32
}

// ---------------------------------------------------------------------------
// Vertex shader
// ---------------------------------------------------------------------------

pub const FGVS_INSTMEM_START: u32 = 0x1_0000;
pub const FGVS_CFLOAT_START: u32 = 0x1_8000;
pub const FGVS_PC_RANGE: u32 = 0x2_0000;
pub const FGVS_CONFIG: u32 = 0x2_0004;
pub const FGVS_ATTRIB_NUM: u32 = 0x2_000C;

// ---------------------------------------------------------------------------
// Primitive engine
// ---------------------------------------------------------------------------

pub const FGPE_VERTEX_CONTEXT: u32 = 0x3_0000;

// ---------------------------------------------------------------------------
// Raster engine
// ---------------------------------------------------------------------------

pub const FGRA_CLIP_X: u32 = 0x3_8048;
pub const FGRA_CLIP_Y: u32 = 0x3_804C;

// ---------------------------------------------------------------------------
// Pixel shader
// ---------------------------------------------------------------------------

pub const FGPS_INSTMEM_START: u32 = 0x4_0000;
pub const FGPS_CFLOAT_START: u32 = 0x4_4000;
pub const FGPS_PC_START: u32 = 0x4_C000;
pub const FGPS_PC_END: u32 = 0x4_C004;
/// Program counter copy trigger (write-only, never shadowed).
pub const FGPS_PC_COPY: u32 = 0x4_C008;
pub const FGPS_ATTRIB_NUM: u32 = 0x4_C00C;

// ---------------------------------------------------------------------------
// Texture units
// ---------------------------------------------------------------------------

const FGTU_UNIT_STRIDE: u32 = 0x50;

pub const fn fgtu_status(unit: usize) -> u32 {
    0x6_0000 + FGTU_UNIT_STRIDE * unit as u32
}

pub const fn fgtu_usize(unit: usize) -> u32 {
    fgtu_status(unit) + 0x04
}

pub const fn fgtu_vsize(unit: usize) -> u32 {
    fgtu_status(unit) + 0x08
}

pub const fn fgtu_base(unit: usize) -> u32 {
    fgtu_status(unit) + 0x0C
}

// ---------------------------------------------------------------------------
// Per-fragment unit
// ---------------------------------------------------------------------------

pub const FGPF_ALPHAT: u32 = 0x7_0008;
pub const FGPF_DEPTHT: u32 = 0x7_0014;
pub const FGPF_BLEND: u32 = 0x7_001C;
pub const FGPF_CBMSK: u32 = 0x7_0024;
pub const FGPF_DBMSK: u32 = 0x7_0028;
pub const FGPF_FBCTL: u32 = 0x7_002C;
pub const FGPF_DBADDR: u32 = 0x7_0030;
pub const FGPF_CBADDR: u32 = 0x7_0034;
pub const FGPF_FBW: u32 = 0x7_0038;

// ---------------------------------------------------------------------------
// Shader memory geometry
// ---------------------------------------------------------------------------

/// Bytes per microcode instruction.
pub const INSTRUCTION_BYTES: u32 = 16;
/// Instructions in each stage's instruction memory.
pub const INSTRUCTION_MEMORY_LEN: usize = 512;
/// First instruction of the always-resident clear programs.
pub const CLEAR_PROGRAM_BASE: usize = 504;
/// Bytes per vec4 float constant.
pub const CONSTANT_BYTES: u32 = 16;

/// Byte address of instruction `index` in an instruction memory.
pub const fn instruction_address(memory_base: u32, index: usize) -> u32 {
    memory_base + INSTRUCTION_BYTES * index as u32
}

/// Byte address of float constant `index` in a constant memory.
pub const fn constant_address(memory_base: u32, index: usize) -> u32 {
    memory_base + CONSTANT_BYTES * index as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_slot_registers_do_not_overlap() {
        assert!(fghi_attr(9) < fghi_vbctrl(0));
        assert!(fghi_vbctrl(9) < fghi_vbbase(0));
        assert_eq!(fgtu_base(0) + 4, fgtu_status(0) + 0x10);
        assert!(fgtu_base(1) < fgtu_status(2));
    }

    #[test]
    fn clear_program_sits_at_top_of_memory() {
        assert!(CLEAR_PROGRAM_BASE < INSTRUCTION_MEMORY_LEN);
        assert_eq!(
            instruction_address(FGVS_INSTMEM_START, CLEAR_PROGRAM_BASE),
            0x1_0000 + 504 * 16
        );
        assert!(instruction_address(FGPS_INSTMEM_START, INSTRUCTION_MEMORY_LEN) <= FGPS_CFLOAT_START);
    }
}
