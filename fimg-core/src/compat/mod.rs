// Fixed-function emulation.
//
// The fixed-function state is turned into vertex and pixel programs by
// concatenating prebuilt instruction blocks. Programs are cached per stage in
// instruction memory slots keyed by a state fingerprint; constants travel
// separately and are reloaded whenever their own dirty flags are set.

pub mod assembler;
pub mod blocks;
pub mod cache;
pub mod fingerprint;
pub mod isa;
pub mod state;

pub use cache::{CacheStats, Lookup, ProgramCache};
pub use fingerprint::Fingerprint;
pub use isa::Instruction;
pub use state::{
    ArgOperand, ArgSource, Channel, CombineFunction, CombineScale, FixedFunctionState, Matrix4, TexEnvMode,
    TextureUnitState, IDENTITY, MAX_TEXTURE_UNITS,
};

use smallvec::SmallVec;

use crate::device::{Device, Request};
use crate::error::{FimgError, Result};
use crate::host::channel::RegisterChannel;
use crate::regs::{self, ProgramRange};

use self::blocks::{
    env_color_constant, texture_matrix_constant, CLEAR_COLOR_CONSTANT, NUMBERS, NUMBERS_CONSTANT, TRANSFORM_CONSTANT,
};

/// Programmable stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Pixel,
}

impl ShaderKind {
    pub const fn instruction_memory(self) -> u32 {
        match self {
            ShaderKind::Vertex => regs::FGVS_INSTMEM_START,
            ShaderKind::Pixel => regs::FGPS_INSTMEM_START,
        }
    }

    pub const fn constant_memory(self) -> u32 {
        match self {
            ShaderKind::Vertex => regs::FGVS_CFLOAT_START,
            ShaderKind::Pixel => regs::FGPS_CFLOAT_START,
        }
    }

    pub fn fingerprint(self, state: &FixedFunctionState) -> Fingerprint {
        match self {
            ShaderKind::Vertex => Fingerprint::vertex(state),
            ShaderKind::Pixel => Fingerprint::pixel(state),
        }
    }

    pub fn assemble(self, state: &FixedFunctionState) -> Vec<Instruction> {
        match self {
            ShaderKind::Vertex => assembler::assemble_vertex(state),
            ShaderKind::Pixel => assembler::assemble_pixel(state),
        }
    }

    fn dirty(self, state: &FixedFunctionState) -> bool {
        match self {
            ShaderKind::Vertex => state.vertex_dirty(),
            ShaderKind::Pixel => state.pixel_dirty(),
        }
    }

    fn clear_dirty(self, state: &mut FixedFunctionState) {
        match self {
            ShaderKind::Vertex => state.clear_vertex_dirty(),
            ShaderKind::Pixel => state.clear_pixel_dirty(),
        }
    }
}

impl std::fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShaderKind::Vertex => "vertex",
            ShaderKind::Pixel => "pixel",
        })
    }
}

/// Cache counters of both stages plus constant reloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderStats {
    pub vertex: CacheStats,
    pub pixel: CacheStats,
    pub constant_uploads: u64,
}

/// Pending constant memory writes, submitted together.
#[derive(Default)]
struct ConstantUpload {
    writes: SmallVec<[(u32, SmallVec<[u32; 16]>); 6]>,
}

impl ConstantUpload {
    fn push(&mut self, kind: ShaderKind, index: usize, values: &[f32]) {
        let words = bytemuck::cast_slice::<f32, u32>(values).iter().copied().collect();
        self.writes
            .push((regs::constant_address(kind.constant_memory(), index), words));
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn submit<D: Device + ?Sized>(&self, device: &mut D) -> Result<()> {
        let requests: SmallVec<[Request<'_>; 6]> = self
            .writes
            .iter()
            .map(|(address, words)| Request::Memory {
                address: *address,
                words: words.as_slice(),
            })
            .collect();
        device.submit(&requests)?;
        Ok(())
    }
}

/// Keeps instruction and constant memory consistent with the fixed-function
/// state.
#[derive(Debug, Clone)]
pub struct ShaderPipeline {
    vertex: ProgramCache,
    pixel: ProgramCache,
    constant_uploads: u64,
}

impl ShaderPipeline {
    pub fn new(vertex_slots: usize, pixel_slots: usize) -> Self {
        Self {
            vertex: ProgramCache::new(vertex_slots),
            pixel: ProgramCache::new(pixel_slots),
            constant_uploads: 0,
        }
    }

    pub fn cache(&self, kind: ShaderKind) -> &ProgramCache {
        match kind {
            ShaderKind::Vertex => &self.vertex,
            ShaderKind::Pixel => &self.pixel,
        }
    }

    fn cache_mut(&mut self, kind: ShaderKind) -> &mut ProgramCache {
        match kind {
            ShaderKind::Vertex => &mut self.vertex,
            ShaderKind::Pixel => &mut self.pixel,
        }
    }

    pub fn stats(&self) -> ShaderStats {
        ShaderStats {
            vertex: self.vertex.stats(),
            pixel: self.pixel.stats(),
            constant_uploads: self.constant_uploads,
        }
    }

    /// Bring both programs and all dirty constants up to date.
    ///
    /// Dirty flags are only cleared for work that reached the device, so a
    /// failed flush is retried in full by the next one.
    pub fn flush<D: Device + ?Sized>(
        &mut self,
        state: &mut FixedFunctionState,
        channel: &mut RegisterChannel,
        device: &mut D,
    ) -> Result<()> {
        self.flush_program(ShaderKind::Vertex, state, channel, device)?;
        self.flush_program(ShaderKind::Pixel, state, channel, device)?;
        self.flush_constants(state, device)
    }

    fn flush_program<D: Device + ?Sized>(
        &mut self,
        kind: ShaderKind,
        state: &mut FixedFunctionState,
        channel: &mut RegisterChannel,
        device: &mut D,
    ) -> Result<()> {
        if !kind.dirty(state) {
            return Ok(());
        }
        let fingerprint = kind.fingerprint(state);
        let cache = self.cache_mut(kind);
        let lookup = cache.lookup(&fingerprint);
        let slot = lookup.slot();
        match lookup {
            Lookup::Hit(_) => {
                log::debug!("{kind} program {fingerprint} hit in slot {slot}");
            }
            Lookup::Miss(_) => {
                let program = kind.assemble(state);
                log::debug!(
                    "{kind} program {fingerprint} missed, assembling {} instructions into slot {slot}",
                    program.len()
                );
                cache.invalidate(slot);
                let words = isa::encode_program(&program);
                let address = regs::instruction_address(kind.instruction_memory(), cache.slot_base(slot));
                device.submit(&[Request::Memory {
                    address,
                    words: &words,
                }])?;
                cache.commit(slot, fingerprint, program.len());
            }
        }
        cache.touch(slot);

        if cache.bind(slot) {
            let range = ProgramRange::new(cache.slot_base(slot), cache.instruction_count(slot));
            if let Err(err) = program_range(kind, range, channel, device) {
                cache.unbind();
                return Err(err);
            }
        }
        kind.clear_dirty(state);
        Ok(())
    }

    fn flush_constants<D: Device + ?Sized>(&mut self, state: &mut FixedFunctionState, device: &mut D) -> Result<()> {
        let mut upload = ConstantUpload::default();
        let units: SmallVec<[usize; MAX_TEXTURE_UNITS]> = state.dirty_constant_units().collect();
        let matrices: SmallVec<[usize; MAX_TEXTURE_UNITS]> = state.dirty_texture_matrices().collect();

        for &unit in &units {
            if let Some(config) = state.unit(unit) {
                let mut values = [0.0f32; 8];
                values[..4].copy_from_slice(&config.env_color);
                values[4..].copy_from_slice(&config.scale_vector());
                upload.push(ShaderKind::Pixel, env_color_constant(unit), &values);
            }
        }
        if state.transform_dirty() {
            upload.push(
                ShaderKind::Vertex,
                TRANSFORM_CONSTANT,
                bytemuck::cast_slice(state.transform()),
            );
        }
        for &unit in &matrices {
            if let Some(matrix) = state.texture_matrix(unit) {
                upload.push(
                    ShaderKind::Vertex,
                    texture_matrix_constant(unit),
                    bytemuck::cast_slice(matrix),
                );
            }
        }
        if upload.is_empty() {
            return Ok(());
        }

        upload.submit(device)?;
        self.constant_uploads += 1;
        for unit in units {
            state.clear_constants_dirty(unit);
        }
        for unit in matrices {
            state.clear_texture_matrix_dirty(unit);
        }
        state.clear_transform_dirty();
        Ok(())
    }

    /// Reload everything that lives in shader memory independently of the
    /// fixed-function state: the numeric constant and both clear programs.
    ///
    /// Cached programs are forgotten; the caller marks the state dirty.
    pub fn restore<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        self.vertex.invalidate_all();
        self.pixel.invalidate_all();

        let vertex_clear = isa::encode_program(&assembler::assemble_clear(ShaderKind::Vertex));
        let pixel_clear = isa::encode_program(&assembler::assemble_clear(ShaderKind::Pixel));
        let numbers = bytemuck::cast_slice::<f32, u32>(&NUMBERS);
        device.submit(&[
            Request::Memory {
                address: regs::instruction_address(ShaderKind::Vertex.instruction_memory(), regs::CLEAR_PROGRAM_BASE),
                words: &vertex_clear,
            },
            Request::Memory {
                address: regs::instruction_address(ShaderKind::Pixel.instruction_memory(), regs::CLEAR_PROGRAM_BASE),
                words: &pixel_clear,
            },
            Request::Memory {
                address: regs::constant_address(ShaderKind::Pixel.constant_memory(), NUMBERS_CONSTANT),
                words: numbers,
            },
        ])?;
        Ok(())
    }

    /// Point both stages at the resident clear programs and load the clear
    /// color. The cached bindings are dropped so the next flush rebinds.
    pub fn bind_clear<D: Device + ?Sized>(
        &mut self,
        color: [f32; 4],
        channel: &mut RegisterChannel,
        device: &mut D,
    ) -> Result<()> {
        device.submit(&[Request::Memory {
            address: regs::constant_address(ShaderKind::Pixel.constant_memory(), CLEAR_COLOR_CONSTANT),
            words: bytemuck::cast_slice(&color),
        }])?;
        for kind in [ShaderKind::Vertex, ShaderKind::Pixel] {
            let len = assembler::assemble_clear(kind).len();
            program_range(kind, ProgramRange::new(regs::CLEAR_PROGRAM_BASE, len), channel, device)?;
            self.cache_mut(kind).unbind();
        }
        Ok(())
    }
}

/// Program a stage's instruction range. The pixel stage latches its range
/// only on a copy trigger, which must follow the range writes.
fn program_range<D: Device + ?Sized>(
    kind: ShaderKind,
    range: ProgramRange,
    channel: &mut RegisterChannel,
    device: &mut D,
) -> Result<()> {
    match kind {
        ShaderKind::Vertex => channel.write(regs::FGVS_PC_RANGE, range.to_word()),
        ShaderKind::Pixel => {
            channel.write(regs::FGPS_PC_START, range.start as u32);
            channel.write(regs::FGPS_PC_END, range.end as u32);
            channel.flush(device)?;
            device.write_register(regs::FGPS_PC_COPY, 1)?;
        }
    }
    Ok(())
}

/// Validate that `slots` program slots leave room for the longest program.
pub(crate) fn check_slots(kind: ShaderKind, slots: usize) -> Result<()> {
    if slots == 0 {
        return Err(FimgError::InvalidConfig(format!("{kind} shader cache needs at least one slot")));
    }
    let per_slot = regs::CLEAR_PROGRAM_BASE / slots;
    let needed = assembler::max_program_len(kind);
    if per_slot < needed {
        return Err(FimgError::InvalidConfig(format!(
            "{slots} {kind} shader slots leave {per_slot} instructions each, programs need up to {needed}"
        )));
    }
    Ok(())
}
