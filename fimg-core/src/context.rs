//! Hardware context and draw submission.
//!
//! A [`HardwareContext`] owns everything one rendering context keeps on the
//! CPU side: the register channel with its shadow register file, the vertex
//! scratch buffer, the fixed-function state and its shader caches, and the
//! per-fragment and texture registers. The GPU itself is shared; every
//! operation that touches it holds the [`Gpu`] lock for its whole duration.
//!
//! # Draw sequence
//! 1. Validate the primitive and attribute layout (no side effects on error).
//! 2. Pack the first batch, still without the lock. Nothing drawable means
//!    the device is never touched.
//! 3. Acquire the GPU. When another context used it since, or a restore is
//!    pending, replay the shadow register file and shader memory.
//! 4. Drain the pipeline, reconcile shaders and constants, program the
//!    vertex context and attribute descriptors.
//! 5. Per batch: wait for the host interface, transfer, draw, pack the next.

use std::sync::Arc;

use crate::compat::{FixedFunctionState, ShaderPipeline, ShaderStats, MAX_TEXTURE_UNITS};
use crate::config::ContextConfig;
use crate::device::{Device, Gpu, HardwareGuard, PipelineMask, Request};
use crate::error::{DeviceError, FimgError, Result};
use crate::fragment::{ColorBuffer, DepthBuffer, FragmentState, TextureImage};
use crate::host::{
    AttributeFormat, AttributeSource, Batch, BatchLayout, Batcher, Indices, Primitive, RegisterChannel, VertexArrays,
    VertexScratch, VertexStream, MAX_ATTRIBUTES,
};
use crate::regs::{
    self, AlphaTest, AttributeControl, BlendControl, BufferControl, ColorFormat, ColorMask, DataType, DepthFormat,
    DepthMask, DepthTest, VertexContext,
};

/// Varyings every generated vertex program writes besides position: color,
/// one texture coordinate set per unit and the point size.
const VS_OUTPUTS: u8 = 2 + MAX_TEXTURE_UNITS as u8;

/// Outcome of one draw call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSummary {
    pub batches: usize,
    /// Vertices sent to the hardware, extra vertices included.
    pub vertices_submitted: usize,
    /// Input vertices retired.
    pub vertices_consumed: usize,
}

impl DrawSummary {
    fn record(&mut self, batch: &Batch) {
        self.batches += 1;
        self.vertices_submitted += batch.emitted;
        self.vertices_consumed += batch.consumed;
    }
}

/// Buffers a fast clear writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOR: Self = Self {
        color: true,
        depth: false,
    };
    pub const DEPTH: Self = Self {
        color: false,
        depth: true,
    };
    pub const ALL: Self = Self {
        color: true,
        depth: true,
    };
}

pub struct HardwareContext<D: Device> {
    gpu: Arc<Gpu<D>>,
    id: u64,
    config: ContextConfig,
    channel: RegisterChannel,
    scratch: VertexScratch,
    formats: [Option<AttributeFormat>; MAX_ATTRIBUTES],
    state: FixedFunctionState,
    shaders: ShaderPipeline,
    fragment: FragmentState,
    textures: [Option<TextureImage>; MAX_TEXTURE_UNITS],
    textures_dirty: bool,
    needs_restore: bool,
}

impl<D: Device> HardwareContext<D> {
    /// Create a context on `gpu`.
    ///
    /// Fails on an invalid configuration, a lock timeout, or when the
    /// scratch buffer cannot be allocated.
    pub fn new(gpu: Arc<Gpu<D>>, config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let id = gpu.register_context();
        let (scratch, version) = {
            let mut hw = gpu.acquire(config.lock_timeout())?;
            let version = hw.read_register(regs::FGGB_VERSION)?;
            (VertexScratch::allocate(&mut *hw)?, version)
        };
        log::info!(
            "created hardware context {id} on core version {version:#010x} ({} vertex / {} pixel program slots)",
            config.vertex_shader_slots,
            config.pixel_shader_slots
        );

        Ok(Self {
            gpu,
            id,
            channel: RegisterChannel::new(config.register_queue_capacity),
            scratch,
            formats: [None; MAX_ATTRIBUTES],
            state: FixedFunctionState::new(),
            shaders: ShaderPipeline::new(config.vertex_shader_slots, config.pixel_shader_slots),
            fragment: FragmentState::default(),
            textures: [None; MAX_TEXTURE_UNITS],
            textures_dirty: true,
            needs_restore: true,
            config,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn gpu(&self) -> &Arc<Gpu<D>> {
        &self.gpu
    }

    pub fn state(&self) -> &FixedFunctionState {
        &self.state
    }

    /// Fixed-function state, for the texture environment and matrix setters.
    pub fn state_mut(&mut self) -> &mut FixedFunctionState {
        &mut self.state
    }

    pub fn fragment(&self) -> &FragmentState {
        &self.fragment
    }

    pub fn shader_stats(&self) -> ShaderStats {
        self.shaders.stats()
    }

    pub fn channel(&self) -> &RegisterChannel {
        &self.channel
    }

    // -- attribute formats ---------------------------------------------------

    /// Configure the element format of an attribute slot.
    pub fn set_attribute(&mut self, slot: usize, data_type: DataType, components: u8) -> Result<()> {
        if slot >= MAX_ATTRIBUTES {
            return Err(FimgError::InvalidAttributeSlot(slot));
        }
        if !(1..=4).contains(&components) {
            return Err(FimgError::InvalidState("attribute component count must be 1 to 4"));
        }
        self.formats[slot] = Some(AttributeFormat::new(data_type, components));
        Ok(())
    }

    pub fn attribute(&self, slot: usize) -> Option<AttributeFormat> {
        self.formats.get(slot).copied().flatten()
    }

    // -- render targets and textures -----------------------------------------

    pub fn bind_color_buffer(&mut self, address: u32, width: u32, height: u32, stride: u32, format: ColorFormat) {
        self.fragment.bind_color_buffer(ColorBuffer {
            address,
            width,
            height,
            stride,
            format,
        });
    }

    pub fn bind_depth_buffer(&mut self, address: u32, format: DepthFormat) {
        self.fragment.bind_depth_buffer(DepthBuffer { address, format });
    }

    /// Bind or unbind the image of a texture unit. The texture caches are
    /// flushed before the next draw.
    pub fn bind_texture(&mut self, unit: usize, image: Option<TextureImage>) -> Result<()> {
        let slot = self
            .textures
            .get_mut(unit)
            .ok_or(FimgError::InvalidTextureUnit(unit))?;
        *slot = image;
        self.textures_dirty = true;
        Ok(())
    }

    pub fn texture(&self, unit: usize) -> Option<&TextureImage> {
        self.textures.get(unit).and_then(Option::as_ref)
    }

    // -- per-fragment state ----------------------------------------------------

    pub fn set_alpha_test(&mut self, alpha_test: AlphaTest) {
        self.fragment.alpha_test = alpha_test;
    }

    pub fn set_depth_test(&mut self, depth_test: DepthTest) {
        self.fragment.depth_test = depth_test;
    }

    pub fn set_blend(&mut self, blend: BlendControl) {
        self.fragment.blend = blend;
    }

    pub fn set_color_mask(&mut self, mask: ColorMask) {
        self.fragment.color_mask = mask;
    }

    pub fn set_depth_mask(&mut self, mask: DepthMask) {
        self.fragment.depth_mask = mask;
    }

    // -- draws -----------------------------------------------------------------

    /// Draw `count` vertices starting at `first`.
    pub fn draw_arrays(
        &mut self,
        primitive: Primitive,
        first: usize,
        count: usize,
        arrays: &VertexArrays<'_>,
    ) -> Result<DrawSummary> {
        self.draw(primitive, VertexStream::Direct { first, count }, arrays)
    }

    /// Draw the vertices selected by `indices`.
    pub fn draw_elements(
        &mut self,
        primitive: Primitive,
        indices: Indices<'_>,
        arrays: &VertexArrays<'_>,
    ) -> Result<DrawSummary> {
        self.draw(primitive, VertexStream::Indexed(indices), arrays)
    }

    fn draw(&mut self, primitive: Primitive, stream: VertexStream<'_>, arrays: &VertexArrays<'_>) -> Result<DrawSummary> {
        if !primitive.is_supported() {
            return Err(FimgError::UnsupportedPrimitive(primitive));
        }
        let layout = BatchLayout::new(&self.formats, arrays)?;
        layout.validate_bounds(arrays, &stream)?;

        let mut batcher = Batcher::new(primitive, &layout, arrays, stream);
        let Some(first) = batcher.next_batch(self.scratch.words_mut()) else {
            log::debug!("{primitive} draw of {} vertices has nothing drawable", stream.len());
            return Ok(DrawSummary::default());
        };

        let gpu = Arc::clone(&self.gpu);
        let mut hw = gpu.acquire(self.config.lock_timeout())?;
        self.begin(&mut hw)?;
        let device = &mut *hw;
        self.wait_idle(device, PipelineMask::ALL)?;

        self.fragment.apply(&mut self.channel);
        self.apply_textures(device)?;
        self.shaders.flush(&mut self.state, &mut self.channel, device)?;

        let summary = self.submit_batches(device, primitive, &layout, &mut batcher, first)?;
        log::debug!(
            "{primitive} draw: {} batches, {} vertices submitted, {} consumed",
            summary.batches,
            summary.vertices_submitted,
            summary.vertices_consumed
        );
        Ok(summary)
    }

    /// Program the vertex context and attribute descriptors, then submit
    /// `first` and every batch after it.
    fn submit_batches(
        &mut self,
        device: &mut D,
        primitive: Primitive,
        layout: &BatchLayout,
        batcher: &mut Batcher<'_, '_>,
        first: Batch,
    ) -> Result<DrawSummary> {
        let context = VertexContext {
            primitive: primitive.hardware_code(),
            vs_outputs: VS_OUTPUTS,
            point_size: matches!(primitive, Primitive::Points | Primitive::PointSprites),
        };
        self.channel.write(regs::FGPE_VERTEX_CONTEXT, context.to_word());
        let attributes = layout.attributes();
        self.channel
            .write(regs::FGVS_ATTRIB_NUM, attributes.len() as u32);
        for (i, placement) in attributes.iter().enumerate() {
            let control = AttributeControl {
                data_type: placement.format.data_type,
                components: placement.format.components,
                last: i + 1 == attributes.len(),
            };
            self.channel
                .write(regs::fghi_attr(placement.slot), control.to_word());
            self.channel
                .write(regs::fghi_vbbase(placement.slot), 4 * placement.offset as u32);
        }

        let transfer_len = layout.transfer_bytes();
        let mut summary = DrawSummary::default();
        let mut batch = first;
        loop {
            if summary.batches > 0 {
                self.wait_idle(device, PipelineMask::HOST_INTERFACE | PipelineMask::HOST_FIFO)?;
            }
            for placement in attributes {
                let stride = if placement.constant {
                    0
                } else {
                    4 * placement.format.words()
                };
                let control = BufferControl {
                    stride: stride as u8,
                    range: batch.emitted as u16,
                };
                self.channel
                    .write(regs::fghi_vbctrl(placement.slot), control.to_word());
            }
            self.channel.flush(device)?;
            self.scratch.upload(device, transfer_len)?;
            device.submit(&[
                Request::Transfer {
                    buffer: self.scratch.buffer(),
                    len: transfer_len,
                },
                Request::Draw {
                    vertex_count: batch.emitted as u32,
                },
            ])?;
            summary.record(&batch);

            match batcher.next_batch(self.scratch.words_mut()) {
                Some(next) => batch = next,
                None => break,
            }
        }
        Ok(summary)
    }

    // -- fast clear --------------------------------------------------------------

    /// Clear the bound color and/or depth buffer with a full-surface strip
    /// drawn by the resident clear programs.
    ///
    /// The regular programs and fragment state come back on the next draw.
    pub fn clear(&mut self, mask: ClearMask, color: [f32; 4], depth: f32) -> Result<DrawSummary> {
        if self.fragment.color_buffer().is_none() {
            return Err(FimgError::InvalidState("clear without a bound color buffer"));
        }
        let clear_depth = mask.depth && self.fragment.has_depth();
        if !mask.color && !clear_depth {
            return Ok(DrawSummary::default());
        }

        let z = depth.clamp(0.0, 1.0) * 2.0 - 1.0;
        let corners: [[f32; 4]; 4] = [
            [-1.0, -1.0, z, 1.0],
            [1.0, -1.0, z, 1.0],
            [-1.0, 1.0, z, 1.0],
            [1.0, 1.0, z, 1.0],
        ];
        let mut formats = [None; MAX_ATTRIBUTES];
        formats[0] = Some(AttributeFormat::new(DataType::Float, 4));
        let arrays = VertexArrays::new().with(
            0,
            AttributeSource::from_pointer(bytemuck::cast_slice(&corners[..]), 16),
        );
        let layout = BatchLayout::new(&formats, &arrays)?;
        let mut batcher = Batcher::new(
            Primitive::TriangleStrip,
            &layout,
            &arrays,
            VertexStream::Direct { first: 0, count: 4 },
        );
        let Some(first) = batcher.next_batch(self.scratch.words_mut()) else {
            return Ok(DrawSummary::default());
        };

        let gpu = Arc::clone(&self.gpu);
        let mut hw = gpu.acquire(self.config.lock_timeout())?;
        self.begin(&mut hw)?;
        let device = &mut *hw;
        self.wait_idle(device, PipelineMask::ALL)?;

        self.fragment
            .for_clear(mask.color, clear_depth)
            .apply(&mut self.channel);
        self.state.mark_programs_dirty();
        self.shaders.bind_clear(color, &mut self.channel, device)?;
        let summary = self.submit_batches(device, Primitive::TriangleStrip, &layout, &mut batcher, first)?;
        log::debug!("cleared color={} depth={clear_depth}", mask.color);
        Ok(summary)
    }

    // -- explicit synchronisation -------------------------------------------------

    /// Reconcile shaders, constants and queued registers with the hardware
    /// outside of a draw.
    pub fn flush_fixed_function_state(&mut self) -> Result<()> {
        let gpu = Arc::clone(&self.gpu);
        let mut hw = gpu.acquire(self.config.lock_timeout())?;
        self.begin(&mut hw)?;
        let device = &mut *hw;
        self.shaders.flush(&mut self.state, &mut self.channel, device)?;
        self.channel.flush(device)?;
        Ok(())
    }

    /// Deliver queued registers and wait until the `mask` stages drain.
    pub fn flush_pipeline(&mut self, mask: PipelineMask) -> Result<()> {
        let gpu = Arc::clone(&self.gpu);
        let mut hw = gpu.acquire(self.config.lock_timeout())?;
        self.begin(&mut hw)?;
        let device = &mut *hw;
        self.channel.flush(device)?;
        self.wait_idle(device, mask)
    }

    /// Wait until all submitted work has completed.
    pub fn finish(&mut self) -> Result<()> {
        self.flush_pipeline(PipelineMask::ALL)
    }

    /// Schedule a full context restore for the next hardware access, e.g.
    /// after the GPU lost power.
    pub fn restore(&mut self) {
        self.needs_restore = true;
    }

    // -- internals -------------------------------------------------------------------

    /// Take ownership of the hardware for this context, restoring its state
    /// when it may have been lost.
    fn begin(&mut self, hw: &mut HardwareGuard<'_, D>) -> Result<()> {
        if hw.claim(self.id) {
            self.needs_restore = true;
        }
        if self.needs_restore {
            self.restore_hardware(&mut **hw)?;
        }
        Ok(())
    }

    fn restore_hardware(&mut self, device: &mut D) -> Result<()> {
        log::info!("restoring hardware context {}", self.id);
        self.channel.restore(device)?;
        self.shaders.restore(device)?;
        self.state.mark_all_dirty();
        self.textures_dirty = true;
        self.needs_restore = false;
        Ok(())
    }

    fn apply_textures(&mut self, device: &mut D) -> Result<()> {
        if !self.textures_dirty {
            return Ok(());
        }
        for (unit, image) in self.textures.iter().enumerate() {
            if let Some(image) = image {
                image.apply(unit, &mut self.channel);
            }
        }
        self.channel.flush(device)?;
        device.write_register(regs::FGGB_CACHECTL, regs::CACHECTL_FLUSH_TEXTURE)?;
        self.textures_dirty = false;
        Ok(())
    }

    /// Bounded pipeline drain. A timeout soft-resets the core and schedules
    /// a full restore; the context stays usable.
    fn wait_idle(&mut self, device: &mut D, mask: PipelineMask) -> Result<()> {
        let timeout = self.config.pipeline_timeout();
        match device.wait_idle(mask, timeout) {
            Ok(()) => Ok(()),
            Err(DeviceError::Timeout(_)) => {
                log::warn!("pipeline {mask:?} did not drain within {timeout:?}, soft resetting");
                if let Err(err) = device.soft_reset() {
                    log::warn!("soft reset failed: {err}");
                }
                self.needs_restore = true;
                Err(FimgError::PipelineTimeout { mask, timeout })
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl<D: Device> Drop for HardwareContext<D> {
    fn drop(&mut self) {
        match self.gpu.acquire(self.config.lock_timeout()) {
            Ok(mut hw) => {
                if let Err(err) = self.scratch.release(&mut *hw) {
                    log::warn!("failed to free scratch buffer of context {}: {err}", self.id);
                }
            }
            Err(err) => log::warn!("leaking scratch buffer of context {}: {err}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::{DeviceEvent, MemoryDevice};

    fn context() -> HardwareContext<MemoryDevice> {
        HardwareContext::new(Gpu::new(MemoryDevice::new()), ContextConfig::default()).unwrap()
    }

    #[test]
    fn creation_allocates_scratch_and_drop_frees_it() {
        let gpu = Gpu::new(MemoryDevice::new());
        let ctx = HardwareContext::new(Arc::clone(&gpu), ContextConfig::default()).unwrap();
        assert_eq!(gpu.acquire(ctx.config().lock_timeout()).unwrap().buffer_count(), 1);
        drop(ctx);
        assert_eq!(gpu.acquire(std::time::Duration::from_secs(1)).unwrap().buffer_count(), 0);
    }

    #[test]
    fn creation_fails_without_scratch_memory() {
        let mut device = MemoryDevice::new();
        device.fail_allocations(true);
        let result = HardwareContext::new(Gpu::new(device), ContextConfig::default());
        assert!(matches!(result, Err(FimgError::ScratchAllocation(_))));
    }

    #[test]
    fn invalid_config_is_rejected_before_touching_hardware() {
        let gpu = Gpu::new(MemoryDevice::new());
        let config = ContextConfig {
            pixel_shader_slots: 0,
            ..Default::default()
        };
        assert!(matches!(
            HardwareContext::new(Arc::clone(&gpu), config),
            Err(FimgError::InvalidConfig(_))
        ));
        assert_eq!(gpu.acquire(std::time::Duration::from_secs(1)).unwrap().buffer_count(), 0);
    }

    #[test]
    fn set_attribute_checks_slot_and_components() {
        let mut ctx = context();
        assert!(ctx.set_attribute(0, DataType::Float, 3).is_ok());
        assert!(matches!(
            ctx.set_attribute(10, DataType::Float, 3),
            Err(FimgError::InvalidAttributeSlot(10))
        ));
        assert!(ctx.set_attribute(1, DataType::Float, 5).is_err());
        assert_eq!(ctx.attribute(0), Some(AttributeFormat::new(DataType::Float, 3)));
    }

    #[test]
    fn clear_needs_color_buffer_and_draws_four_vertices() {
        let mut ctx = context();
        assert!(ctx.clear(ClearMask::COLOR, [0.0; 4], 1.0).is_err());

        ctx.bind_color_buffer(0x5000_0000, 320, 240, 320, ColorFormat::Argb8888);
        let summary = ctx.clear(ClearMask::ALL, [0.0, 0.0, 1.0, 1.0], 1.0).unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.vertices_consumed, 2);
        assert_eq!(summary.vertices_submitted, 5);

        let hw = ctx.gpu().acquire(ctx.config().lock_timeout()).unwrap();
        assert_eq!(hw.register(regs::FGPS_PC_START), Some(regs::CLEAR_PROGRAM_BASE as u32));
        assert_eq!(hw.register(regs::FGPF_CBADDR), Some(0x5000_0000));
        assert!(hw
            .events()
            .iter()
            .any(|event| matches!(event, DeviceEvent::Draw { vertex_count: 5 })));
    }

    #[test]
    fn texture_binding_flushes_texture_cache_once() {
        let mut ctx = context();
        ctx.set_attribute(0, DataType::Float, 4).unwrap();
        ctx.bind_texture(
            0,
            Some(TextureImage::new(0x5200_0000, 16, 16, regs::TextureFormat::Rgb565)),
        )
        .unwrap();
        assert!(matches!(ctx.bind_texture(2, None), Err(FimgError::InvalidTextureUnit(2))));

        let position = [0u8; 16 * 3];
        let arrays = VertexArrays::new().with(0, AttributeSource::from_pointer(&position, 16));
        ctx.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();
        ctx.draw_arrays(Primitive::Triangles, 0, 3, &arrays).unwrap();

        let hw = ctx.gpu().acquire(ctx.config().lock_timeout()).unwrap();
        let flushes = hw
            .events()
            .iter()
            .filter(|event| matches!(event, DeviceEvent::DirectWrite(w) if w.register == regs::FGGB_CACHECTL))
            .count();
        assert_eq!(flushes, 1);
        assert_eq!(hw.register(regs::fgtu_base(0)), Some(0x5200_0000));
    }
}
