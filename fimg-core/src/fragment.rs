// Per-fragment state, render targets and texture images.
//
// Everything here is plain register state. It is written through the
// register channel on every draw; the shadow comparison turns unchanged
// values into no-ops, so a draw only queues what actually changed.

use crate::host::channel::RegisterChannel;
use crate::regs::{
    self, AlphaTest, BlendControl, ClipRange, ColorFormat, ColorMask, DepthFormat, DepthMask, DepthTest,
    FramebufferControl, MipmapMode, TextureFilter, TextureFormat, TextureStatus, TextureWrap,
};

/// Color render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBuffer {
    pub address: u32,
    pub width: u32,
    pub height: u32,
    /// Pixels per row.
    pub stride: u32,
    pub format: ColorFormat,
}

/// Depth/stencil render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBuffer {
    pub address: u32,
    pub format: DepthFormat,
}

/// Alpha, depth, blend and write mask configuration plus the bound render
/// targets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FragmentState {
    pub alpha_test: AlphaTest,
    pub depth_test: DepthTest,
    pub blend: BlendControl,
    pub color_mask: ColorMask,
    pub depth_mask: DepthMask,
    color_buffer: Option<ColorBuffer>,
    depth_buffer: Option<DepthBuffer>,
}

impl FragmentState {
    pub fn color_buffer(&self) -> Option<&ColorBuffer> {
        self.color_buffer.as_ref()
    }

    pub fn depth_buffer(&self) -> Option<&DepthBuffer> {
        self.depth_buffer.as_ref()
    }

    pub fn bind_color_buffer(&mut self, buffer: ColorBuffer) {
        self.color_buffer = Some(buffer);
    }

    /// Bind a depth buffer; `DepthFormat::None` detaches it.
    pub fn bind_depth_buffer(&mut self, buffer: DepthBuffer) {
        self.depth_buffer = (buffer.format != DepthFormat::None).then_some(buffer);
    }

    /// A depth buffer is attached.
    pub fn has_depth(&self) -> bool {
        self.depth_buffer.is_some()
    }

    /// Queue every per-fragment register.
    pub fn apply(&self, channel: &mut RegisterChannel) {
        let mut depth_test = self.depth_test;
        let mut depth_mask = self.depth_mask;
        if !self.has_depth() {
            depth_test.enabled = false;
            depth_mask.depth_write = false;
        }
        channel.write(regs::FGPF_ALPHAT, self.alpha_test.to_word());
        channel.write(regs::FGPF_DEPTHT, depth_test.to_word());
        channel.write(regs::FGPF_BLEND, self.blend.to_word());
        channel.write(regs::FGPF_CBMSK, self.color_mask.to_word());
        channel.write(regs::FGPF_DBMSK, depth_mask.to_word());

        if let Some(buffer) = &self.color_buffer {
            channel.write(regs::FGPF_FBCTL, FramebufferControl::new(buffer.format).to_word());
            channel.write(regs::FGPF_CBADDR, buffer.address);
            channel.write(regs::FGPF_FBW, buffer.stride);
            channel.write(regs::FGRA_CLIP_X, ClipRange::covering(buffer.width).to_word());
            channel.write(regs::FGRA_CLIP_Y, ClipRange::covering(buffer.height).to_word());
        }
        if let Some(buffer) = &self.depth_buffer {
            channel.write(regs::FGPF_DBADDR, buffer.address);
        }
    }

    /// State for a fast clear: no tests, no blending, writes limited to the
    /// cleared buffers.
    pub fn for_clear(&self, color: bool, depth: bool) -> Self {
        Self {
            alpha_test: AlphaTest::default(),
            depth_test: DepthTest {
                enabled: depth,
                func: regs::CompareFunc::Always,
            },
            blend: BlendControl::default(),
            color_mask: if color { ColorMask::ALL } else { ColorMask::NONE },
            depth_mask: DepthMask {
                depth_write: depth,
                ..self.depth_mask
            },
            ..*self
        }
    }
}

/// Texture image bound to a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureImage {
    pub address: u32,
    pub width: u32,
    pub height: u32,
    pub status: TextureStatus,
}

impl TextureImage {
    /// Image with repeat wrapping, nearest filtering and no mipmaps.
    pub fn new(address: u32, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            address,
            width,
            height,
            status: TextureStatus {
                format,
                wrap_u: TextureWrap::Repeat,
                wrap_v: TextureWrap::Repeat,
                mag_filter: TextureFilter::Nearest,
                min_filter: TextureFilter::Nearest,
                mipmap: MipmapMode::None,
            },
        }
    }

    pub fn with_filter(mut self, mag: TextureFilter, min: TextureFilter) -> Self {
        self.status.mag_filter = mag;
        self.status.min_filter = min;
        self
    }

    pub fn with_wrap(mut self, u: TextureWrap, v: TextureWrap) -> Self {
        self.status.wrap_u = u;
        self.status.wrap_v = v;
        self
    }

    /// Queue the unit's image registers.
    pub fn apply(&self, unit: usize, channel: &mut RegisterChannel) {
        channel.write(regs::fgtu_status(unit), self.status.to_word());
        channel.write(regs::fgtu_usize(unit), self.width);
        channel.write(regs::fgtu_vsize(unit), self.height);
        channel.write(regs::fgtu_base(unit), self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::CompareFunc;

    fn bound() -> FragmentState {
        let mut state = FragmentState::default();
        state.bind_color_buffer(ColorBuffer {
            address: 0x5000_0000,
            width: 800,
            height: 480,
            stride: 800,
            format: ColorFormat::Rgb565,
        });
        state
    }

    #[test]
    fn apply_writes_targets_and_clip() {
        let mut channel = RegisterChannel::new(64);
        bound().apply(&mut channel);
        assert_eq!(channel.shadow(regs::FGPF_CBADDR), Some(0x5000_0000));
        assert_eq!(channel.shadow(regs::FGRA_CLIP_X), Some(799 << 16));
        assert_eq!(channel.shadow(regs::FGRA_CLIP_Y), Some(479 << 16));
        assert_eq!(channel.shadow(regs::FGPF_DBADDR), None);
    }

    #[test]
    fn depth_is_disabled_without_depth_buffer() {
        let mut state = bound();
        state.depth_test = DepthTest {
            enabled: true,
            func: CompareFunc::LessEqual,
        };
        let mut channel = RegisterChannel::new(64);
        state.apply(&mut channel);
        let written = DepthTest::from_word(channel.shadow(regs::FGPF_DEPTHT).unwrap()).unwrap();
        assert!(!written.enabled);

        state.bind_depth_buffer(DepthBuffer {
            address: 0x5100_0000,
            format: DepthFormat::Depth24,
        });
        state.apply(&mut channel);
        let written = DepthTest::from_word(channel.shadow(regs::FGPF_DEPTHT).unwrap()).unwrap();
        assert!(written.enabled);

        state.bind_depth_buffer(DepthBuffer {
            address: 0,
            format: DepthFormat::None,
        });
        assert!(!state.has_depth());
    }

    #[test]
    fn unchanged_state_queues_nothing() {
        let state = bound();
        let mut channel = RegisterChannel::new(64);
        state.apply(&mut channel);
        let first = channel.pending().len();
        assert!(first > 0);
        state.apply(&mut channel);
        assert_eq!(channel.pending().len(), first);
    }

    #[test]
    fn clear_state_masks_untouched_buffers() {
        let mut state = bound();
        state.blend.enabled = true;
        let clear = state.for_clear(true, false);
        assert!(!clear.blend.enabled);
        assert!(!clear.depth_mask.depth_write);
        assert_eq!(clear.color_mask, ColorMask::ALL);
        assert_eq!(clear.color_buffer(), state.color_buffer());
    }

    #[test]
    fn texture_registers_follow_unit() {
        let image = TextureImage::new(0x5200_0000, 64, 32, TextureFormat::Argb8888)
            .with_filter(TextureFilter::Linear, TextureFilter::Linear);
        let mut channel = RegisterChannel::new(64);
        image.apply(1, &mut channel);
        assert_eq!(channel.shadow(regs::fgtu_base(1)), Some(0x5200_0000));
        assert_eq!(channel.shadow(regs::fgtu_usize(1)), Some(64));
        let status = TextureStatus::from_word(channel.shadow(regs::fgtu_status(1)).unwrap()).unwrap();
        assert_eq!(status.mag_filter, TextureFilter::Linear);
        assert_eq!(channel.shadow(regs::fgtu_base(0)), None);
    }
}
