// Typed register views.
//
// Each packed register is a plain struct of named fields. `to_word` and
// `from_word` are the only places that know the bit layout. `from_word`
// returns `None` when a field holds an encoding with no variant.

// ---------------------------------------------------------------------------
// Field enums
// ---------------------------------------------------------------------------

hw_enum! {
    /// Element type of a vertex attribute.
    pub enum DataType: "data type" {
        Byte = 0 => "byte",
        UnsignedByte = 1 => "ubyte",
        Short = 2 => "short",
        UnsignedShort = 3 => "ushort",
        Int = 4 => "int",
        UnsignedInt = 5 => "uint",
        Float = 6 => "float",
        HalfFloat = 7 => "half",
        Fixed = 8 => "fixed",
    }
}

impl DataType {
    /// Bytes per component.
    pub const fn size(self) -> usize {
        match self {
            DataType::Byte | DataType::UnsignedByte => 1,
            DataType::Short | DataType::UnsignedShort | DataType::HalfFloat => 2,
            DataType::Int | DataType::UnsignedInt | DataType::Float | DataType::Fixed => 4,
        }
    }
}

hw_enum! {
    /// Depth, alpha and stencil comparison.
    pub enum CompareFunc: "compare function" {
        Never = 0 => "never",
        Always = 1 => "always",
        Less = 2 => "less",
        LessEqual = 3 => "lequal",
        Equal = 4 => "equal",
        Greater = 5 => "greater",
        GreaterEqual = 6 => "gequal",
        NotEqual = 7 => "notequal",
    }
}

hw_enum! {
    pub enum BlendFactor: "blend factor" {
        Zero = 0 => "zero",
        One = 1 => "one",
        SrcColor = 2 => "src_color",
        OneMinusSrcColor = 3 => "one_minus_src_color",
        DstColor = 4 => "dst_color",
        OneMinusDstColor = 5 => "one_minus_dst_color",
        SrcAlpha = 6 => "src_alpha",
        OneMinusSrcAlpha = 7 => "one_minus_src_alpha",
        DstAlpha = 8 => "dst_alpha",
        OneMinusDstAlpha = 9 => "one_minus_dst_alpha",
        SrcAlphaSaturate = 10 => "src_alpha_saturate",
    }
}

hw_enum! {
    pub enum BlendEquation: "blend equation" {
        Add = 0 => "add",
        Subtract = 1 => "subtract",
        ReverseSubtract = 2 => "reverse_subtract",
        Min = 3 => "min",
        Max = 4 => "max",
    }
}

hw_enum! {
    /// Color buffer pixel format.
    pub enum ColorFormat: "color format" {
        Rgb555 = 0 => "rgb555",
        Rgb565 = 1 => "rgb565",
        Argb4444 = 2 => "argb4444",
        Argb1555 = 3 => "argb1555",
        Argb0888 = 4 => "argb0888",
        Argb8888 = 5 => "argb8888",
    }
}

impl ColorFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorFormat::Argb0888 | ColorFormat::Argb8888 => 4,
            _ => 2,
        }
    }
}

hw_enum! {
    /// Depth buffer format. `None` detaches the depth buffer.
    pub enum DepthFormat: "depth format" {
        None = 0 => "none",
        Depth24 = 1 => "depth24",
        Depth24Stencil8 = 2 => "depth24_stencil8",
    }
}

hw_enum! {
    pub enum TextureFormat: "texture format" {
        Argb1555 = 0 => "argb1555",
        Rgb565 = 1 => "rgb565",
        Argb4444 = 2 => "argb4444",
        Depth24 = 3 => "depth24",
        Ia88 = 4 => "ia88",
        L8 = 5 => "l8",
        Argb0888 = 6 => "argb0888",
        Argb8888 = 7 => "argb8888",
    }
}

hw_enum! {
    pub enum TextureFilter: "texture filter" {
        Nearest = 0 => "nearest",
        Linear = 1 => "linear",
    }
}

hw_enum! {
    pub enum TextureWrap: "texture wrap" {
        Repeat = 0 => "repeat",
        Flip = 1 => "flip",
        Clamp = 2 => "clamp",
    }
}

hw_enum! {
    pub enum MipmapMode: "mipmap mode" {
        None = 0 => "none",
        Nearest = 1 => "nearest",
        Linear = 2 => "linear",
    }
}

fn field(word: u32, shift: u32, bits: u32) -> u8 {
    ((word >> shift) & ((1 << bits) - 1)) as u8
}

fn flag(word: u32, bit: u32) -> bool {
    word & (1 << bit) != 0
}

// ---------------------------------------------------------------------------
// Host interface / primitive engine
// ---------------------------------------------------------------------------

/// `FGPE_VERTEX_CONTEXT`: primitive type and vertex shader output count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexContext {
    /// One-hot primitive type code.
    pub primitive: u8,
    /// Number of varyings the vertex shader produces (besides position).
    pub vs_outputs: u8,
    /// The vertex shader writes a point size.
    pub point_size: bool,
}

impl VertexContext {
    pub fn to_word(self) -> u32 {
        (self.primitive as u32) << 19
            | (self.point_size as u32) << 18
            | ((self.vs_outputs as u32) & 0xF) << 10
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            primitive: field(word, 19, 8),
            vs_outputs: field(word, 10, 4),
            point_size: flag(word, 18),
        }
    }
}

/// `FGHI_ATTR(n)`: element format of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeControl {
    pub data_type: DataType,
    /// Component count, 1 to 4.
    pub components: u8,
    /// Set on the last attribute the host interface fetches.
    pub last: bool,
}

impl AttributeControl {
    /// Identity component routing (x, y, z, w).
    const SWIZZLE_IDENTITY: u32 = 0xE4;

    pub fn to_word(self) -> u32 {
        (self.last as u32) << 31
            | (self.data_type.bits() as u32) << 12
            | ((self.components.clamp(1, 4) - 1) as u32) << 8
            | Self::SWIZZLE_IDENTITY
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            data_type: DataType::from_bits(field(word, 12, 4))?,
            components: field(word, 8, 2) + 1,
            last: flag(word, 31),
        })
    }
}

/// `FGHI_VBCTRL(n)`: stride and transfer range of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferControl {
    /// Bytes between consecutive vertices; 0 repeats one value.
    pub stride: u8,
    /// Vertices transferred per draw.
    pub range: u16,
}

impl BufferControl {
    pub fn to_word(self) -> u32 {
        (self.stride as u32) << 24 | self.range as u32
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            stride: (word >> 24) as u8,
            range: word as u16,
        }
    }
}

// ---------------------------------------------------------------------------
// Shaders
// ---------------------------------------------------------------------------

/// `FGVS_PC_RANGE`: first and last instruction the vertex shader executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramRange {
    pub start: u16,
    pub end: u16,
}

impl ProgramRange {
    const MASK: u32 = 0x1FF;

    /// Range covering `count` instructions from `start`.
    pub fn new(start: usize, count: usize) -> Self {
        Self {
            start: start as u16,
            end: (start + count.max(1) - 1) as u16,
        }
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start) as usize + 1
    }

    pub fn to_word(self) -> u32 {
        (self.end as u32 & Self::MASK) << 16 | (self.start as u32 & Self::MASK)
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            start: (word & Self::MASK) as u16,
            end: ((word >> 16) & Self::MASK) as u16,
        }
    }
}

// ---------------------------------------------------------------------------
// Texture units
// ---------------------------------------------------------------------------

/// `FGTU_TSTA(n)`: texture image format and sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureStatus {
    pub format: TextureFormat,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub mipmap: MipmapMode,
}

impl TextureStatus {
    pub fn to_word(self) -> u32 {
        (self.mipmap.bits() as u32) << 14
            | (self.min_filter.bits() as u32) << 13
            | (self.mag_filter.bits() as u32) << 12
            | (self.wrap_v.bits() as u32) << 10
            | (self.wrap_u.bits() as u32) << 8
            | self.format.bits() as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            format: TextureFormat::from_bits(field(word, 0, 5))?,
            wrap_u: TextureWrap::from_bits(field(word, 8, 2))?,
            wrap_v: TextureWrap::from_bits(field(word, 10, 2))?,
            mag_filter: TextureFilter::from_bits(field(word, 12, 1))?,
            min_filter: TextureFilter::from_bits(field(word, 13, 1))?,
            mipmap: MipmapMode::from_bits(field(word, 14, 2))?,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-fragment unit
// ---------------------------------------------------------------------------

/// `FGPF_ALPHAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaTest {
    pub enabled: bool,
    pub func: CompareFunc,
    pub reference: u8,
}

impl Default for AlphaTest {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunc::Always,
            reference: 0,
        }
    }
}

impl AlphaTest {
    pub fn to_word(self) -> u32 {
        (self.reference as u32) << 4 | (self.func.bits() as u32) << 1 | self.enabled as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            enabled: flag(word, 0),
            func: CompareFunc::from_bits(field(word, 1, 3))?,
            reference: field(word, 4, 8),
        })
    }
}

/// `FGPF_DEPTHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTest {
    pub enabled: bool,
    pub func: CompareFunc,
}

impl Default for DepthTest {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunc::Less,
        }
    }
}

impl DepthTest {
    pub fn to_word(self) -> u32 {
        (self.func.bits() as u32) << 1 | self.enabled as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            enabled: flag(word, 0),
            func: CompareFunc::from_bits(field(word, 1, 3))?,
        })
    }
}

/// `FGPF_BLEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendControl {
    pub enabled: bool,
    pub src_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub rgb_equation: BlendEquation,
    pub alpha_equation: BlendEquation,
}

impl Default for BlendControl {
    fn default() -> Self {
        Self {
            enabled: false,
            src_rgb: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            dst_alpha: BlendFactor::Zero,
            rgb_equation: BlendEquation::Add,
            alpha_equation: BlendEquation::Add,
        }
    }
}

impl BlendControl {
    pub fn to_word(self) -> u32 {
        (self.alpha_equation.bits() as u32) << 20
            | (self.rgb_equation.bits() as u32) << 17
            | (self.dst_alpha.bits() as u32) << 13
            | (self.dst_rgb.bits() as u32) << 9
            | (self.src_alpha.bits() as u32) << 5
            | (self.src_rgb.bits() as u32) << 1
            | self.enabled as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            enabled: flag(word, 0),
            src_rgb: BlendFactor::from_bits(field(word, 1, 4))?,
            src_alpha: BlendFactor::from_bits(field(word, 5, 4))?,
            dst_rgb: BlendFactor::from_bits(field(word, 9, 4))?,
            dst_alpha: BlendFactor::from_bits(field(word, 13, 4))?,
            rgb_equation: BlendEquation::from_bits(field(word, 17, 3))?,
            alpha_equation: BlendEquation::from_bits(field(word, 20, 3))?,
        })
    }
}

/// `FGPF_CBMSK`: per-channel color write enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl ColorMask {
    pub const ALL: Self = Self {
        red: true,
        green: true,
        blue: true,
        alpha: true,
    };
    pub const NONE: Self = Self {
        red: false,
        green: false,
        blue: false,
        alpha: false,
    };

    // Hardware bits are write *disables*.
    pub fn to_word(self) -> u32 {
        (!self.red as u32) << 3
            | (!self.green as u32) << 2
            | (!self.blue as u32) << 1
            | !self.alpha as u32
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            red: !flag(word, 3),
            green: !flag(word, 2),
            blue: !flag(word, 1),
            alpha: !flag(word, 0),
        }
    }
}

/// `FGPF_DBMSK`: depth and stencil write masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthMask {
    pub depth_write: bool,
    pub stencil_front: u8,
    pub stencil_back: u8,
}

impl Default for DepthMask {
    fn default() -> Self {
        Self {
            depth_write: true,
            stencil_front: 0xFF,
            stencil_back: 0xFF,
        }
    }
}

impl DepthMask {
    // Depth bit is a write disable, like the color mask.
    pub fn to_word(self) -> u32 {
        (self.stencil_back as u32) << 24
            | (self.stencil_front as u32) << 16
            | !self.depth_write as u32
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            depth_write: !flag(word, 0),
            stencil_front: field(word, 16, 8),
            stencil_back: field(word, 24, 8),
        }
    }
}

/// `FGPF_FBCTL`: color buffer format and alpha handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferControl {
    pub format: ColorFormat,
    pub dither: bool,
    pub alpha_threshold: u8,
    pub opaque_alpha: u8,
}

impl FramebufferControl {
    pub fn new(format: ColorFormat) -> Self {
        Self {
            format,
            dither: true,
            alpha_threshold: 0x80,
            opaque_alpha: 0xFF,
        }
    }

    pub fn to_word(self) -> u32 {
        (self.opaque_alpha as u32) << 16
            | (self.alpha_threshold as u32) << 8
            | (self.dither as u32) << 3
            | self.format.bits() as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Self {
            format: ColorFormat::from_bits(field(word, 0, 3))?,
            dither: flag(word, 3),
            alpha_threshold: field(word, 8, 8),
            opaque_alpha: field(word, 16, 8),
        })
    }
}

/// `FGRA_CLIP_X` / `FGRA_CLIP_Y`: inclusive pixel range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipRange {
    pub min: u16,
    pub max: u16,
}

impl ClipRange {
    /// Range covering `extent` pixels from 0.
    pub fn covering(extent: u32) -> Self {
        Self {
            min: 0,
            max: extent.saturating_sub(1).min(u16::MAX as u32) as u16,
        }
    }

    pub fn to_word(self) -> u32 {
        (self.max as u32) << 16 | self.min as u32
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            min: word as u16,
            max: (word >> 16) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_context_places_primitive_code_high() {
        let ctx = VertexContext {
            primitive: 1 << 5,
            vs_outputs: 3,
            point_size: false,
        };
        assert_eq!(ctx.to_word(), (1 << 5) << 19 | 3 << 10);
        assert_eq!(VertexContext::from_word(ctx.to_word()), ctx);
    }

    #[test]
    fn attribute_control_rejects_unknown_type() {
        let ctl = AttributeControl {
            data_type: DataType::Float,
            components: 3,
            last: true,
        };
        let word = ctl.to_word();
        assert_eq!(word & 0xFF, 0xE4);
        assert_eq!(AttributeControl::from_word(word), Some(ctl));
        assert_eq!(AttributeControl::from_word(0xF << 12), None);
    }

    #[test]
    fn program_range_is_inclusive() {
        let range = ProgramRange::new(126, 15);
        assert_eq!(range.start, 126);
        assert_eq!(range.end, 140);
        assert_eq!(range.len(), 15);
        assert_eq!(ProgramRange::from_word(range.to_word()), range);
    }

    #[test]
    fn inverted_program_range_decodes_to_one_instruction() {
        let range = ProgramRange::from_word(5 << 16 | 9);
        assert_eq!((range.start, range.end), (9, 5));
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn color_mask_bits_are_disables() {
        assert_eq!(ColorMask::ALL.to_word(), 0);
        assert_eq!(ColorMask::NONE.to_word(), 0xF);
        let red_only = ColorMask {
            red: true,
            ..ColorMask::NONE
        };
        assert_eq!(ColorMask::from_word(red_only.to_word()), red_only);
    }

    #[test]
    fn blend_and_texture_status_decode_what_they_encode() {
        let blend = BlendControl {
            enabled: true,
            src_rgb: BlendFactor::SrcAlpha,
            dst_rgb: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        };
        assert_eq!(BlendControl::from_word(blend.to_word()), Some(blend));

        let status = TextureStatus {
            format: TextureFormat::Rgb565,
            wrap_u: TextureWrap::Clamp,
            wrap_v: TextureWrap::Repeat,
            mag_filter: TextureFilter::Linear,
            min_filter: TextureFilter::Nearest,
            mipmap: MipmapMode::Linear,
        };
        assert_eq!(TextureStatus::from_word(status.to_word()), Some(status));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("FLOAT".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!(DataType::UnsignedShort.to_string(), "ushort");
        assert!("double".parse::<DataType>().is_err());
        assert_eq!(DataType::Short.size() * 3, 6);
    }

    #[test]
    fn clip_range_covers_extent() {
        assert_eq!(ClipRange::covering(800), ClipRange { min: 0, max: 799 });
        assert_eq!(ClipRange::covering(0).max, 0);
    }
}
