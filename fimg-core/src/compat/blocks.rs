// Instruction block templates.
//
// Programs are concatenations of the fixed blocks below. A block refers to
// registers through `Slot`s that depend on where it is placed: which texture
// unit it serves, which combiner argument it loads and which half (RGB or
// alpha) of the combiner it writes. `Template::resolve` binds those to real
// registers; nothing else is computed at assembly time.
//
// Register conventions:
//
//   vertex stage   v0 position, v2 color, v3 point size, v(4+u) texcoord u
//                  o0 position, o1 color, o(2+u) texcoord u, o4 point size
//                  c0-c3 transform rows, c(4+4u)-c(7+4u) texture matrix u
//   pixel stage    v0 color, v(1+u) texcoord u, s(u) sampler u
//                  r0 running color, r1 texel, r2-r4 combiner arguments,
//                  r5 combiner result, r6-r7 DOT3 scratch
//                  c(2u) env color u, c(2u+1) scale u, c29 clear color,
//                  c31 (1, 0.5, 4, 0)

use super::isa::{Destination, Instruction, Opcode, RegisterFile, Source, Swizzle, WriteMask};
use super::state::{ArgOperand, ArgSource, CombineFunction, TexEnvMode, MAX_TEXTURE_UNITS};

/// First vertex attribute carrying texture coordinates.
pub const TEXCOORD_ATTRIBUTE_BASE: u8 = 4;
/// Pixel shader constant holding the clear color.
pub const CLEAR_COLOR_CONSTANT: usize = 29;
/// Pixel shader constant holding (1, 0.5, 4, 0).
pub const NUMBERS_CONSTANT: usize = 31;
pub const NUMBERS: [f32; 4] = [1.0, 0.5, 4.0, 0.0];
/// Vertex shader constant of the first transform row.
pub const TRANSFORM_CONSTANT: usize = 0;

/// Pixel shader constant of a unit's environment color.
pub const fn env_color_constant(unit: usize) -> usize {
    2 * unit
}

/// Vertex shader constant of a unit's first texture matrix row.
pub const fn texture_matrix_constant(unit: usize) -> usize {
    4 + 4 * unit
}

/// Register reference resolved at placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Fixed(RegisterFile, u8),
    /// Vertex stage input of the unit's texture coordinates.
    TexCoordAttribute,
    /// Vertex stage output of the unit's texture coordinates.
    TexCoordOutput,
    /// Pixel stage input of the unit's texture coordinates.
    TexCoordVarying,
    Sampler,
    EnvColor,
    ScaleVector,
    TextureMatrixRow(u8),
    /// Temp register receiving the placed combiner argument.
    ArgTemp,
    /// Register the placed combiner argument reads.
    ArgSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcTemplate {
    slot: Slot,
    swizzle: Swizzle,
    negate: bool,
}

impl SrcTemplate {
    const fn swz(self, swizzle: Swizzle) -> Self {
        Self { swizzle, ..self }
    }

    const fn neg(self) -> Self {
        Self {
            negate: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskTemplate {
    Fixed(WriteMask),
    /// Components of the combiner half being placed.
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstTemplate {
    slot: Slot,
    mask: MaskTemplate,
}

impl DstTemplate {
    const fn mask(self, mask: WriteMask) -> Self {
        Self {
            mask: MaskTemplate::Fixed(mask),
            ..self
        }
    }

    const fn channel(self) -> Self {
        Self {
            mask: MaskTemplate::Channel,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    opcode: Opcode,
    saturate: bool,
    dst: DstTemplate,
    src: [SrcTemplate; 3],
}

/// Where a block is being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub unit: u8,
    pub arg: u8,
    pub source: ArgSource,
    pub channel: WriteMask,
}

impl Placement {
    pub const fn unit(unit: u8) -> Self {
        Self {
            unit,
            arg: 0,
            source: ArgSource::Previous,
            channel: WriteMask::XYZW,
        }
    }

    pub const fn combiner(unit: u8, channel: WriteMask) -> Self {
        Self {
            channel,
            ..Self::unit(unit)
        }
    }

    pub const fn argument(self, arg: u8, source: ArgSource) -> Self {
        Self { arg, source, ..self }
    }
}

impl Slot {
    fn resolve(self, at: &Placement) -> (RegisterFile, u8) {
        use RegisterFile::*;
        match self {
            Slot::Fixed(file, index) => (file, index),
            Slot::TexCoordAttribute => (Input, TEXCOORD_ATTRIBUTE_BASE + at.unit),
            Slot::TexCoordOutput => (Output, 2 + at.unit),
            Slot::TexCoordVarying => (Input, 1 + at.unit),
            Slot::Sampler => (Sampler, at.unit),
            Slot::EnvColor => (Const, env_color_constant(at.unit as usize) as u8),
            Slot::ScaleVector => (Const, env_color_constant(at.unit as usize) as u8 + 1),
            Slot::TextureMatrixRow(row) => (Const, texture_matrix_constant(at.unit as usize) as u8 + row),
            Slot::ArgTemp => (Temp, 2 + at.arg),
            Slot::ArgSource => match at.source {
                ArgSource::Texture => (Temp, 1),
                ArgSource::Constant => (Const, env_color_constant(at.unit as usize) as u8),
                ArgSource::PrimaryColor => (Input, 0),
                ArgSource::Previous => (Temp, 0),
            },
        }
    }
}

impl Template {
    /// Bind the template's slots for a placement.
    pub fn resolve(&self, at: &Placement) -> Instruction {
        let (file, index) = self.dst.slot.resolve(at);
        let mask = match self.dst.mask {
            MaskTemplate::Fixed(mask) => mask,
            MaskTemplate::Channel => at.channel,
        };
        let mut sources = [Source::new(RegisterFile::Input, 0); 3];
        for (out, template) in sources.iter_mut().zip(&self.src) {
            let (file, index) = template.slot.resolve(at);
            let mut source = Source::new(file, index).swizzled(template.swizzle);
            if template.negate {
                source = source.negated();
            }
            *out = source;
        }
        let instruction = Instruction::new(
            self.opcode,
            Destination::new(file, index).masked(mask),
            &sources,
        );
        if self.saturate {
            instruction.saturated()
        } else {
            instruction
        }
    }
}

// ---------------------------------------------------------------------------
// Template constructors
// ---------------------------------------------------------------------------

const fn s(slot: Slot) -> SrcTemplate {
    SrcTemplate {
        slot,
        swizzle: Swizzle::XYZW,
        negate: false,
    }
}

const fn d(slot: Slot) -> DstTemplate {
    DstTemplate {
        slot,
        mask: MaskTemplate::Fixed(WriteMask::XYZW),
    }
}

const fn r(index: u8) -> Slot {
    Slot::Fixed(RegisterFile::Temp, index)
}

const fn v(index: u8) -> Slot {
    Slot::Fixed(RegisterFile::Input, index)
}

const fn c(index: u8) -> Slot {
    Slot::Fixed(RegisterFile::Const, index)
}

const fn o(index: u8) -> Slot {
    Slot::Fixed(RegisterFile::Output, index)
}

const UNUSED: SrcTemplate = s(Slot::Fixed(RegisterFile::Input, 0));

const fn op(opcode: Opcode, dst: DstTemplate, a: SrcTemplate, b: SrcTemplate, c: SrcTemplate) -> Template {
    Template {
        opcode,
        saturate: false,
        dst,
        src: [a, b, c],
    }
}

const fn op1(opcode: Opcode, dst: DstTemplate, a: SrcTemplate) -> Template {
    op(opcode, dst, a, UNUSED, UNUSED)
}

const fn op2(opcode: Opcode, dst: DstTemplate, a: SrcTemplate, b: SrcTemplate) -> Template {
    op(opcode, dst, a, b, UNUSED)
}

const fn sat(template: Template) -> Template {
    Template {
        saturate: true,
        ..template
    }
}

const END: Template = op(Opcode::End, d(v(0)), UNUSED, UNUSED, UNUSED);

const ONE: SrcTemplate = s(c(NUMBERS_CONSTANT as u8)).swz(Swizzle::XXXX);
const HALF: SrcTemplate = s(c(NUMBERS_CONSTANT as u8)).swz(Swizzle::YYYY);
const FOUR: SrcTemplate = s(c(NUMBERS_CONSTANT as u8)).swz(Swizzle::ZZZZ);

// ---------------------------------------------------------------------------
// Vertex stage
// ---------------------------------------------------------------------------

pub const VS_HEADER: &[Template] = &[
    op2(Opcode::Dp4, d(o(0)).mask(WriteMask::X), s(v(0)), s(c(0))),
    op2(Opcode::Dp4, d(o(0)).mask(WriteMask::Y), s(v(0)), s(c(1))),
    op2(Opcode::Dp4, d(o(0)).mask(WriteMask::Z), s(v(0)), s(c(2))),
    op2(Opcode::Dp4, d(o(0)).mask(WriteMask::W), s(v(0)), s(c(3))),
];

pub const VS_TEXCOORD: &[Template] = &[
    op2(
        Opcode::Dp4,
        d(Slot::TexCoordOutput).mask(WriteMask::X),
        s(Slot::TexCoordAttribute),
        s(Slot::TextureMatrixRow(0)),
    ),
    op2(
        Opcode::Dp4,
        d(Slot::TexCoordOutput).mask(WriteMask::Y),
        s(Slot::TexCoordAttribute),
        s(Slot::TextureMatrixRow(1)),
    ),
    op2(
        Opcode::Dp4,
        d(Slot::TexCoordOutput).mask(WriteMask::Z),
        s(Slot::TexCoordAttribute),
        s(Slot::TextureMatrixRow(2)),
    ),
    op2(
        Opcode::Dp4,
        d(Slot::TexCoordOutput).mask(WriteMask::W),
        s(Slot::TexCoordAttribute),
        s(Slot::TextureMatrixRow(3)),
    ),
];

pub const VS_FOOTER: &[Template] = &[
    op1(Opcode::Mov, d(o(1)), s(v(2))),
    op1(
        Opcode::Mov,
        d(o(2 + MAX_TEXTURE_UNITS as u8)).mask(WriteMask::X),
        s(v(3)),
    ),
    END,
];

pub const VS_CLEAR: &[Template] = &[op1(Opcode::Mov, d(o(0)), s(v(0))), END];

// ---------------------------------------------------------------------------
// Pixel stage
// ---------------------------------------------------------------------------

pub const PS_HEADER: &[Template] = &[op1(Opcode::Mov, d(r(0)), s(v(0)))];

pub const PS_TEXLD: &[Template] = &[op2(
    Opcode::Texld,
    d(r(1)),
    s(Slot::TexCoordVarying),
    s(Slot::Sampler),
)];

pub const PS_FOOTER: &[Template] = &[op1(Opcode::Mov, d(o(0)), s(r(0))), END];

pub const PS_CLEAR: &[Template] = &[
    op1(Opcode::Mov, d(o(0)), s(c(CLEAR_COLOR_CONSTANT as u8))),
    END,
];

const ENV_REPLACE: &[Template] = &[op1(Opcode::Mov, d(r(0)), s(r(1)))];

const ENV_MODULATE: &[Template] = &[sat(op2(Opcode::Mul, d(r(0)), s(r(0)), s(r(1))))];

const ENV_DECAL: &[Template] = &[op(
    Opcode::Lrp,
    d(r(0)).mask(WriteMask::XYZ),
    s(r(1)).swz(Swizzle::WWWW),
    s(r(1)),
    s(r(0)),
)];

const ENV_BLEND: &[Template] = &[
    op(
        Opcode::Lrp,
        d(r(0)).mask(WriteMask::XYZ),
        s(r(1)),
        s(Slot::EnvColor),
        s(r(0)),
    ),
    sat(op2(Opcode::Mul, d(r(0)).mask(WriteMask::W), s(r(0)), s(r(1)))),
];

const ENV_ADD: &[Template] = &[
    sat(op2(Opcode::Add, d(r(0)).mask(WriteMask::XYZ), s(r(0)), s(r(1)))),
    sat(op2(Opcode::Mul, d(r(0)).mask(WriteMask::W), s(r(0)), s(r(1)))),
];

const ARG_SRC_COLOR: &[Template] = &[op1(Opcode::Mov, d(Slot::ArgTemp).channel(), s(Slot::ArgSource))];

const ARG_ONE_MINUS_SRC_COLOR: &[Template] = &[op2(
    Opcode::Add,
    d(Slot::ArgTemp).channel(),
    ONE,
    s(Slot::ArgSource).neg(),
)];

const ARG_SRC_ALPHA: &[Template] = &[op1(
    Opcode::Mov,
    d(Slot::ArgTemp).channel(),
    s(Slot::ArgSource).swz(Swizzle::WWWW),
)];

const ARG_ONE_MINUS_SRC_ALPHA: &[Template] = &[op2(
    Opcode::Add,
    d(Slot::ArgTemp).channel(),
    ONE,
    s(Slot::ArgSource).swz(Swizzle::WWWW).neg(),
)];

const FN_REPLACE: &[Template] = &[op1(Opcode::Mov, d(r(5)).channel(), s(r(2)))];

const FN_MODULATE: &[Template] = &[op2(Opcode::Mul, d(r(5)).channel(), s(r(2)), s(r(3)))];

const FN_ADD: &[Template] = &[op2(Opcode::Add, d(r(5)).channel(), s(r(2)), s(r(3)))];

const FN_ADD_SIGNED: &[Template] = &[
    op2(Opcode::Add, d(r(5)).channel(), s(r(2)), s(r(3))),
    op2(Opcode::Add, d(r(5)).channel(), s(r(5)), HALF.neg()),
];

const FN_INTERPOLATE: &[Template] = &[op(
    Opcode::Lrp,
    d(r(5)).channel(),
    s(r(4)),
    s(r(2)),
    s(r(3)),
)];

const FN_SUBTRACT: &[Template] = &[op2(Opcode::Add, d(r(5)).channel(), s(r(2)), s(r(3)).neg())];

const FN_DOT3: &[Template] = &[
    op2(Opcode::Add, d(r(6)), s(r(2)), HALF.neg()),
    op2(Opcode::Add, d(r(7)), s(r(3)), HALF.neg()),
    op2(Opcode::Dp3, d(r(6)).mask(WriteMask::X), s(r(6)), s(r(7))),
    op2(Opcode::Mul, d(r(5)).channel(), s(r(6)).swz(Swizzle::XXXX), FOUR),
];

pub const COMBINE_OUTPUT: &[Template] = &[sat(op2(Opcode::Mul, d(r(0)), s(r(5)), s(Slot::ScaleVector)))];

/// Block applying a non-COMBINE texture environment.
pub fn env_block(mode: TexEnvMode) -> &'static [Template] {
    match mode {
        TexEnvMode::Replace => ENV_REPLACE,
        TexEnvMode::Modulate => ENV_MODULATE,
        TexEnvMode::Decal => ENV_DECAL,
        TexEnvMode::Blend => ENV_BLEND,
        TexEnvMode::Add => ENV_ADD,
        TexEnvMode::Combine => &[],
    }
}

/// Block loading one combiner argument.
pub fn arg_block(operand: ArgOperand) -> &'static [Template] {
    match operand {
        ArgOperand::SrcColor => ARG_SRC_COLOR,
        ArgOperand::OneMinusSrcColor => ARG_ONE_MINUS_SRC_COLOR,
        ArgOperand::SrcAlpha => ARG_SRC_ALPHA,
        ArgOperand::OneMinusSrcAlpha => ARG_ONE_MINUS_SRC_ALPHA,
    }
}

/// Block computing a combiner function into r5.
pub fn function_block(function: CombineFunction) -> &'static [Template] {
    match function {
        CombineFunction::Replace => FN_REPLACE,
        CombineFunction::Modulate => FN_MODULATE,
        CombineFunction::Add => FN_ADD,
        CombineFunction::AddSigned => FN_ADD_SIGNED,
        CombineFunction::Interpolate => FN_INTERPOLATE,
        CombineFunction::Subtract => FN_SUBTRACT,
        CombineFunction::Dot3Rgb | CombineFunction::Dot3Rgba => FN_DOT3,
    }
}
