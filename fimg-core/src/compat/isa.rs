// Shader microcode.
//
// Both shader stages execute the same four-word instruction format:
//
//   word 0   [4:0] opcode  [5] saturate  [8:6] dst file  [13:9] dst index
//            [17:14] write mask
//   word 1-3 one source each: [2:0] file  [7:3] index  [15:8] swizzle
//            [16] negate
//
// Unused source words are zero.

use std::fmt;

hw_enum! {
    pub enum Opcode: "opcode" {
        Nop = 0 => "nop",
        Mov = 1 => "mov",
        Add = 2 => "add",
        Mul = 3 => "mul",
        Mad = 4 => "mad",
        Dp3 = 5 => "dp3",
        Dp4 = 6 => "dp4",
        Lrp = 7 => "lrp",
        Texld = 8 => "texld",
        End = 31 => "end",
    }
}

impl Opcode {
    /// Source operands read by the instruction.
    pub const fn sources(self) -> usize {
        match self {
            Opcode::Nop | Opcode::End => 0,
            Opcode::Mov => 1,
            Opcode::Mad | Opcode::Lrp => 3,
            _ => 2,
        }
    }

    pub const fn has_destination(self) -> bool {
        !matches!(self, Opcode::Nop | Opcode::End)
    }
}

hw_enum! {
    pub enum RegisterFile: "register file" {
        /// Vertex attribute / interpolated varying.
        Input = 0 => "v",
        Temp = 1 => "r",
        Const = 2 => "c",
        Sampler = 3 => "s",
        Output = 4 => "o",
    }
}

/// Source component selection, two bits per output component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(pub u8);

impl Swizzle {
    pub const XYZW: Self = Self::new(0, 1, 2, 3);
    pub const XXXX: Self = Self::new(0, 0, 0, 0);
    pub const YYYY: Self = Self::new(1, 1, 1, 1);
    pub const ZZZZ: Self = Self::new(2, 2, 2, 2);
    pub const WWWW: Self = Self::new(3, 3, 3, 3);

    pub const fn new(x: u8, y: u8, z: u8, w: u8) -> Self {
        Self((x & 3) | (y & 3) << 2 | (z & 3) << 4 | (w & 3) << 6)
    }

    pub const fn component(self, i: u8) -> u8 {
        (self.0 >> (2 * i)) & 3
    }
}

/// Destination component enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteMask(pub u8);

impl WriteMask {
    pub const X: Self = Self(0b0001);
    pub const Y: Self = Self(0b0010);
    pub const Z: Self = Self(0b0100);
    pub const W: Self = Self(0b1000);
    pub const XYZ: Self = Self(0b0111);
    pub const XYZW: Self = Self(0b1111);
}

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Source {
    pub file: RegisterFile,
    pub index: u8,
    pub swizzle: Swizzle,
    pub negate: bool,
}

impl Source {
    pub const fn new(file: RegisterFile, index: u8) -> Self {
        Self {
            file,
            index,
            swizzle: Swizzle::XYZW,
            negate: false,
        }
    }

    pub const fn swizzled(self, swizzle: Swizzle) -> Self {
        Self { swizzle, ..self }
    }

    pub const fn negated(self) -> Self {
        Self { negate: !self.negate, ..self }
    }

    fn encode(self) -> u32 {
        (self.negate as u32) << 16
            | (self.swizzle.0 as u32) << 8
            | ((self.index as u32) & 0x1F) << 3
            | self.file.bits() as u32
    }

    fn decode(word: u32) -> Option<Self> {
        Some(Self {
            file: RegisterFile::from_bits((word & 0x7) as u8)?,
            index: ((word >> 3) & 0x1F) as u8,
            swizzle: Swizzle((word >> 8) as u8),
            negate: word & (1 << 16) != 0,
        })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("-")?;
        }
        write!(f, "{}{}", self.file, self.index)?;
        if self.swizzle != Swizzle::XYZW {
            f.write_str(".")?;
            for i in 0..4 {
                write!(f, "{}", COMPONENTS[self.swizzle.component(i) as usize])?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub file: RegisterFile,
    pub index: u8,
    pub mask: WriteMask,
}

impl Destination {
    pub const fn new(file: RegisterFile, index: u8) -> Self {
        Self {
            file,
            index,
            mask: WriteMask::XYZW,
        }
    }

    pub const fn masked(self, mask: WriteMask) -> Self {
        Self { mask, ..self }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file, self.index)?;
        if self.mask != WriteMask::XYZW {
            f.write_str(".")?;
            for (i, name) in COMPONENTS.iter().enumerate() {
                if self.mask.0 & (1 << i) != 0 {
                    write!(f, "{name}")?;
                }
            }
        }
        Ok(())
    }
}

const NO_DESTINATION: Destination = Destination {
    file: RegisterFile::Input,
    index: 0,
    mask: WriteMask(0),
};

const NO_SOURCE: Source = Source {
    file: RegisterFile::Input,
    index: 0,
    swizzle: Swizzle(0),
    negate: false,
};

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub saturate: bool,
    pub dst: Destination,
    pub src: [Source; 3],
}

impl Instruction {
    pub const END: Self = Self {
        opcode: Opcode::End,
        saturate: false,
        dst: NO_DESTINATION,
        src: [NO_SOURCE; 3],
    };

    pub fn new(opcode: Opcode, dst: Destination, sources: &[Source]) -> Self {
        let mut src = [NO_SOURCE; 3];
        for (slot, source) in src.iter_mut().zip(sources.iter().take(opcode.sources())) {
            *slot = *source;
        }
        Self {
            opcode,
            saturate: false,
            dst: if opcode.has_destination() { dst } else { NO_DESTINATION },
            src,
        }
    }

    pub fn saturated(self) -> Self {
        Self {
            saturate: true,
            ..self
        }
    }

    pub fn encode(&self) -> [u32; 4] {
        let dst = if self.opcode.has_destination() {
            (self.dst.mask.0 as u32 & 0xF) << 14
                | ((self.dst.index as u32) & 0x1F) << 9
                | (self.dst.file.bits() as u32) << 6
        } else {
            0
        };
        let mut words = [
            dst | (self.saturate as u32) << 5 | self.opcode.bits() as u32,
            0,
            0,
            0,
        ];
        for (word, source) in words[1..].iter_mut().zip(&self.src).take(self.opcode.sources()) {
            *word = source.encode();
        }
        words
    }

    pub fn decode(words: [u32; 4]) -> Option<Self> {
        let opcode = Opcode::from_bits((words[0] & 0x1F) as u8)?;
        let dst = if opcode.has_destination() {
            Destination {
                file: RegisterFile::from_bits(((words[0] >> 6) & 0x7) as u8)?,
                index: ((words[0] >> 9) & 0x1F) as u8,
                mask: WriteMask(((words[0] >> 14) & 0xF) as u8),
            }
        } else {
            NO_DESTINATION
        };
        let mut src = [NO_SOURCE; 3];
        for (slot, word) in src.iter_mut().zip(&words[1..]).take(opcode.sources()) {
            *slot = Source::decode(*word)?;
        }
        Some(Self {
            opcode,
            saturate: words[0] & (1 << 5) != 0,
            dst,
            src,
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if self.saturate {
            f.write_str("_sat")?;
        }
        if !self.opcode.has_destination() {
            return Ok(());
        }
        write!(f, " {}", self.dst)?;
        for source in self.src.iter().take(self.opcode.sources()) {
            write!(f, ", {source}")?;
        }
        Ok(())
    }
}

/// Flatten a program into instruction memory words.
pub fn encode_program(program: &[Instruction]) -> Vec<u32> {
    program.iter().flat_map(Instruction::encode).collect()
}

/// Decode instruction memory words; `None` on any invalid instruction.
pub fn decode_program(words: &[u32]) -> Option<Vec<Instruction>> {
    words
        .chunks_exact(4)
        .map(|chunk| Instruction::decode([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// One instruction per line, prefixed with its address.
pub fn disassemble(program: &[Instruction], base: usize) -> String {
    program
        .iter()
        .enumerate()
        .map(|(i, instruction)| format!("{:03}: {instruction}\n", base + i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(i: u8) -> Source {
        Source::new(RegisterFile::Temp, i)
    }

    #[test]
    fn encodes_fields_where_documented() {
        let instruction = Instruction::new(
            Opcode::Mul,
            Destination::new(RegisterFile::Temp, 3).masked(WriteMask::W),
            &[r(1).swizzled(Swizzle::WWWW), Source::new(RegisterFile::Const, 31).negated()],
        )
        .saturated();
        let words = instruction.encode();
        assert_eq!(words[0] & 0x1F, Opcode::Mul as u32);
        assert_ne!(words[0] & (1 << 5), 0);
        assert_eq!((words[0] >> 6) & 0x7, RegisterFile::Temp as u32);
        assert_eq!((words[0] >> 9) & 0x1F, 3);
        assert_eq!((words[0] >> 14) & 0xF, 0b1000);
        assert_eq!((words[1] >> 8) & 0xFF, 0xFF);
        assert_eq!(words[2] & 0x7, RegisterFile::Const as u32);
        assert_eq!((words[2] >> 3) & 0x1F, 31);
        assert_ne!(words[2] & (1 << 16), 0);
        assert_eq!(words[3], 0);
        assert_eq!(Instruction::decode(words), Some(instruction));
    }

    #[test]
    fn end_has_no_operands() {
        assert_eq!(Instruction::END.encode(), [Opcode::End as u32, 0, 0, 0]);
        assert_eq!(Instruction::END.to_string(), "end");
    }

    #[test]
    fn disassembly_is_readable() {
        let program = [
            Instruction::new(
                Opcode::Lrp,
                Destination::new(RegisterFile::Temp, 0).masked(WriteMask::XYZ),
                &[r(1).swizzled(Swizzle::WWWW), r(1), r(0)],
            ),
            Instruction::new(
                Opcode::Add,
                Destination::new(RegisterFile::Temp, 2),
                &[Source::new(RegisterFile::Const, 31).swizzled(Swizzle::XXXX), r(2).negated()],
            )
            .saturated(),
            Instruction::new(
                Opcode::Mov,
                Destination::new(RegisterFile::Output, 0),
                &[r(0)],
            ),
            Instruction::END,
        ];
        let text = disassemble(&program, 8);
        assert_eq!(
            text,
            "008: lrp r0.xyz, r1.wwww, r1, r0\n\
             009: add_sat r2, c31.xxxx, -r2\n\
             010: mov o0, r0\n\
             011: end\n"
        );
        assert_eq!(decode_program(&encode_program(&program)).unwrap(), program);
    }

    #[test]
    fn invalid_words_do_not_decode() {
        assert_eq!(Instruction::decode([20, 0, 0, 0]), None);
        assert_eq!(Instruction::decode([Opcode::Mov as u32, 7, 0, 0]), None);
    }
}
