//! The non-parallel instruction table.
//!
//! This file is self-contained: the build script includes it to generate the candidate lists
//! used by the decoder.
use strum::VariantArray;

/// Properties of an instruction relevant to the decoder, the interpreter and the JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    pub const NONE: Self = Self(0);
    /// Always followed by an extension word.
    pub const EXT: Self = Self(1 << 0);
    /// May change the flow of control.
    pub const BRANCH: Self = Self(1 << 1);
    /// Sets up or tears down a hardware loop or a repeat.
    pub const LOOP: Self = Self(1 << 2);
    /// Conditional on the condition codes.
    pub const COND: Self = Self(1 << 3);
    /// Modifies the instruction cache.
    pub const CACHE: Self = Self(1 << 4);
    /// Pops a return address from the system stack.
    pub const POPS_RETURN: Self = Self(1 << 5);
    /// May write to program memory.
    pub const WRITES_P: Self = Self(1 << 6);

    #[inline(always)]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A named bit-field of an instruction pattern.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub letter: u8,
    pub mask: u32,
}

pub type Predicate = fn(u32) -> bool;

#[derive(Clone, Copy)]
pub struct OpcodeInfo {
    pub mask: u32,
    pub target: u32,
    pub flags: Flags,
    pub fields: [Field; 8],
    pub predicate: Option<Predicate>,
}

impl OpcodeInfo {
    const fn parse(s: &'static str, flags: Flags, predicate: Option<Predicate>) -> Self {
        assert!(s.is_ascii());

        let bytes = s.as_bytes();

        let mut mask = 0;
        let mut target = 0;
        let mut fields = [Field { letter: 0, mask: 0 }; 8];

        let mut char_index = 0;
        let mut bit_index = 24;
        while char_index < bytes.len() {
            let char = bytes[char_index];
            char_index += 1;

            if char == b'_' {
                continue;
            }

            assert!(bit_index > 0, "pattern is longer than 24 bits");
            bit_index -= 1;

            match char {
                b'0' => {
                    mask |= 1 << bit_index;
                }
                b'1' => {
                    mask |= 1 << bit_index;
                    target |= 1 << bit_index;
                }
                b'a'..=b'z' | b'A'..=b'Z' => {
                    let mut slot = 0;
                    loop {
                        assert!(slot < fields.len(), "too many fields in pattern");
                        if fields[slot].letter == 0 || fields[slot].letter == char {
                            break;
                        }
                        slot += 1;
                    }

                    fields[slot].letter = char;
                    fields[slot].mask |= 1 << bit_index;
                }
                _ => panic!("unknown character"),
            }
        }

        assert!(bit_index == 0, "pattern is shorter than 24 bits");

        Self {
            mask,
            target,
            flags,
            fields,
            predicate,
        }
    }

    /// Whether the word matches the fixed bits of this entry, ignoring the predicate.
    #[inline(always)]
    pub fn matches_bits(&self, word: u32) -> bool {
        (word & self.mask) == self.target
    }

    #[inline(always)]
    pub fn matches(&self, word: u32) -> bool {
        self.matches_bits(word) && self.predicate.is_none_or(|p| p(word))
    }

    /// Mask of the bits named by `letter`, or zero if there is no such field.
    #[inline(always)]
    pub fn field_mask(&self, letter: u8) -> u32 {
        self.fields
            .iter()
            .find(|f| f.letter == letter)
            .map_or(0, |f| f.mask)
    }

    /// Whether this entry has an effective address field.
    #[inline(always)]
    pub fn has_ea(&self) -> bool {
        self.field_mask(b'M') == 0b111 << 11
    }
}

macro_rules! opcode {
    (@pred) => {
        None
    };
    (@pred $pred:ident) => {
        Some($pred as Predicate)
    };
    (
        $e:ident;
        $($name:ident = $pattern:literal $([$($flag:ident)|+])? $(if $pred:ident)?),*
        $(,)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray)]
        pub enum $e {
            $(
                $name,
            )*
        }

        static INFOS: &[OpcodeInfo] = &[
            $(
                OpcodeInfo::parse(
                    $pattern,
                    Flags::NONE$($(.union(Flags::$flag))+)?,
                    opcode!(@pred $($pred)?),
                ),
            )*
        ];

        impl $e {
            #[inline(always)]
            pub fn info(self) -> &'static OpcodeInfo {
                &INFOS[self as usize]
            }

            pub fn pattern(self) -> &'static str {
                match self {
                    $(
                        Self::$name => $pattern,
                    )*
                }
            }
        }
    };
}

#[inline(always)]
const fn bits(word: u32, start: u32, len: u32) -> u32 {
    (word >> start) & ((1 << len) - 1)
}

/// Whether a 6-bit register select names an existing register.
pub const fn is_reg6(value: u32) -> bool {
    matches!(value, 0x04..=0x27 | 0x2A | 0x30 | 0x31 | 0x38..=0x3F)
}

fn ea_reg(w: u32) -> bool {
    bits(w, 11, 3) != 0b110
}

fn ea_abs(w: u32) -> bool {
    ea_reg(w) || bits(w, 8, 3) == 0b000
}

fn ea_any(w: u32) -> bool {
    ea_abs(w) || bits(w, 8, 3) == 0b100
}

fn reg6_low(w: u32) -> bool {
    is_reg6(bits(w, 0, 6))
}

fn reg6_mid(w: u32) -> bool {
    is_reg6(bits(w, 8, 6))
}

fn reg5_low(w: u32) -> bool {
    is_reg6(bits(w, 0, 5))
}

fn reg4_low(w: u32) -> bool {
    bits(w, 0, 4) >= 0b0100
}

fn ctrl5(w: u32) -> bool {
    is_reg6(0b10_0000 | bits(w, 0, 5))
}

fn movec_ea(w: u32) -> bool {
    ea_any(w) && ctrl5(w)
}

fn movec_reg(w: u32) -> bool {
    reg6_mid(w) && ctrl5(w)
}

fn movem_ea(w: u32) -> bool {
    ea_any(w) && reg6_low(w)
}

fn lua_dst(w: u32) -> bool {
    bits(w, 4, 1) == 1
}

fn tcc_src(w: u32) -> bool {
    let jjj = bits(w, 4, 3);
    jjj == 0 || jjj >= 0b100
}

fn shift_src(w: u32) -> bool {
    bits(w, 1, 3) >= 0b010
}

fn insert_src(w: u32) -> bool {
    bits(w, 4, 3) >= 0b010
}

fn insert_ss(w: u32) -> bool {
    insert_src(w) && shift_src(w)
}

fn cmpu_src(w: u32) -> bool {
    let ggg = bits(w, 1, 3);
    ggg == 0 || ggg >= 0b100
}

opcode! {
    Opcode;

    // no operands
    Nop        = "0000_0000_0000_0000_0000_0000",
    Pflushun   = "0000_0000_0000_0000_0000_0001" [CACHE],
    Pfree      = "0000_0000_0000_0000_0000_0010" [CACHE],
    Pflush     = "0000_0000_0000_0000_0000_0011" [CACHE],
    Rti        = "0000_0000_0000_0000_0000_0100" [BRANCH | POPS_RETURN],
    Illegal    = "0000_0000_0000_0000_0000_0101" [BRANCH],
    Trap       = "0000_0000_0000_0000_0000_0110" [BRANCH],
    Inc        = "0000_0000_0000_0000_0000_100d",
    Dec        = "0000_0000_0000_0000_0000_101d",
    Rts        = "0000_0000_0000_0000_0000_1100" [BRANCH | POPS_RETURN],
    Punlockr   = "0000_0000_0000_0000_0000_1110" [EXT | CACHE],
    Plockr     = "0000_0000_0000_0000_0000_1111" [EXT | CACHE],
    Trapcc     = "0000_0000_0000_0000_0001_CCCC" [BRANCH | COND],
    Reset      = "0000_0000_0000_0000_1000_0100",
    Wait       = "0000_0000_0000_0000_1000_0110" [BRANCH],
    Stop       = "0000_0000_0000_0000_1000_0111" [BRANCH],
    Enddo      = "0000_0000_0000_0000_1000_1100" [LOOP],
    Andi       = "0000_0000_iiii_iiii_1011_10EE",
    Ori        = "0000_0000_iiii_iiii_1111_10EE",
    Debug      = "0000_0000_0000_0010_0000_0000",
    DorForever = "0000_0000_0000_0010_0000_0010" [EXT | LOOP],
    DoForever  = "0000_0000_0000_0010_0000_0011" [EXT | LOOP],
    Brkcc      = "0000_0000_0000_0010_0001_CCCC" [LOOP | COND],
    Debugcc    = "0000_0000_0000_0011_0000_CCCC" [COND],

    // arithmetic with immediates
    AddImm     = "0000_0001_01ii_iiii_1000_d000",
    SubImm     = "0000_0001_01ii_iiii_1000_d100",
    AndImm     = "0000_0001_01ii_iiii_1000_d110",
    OrImm      = "0000_0001_01ii_iiii_1000_d010",
    EorImm     = "0000_0001_01ii_iiii_1000_d011",
    CmpImm     = "0000_0001_01ii_iiii_1000_d101",
    AddLong    = "0000_0001_0100_0000_1100_d000" [EXT],
    SubLong    = "0000_0001_0100_0000_1100_d100" [EXT],
    AndLong    = "0000_0001_0100_0000_1100_d110" [EXT],
    OrLong     = "0000_0001_0100_0000_1100_d010" [EXT],
    EorLong    = "0000_0001_0100_0000_1100_d011" [EXT],
    CmpLong    = "0000_0001_0100_0000_1100_d101" [EXT],

    // multiplication
    MpyShift   = "0000_0001_000s_ssss_11QQ_dk00",
    MpyrShift  = "0000_0001_000s_ssss_11QQ_dk01",
    MacShift   = "0000_0001_000s_ssss_11QQ_dk10",
    MacrShift  = "0000_0001_000s_ssss_11QQ_dk11",
    Mpyi       = "0000_0001_0100_0001_11qq_dk00" [EXT],
    Mpyri      = "0000_0001_0100_0001_11qq_dk01" [EXT],
    Maci       = "0000_0001_0100_0001_11qq_dk10" [EXT],
    Macri      = "0000_0001_0100_0001_11qq_dk11" [EXT],
    Dmac       = "0000_0001_0010_010s_1SdkQQQQ",
    Macsu      = "0000_0001_0010_0110_1sdk_QQQQ",
    Mpysu      = "0000_0001_0010_0111_1sdk_QQQQ",
    Div        = "0000_0001_1000_0000_01JJ_d000",
    Norm       = "0000_0001_1101_1RRR_0001_d101",

    // bit manipulation and tests on the short I/O window
    BclrQq     = "0000_0001_00qq_qqqq_0S00_bbbb",
    BsetQq     = "0000_0001_00qq_qqqq_0S10_bbbb",
    BchgQq     = "0000_0001_01qq_qqqq_0S00_bbbb",
    BtstQq     = "0000_0001_01qq_qqqq_0S10_bbbb",
    JclrQq     = "0000_0001_10qq_qqqq_1S0b_bbbb" [EXT | BRANCH | COND],
    JsetQq     = "0000_0001_10qq_qqqq_1S1b_bbbb" [EXT | BRANCH | COND],
    JsclrQq    = "0000_0001_11qq_qqqq_1S0b_bbbb" [EXT | BRANCH | COND],
    JssetQq    = "0000_0001_11qq_qqqq_1S1b_bbbb" [EXT | BRANCH | COND],

    // transfers
    TccAcc     = "0000_0010_CCCC_0000_0JJJ_d000" [COND] if tcc_src,
    TccR       = "0000_0010_CCCC_1ttt_0000_0TTT" [COND],
    TccAccR    = "0000_0011_CCCC_0ttt_0JJJ_dTTT" [COND] if tcc_src,
    MovexShort = "0000_001a_aaaa_aRRR_1a0W_DDDD" if reg4_low,
    MoveyShort = "0000_001a_aaaa_aRRR_1a1W_DDDD" if reg4_low,

    // address calculation and control registers
    LuaRn      = "0000_0100_00aa_aRRR_aaaa_dddd",
    LuaEa      = "0000_0100_010M_MRRR_000d_dddd" if lua_dst,
    LraRn      = "0000_0100_1100_0RRR_000d_dddd" [EXT] if reg5_low,
    LraDisp    = "0000_0100_0100_0000_010d_dddd" [EXT] if reg5_low,
    MovecReg   = "0000_0100_W1ee_eeee_101d_dddd" if movec_reg,
    MovepQqReg = "0000_0100_W1dd_dddd_1q0q_qqqq" if reg6_mid,
    MovepQqRegY = "0000_0100_W1dd_dddd_0q1q_qqqq" if reg6_mid,
    BrclrQq    = "0000_0100_10qq_qqqq_0S0b_bbbb" [EXT | BRANCH | COND],
    BrsetQq    = "0000_0100_10qq_qqqq_0S1b_bbbb" [EXT | BRANCH | COND],
    BsclrQq    = "0000_0100_10qq_qqqq_1S0b_bbbb" [EXT | BRANCH | COND],
    BssetQq    = "0000_0100_10qq_qqqq_1S1b_bbbb" [EXT | BRANCH | COND],
    MovecEa    = "0000_0101_W1MM_MRRR_0s1d_dddd" if movec_ea,
    MovecAa    = "0000_0101_W0aa_aaaa_0s1d_dddd" if ctrl5,
    MovecImm   = "0000_0101_iiii_iiii_101d_dddd" if ctrl5,

    // short branches
    BsccShort  = "0000_0101_CCCC_00aa_aa0a_aaaa" [BRANCH | COND],
    BccShort   = "0000_0101_CCCC_01aa_aa0a_aaaa" [BRANCH | COND],
    BsrShort   = "0000_0101_0000_10aa_aa0a_aaaa" [BRANCH],
    BraShort   = "0000_0101_0000_11aa_aa0a_aaaa" [BRANCH],

    // hardware loops
    DoEa       = "0000_0110_01MM_MRRR_0S00_0000" [EXT | LOOP] if ea_reg,
    DorEa      = "0000_0110_01MM_MRRR_0S01_0000" [EXT | LOOP] if ea_reg,
    RepEa      = "0000_0110_01MM_MRRR_0S10_0000" [LOOP] if ea_reg,
    DoAa       = "0000_0110_00aa_aaaa_0S00_0000" [EXT | LOOP],
    DorAa      = "0000_0110_00aa_aaaa_0S01_0000" [EXT | LOOP],
    RepAa      = "0000_0110_00aa_aaaa_0S10_0000" [LOOP],
    DoImm      = "0000_0110_iiii_iiii_1000_hhhh" [EXT | LOOP],
    DorImm     = "0000_0110_iiii_iiii_1001_hhhh" [EXT | LOOP],
    RepImm     = "0000_0110_iiii_iiii_1010_hhhh" [LOOP],
    DoReg      = "0000_0110_11DD_DDDD_0000_0000" [EXT | LOOP] if reg6_mid,
    DorReg     = "0000_0110_11DD_DDDD_0001_0000" [EXT | LOOP] if reg6_mid,
    RepReg     = "0000_0110_11DD_DDDD_0010_0000" [LOOP] if reg6_mid,

    // program memory and peripheral moves
    MovemAa    = "0000_0111_W0aa_aaaa_00dd_dddd" [WRITES_P] if reg6_low,
    MovemEa    = "0000_0111_W1MM_MRRR_10dd_dddd" [WRITES_P] if movem_ea,
    MovepQqEa  = "0000_0111_W1MM_MRRR_0Sqq_qqqq" if ea_any,
    MovepQqEaY = "0000_0111_W0MM_MRRR_1Sqq_qqqq" if ea_any,
    MovepPpReg = "0000_100s_W1dd_dddd_00pp_pppp" if reg6_mid,
    MovepPpP   = "0000_100s_W1MM_MRRR_01pp_pppp" [WRITES_P] if ea_any,
    MovepPpEa  = "0000_100s_W1MM_MRRR_1Spp_pppp" if ea_any,

    // bit manipulation: clear, set and jumps
    BclrEa     = "0000_1010_01MM_MRRR_0S00_bbbb" if ea_abs,
    BclrAa     = "0000_1010_00aa_aaaa_0S00_bbbb",
    BclrPp     = "0000_1010_10pp_pppp_0S00_bbbb",
    BclrReg    = "0000_1010_11DD_DDDD_010b_bbbb" if reg6_mid,
    BsetEa     = "0000_1010_01MM_MRRR_0S10_bbbb" if ea_abs,
    BsetAa     = "0000_1010_00aa_aaaa_0S10_bbbb",
    BsetPp     = "0000_1010_10pp_pppp_0S10_bbbb",
    BsetReg    = "0000_1010_11DD_DDDD_011b_bbbb" if reg6_mid,
    JclrEa     = "0000_1010_01MM_MRRR_1S0b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    JclrAa     = "0000_1010_00aa_aaaa_1S0b_bbbb" [EXT | BRANCH | COND],
    JclrPp     = "0000_1010_10pp_pppp_1S0b_bbbb" [EXT | BRANCH | COND],
    JclrReg    = "0000_1010_11DD_DDDD_000b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    JsetEa     = "0000_1010_01MM_MRRR_1S1b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    JsetAa     = "0000_1010_00aa_aaaa_1S1b_bbbb" [EXT | BRANCH | COND],
    JsetPp     = "0000_1010_10pp_pppp_1S1b_bbbb" [EXT | BRANCH | COND],
    JsetReg    = "0000_1010_11DD_DDDD_001b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    JmpEa      = "0000_1010_11MM_MRRR_1000_0000" [BRANCH] if ea_abs,
    JccEa      = "0000_1010_11MM_MRRR_1010_CCCC" [BRANCH | COND] if ea_abs,
    Punlock    = "0000_1010_11MM_MRRR_1000_0001" [CACHE] if ea_abs,
    MovexLong  = "0000_1010_0111_0RRR_1WDD_DDDD" [EXT] if reg6_low,
    Vsl        = "0000_101S_11MM_MRRR_110i_0000" if ea_abs,

    // bit manipulation: change, test and subroutine jumps
    BchgEa     = "0000_1011_01MM_MRRR_0S00_bbbb" if ea_abs,
    BchgAa     = "0000_1011_00aa_aaaa_0S00_bbbb",
    BchgPp     = "0000_1011_10pp_pppp_0S00_bbbb",
    BchgReg    = "0000_1011_11DD_DDDD_010b_bbbb" if reg6_mid,
    BtstEa     = "0000_1011_01MM_MRRR_0S10_bbbb" if ea_abs,
    BtstAa     = "0000_1011_00aa_aaaa_0S10_bbbb",
    BtstPp     = "0000_1011_10pp_pppp_0S10_bbbb",
    BtstReg    = "0000_1011_11DD_DDDD_011b_bbbb" if reg6_mid,
    JsclrEa    = "0000_1011_01MM_MRRR_1S0b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    JsclrAa    = "0000_1011_00aa_aaaa_1S0b_bbbb" [EXT | BRANCH | COND],
    JsclrPp    = "0000_1011_10pp_pppp_1S0b_bbbb" [EXT | BRANCH | COND],
    JsclrReg   = "0000_1011_11DD_DDDD_000b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    JssetEa    = "0000_1011_01MM_MRRR_1S1b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    JssetAa    = "0000_1011_00aa_aaaa_1S1b_bbbb" [EXT | BRANCH | COND],
    JssetPp    = "0000_1011_10pp_pppp_1S1b_bbbb" [EXT | BRANCH | COND],
    JssetReg   = "0000_1011_11DD_DDDD_001b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    JsrEa      = "0000_1011_11MM_MRRR_1000_0000" [BRANCH] if ea_abs,
    JsccEa     = "0000_1011_11MM_MRRR_1010_CCCC" [BRANCH | COND] if ea_abs,
    Plock      = "0000_1011_11MM_MRRR_1000_0001" [CACHE] if ea_abs,
    MoveyLong  = "0000_1011_0111_0RRR_1WDD_DDDD" [EXT] if reg6_low,

    // absolute jumps, relative bit branches and field operations
    JmpAbs     = "0000_1100_0000_aaaa_aaaa_aaaa" [BRANCH],
    BrclrEa    = "0000_1100_10MM_MRRR_0S0b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    BrsetEa    = "0000_1100_10MM_MRRR_0S1b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    BrclrAa    = "0000_1100_10aa_aaaa_1S0b_bbbb" [EXT | BRANCH | COND],
    BrsetAa    = "0000_1100_10aa_aaaa_1S1b_bbbb" [EXT | BRANCH | COND],
    BrclrPp    = "0000_1100_11pp_pppp_0S0b_bbbb" [EXT | BRANCH | COND],
    BrsetPp    = "0000_1100_11pp_pppp_0S1b_bbbb" [EXT | BRANCH | COND],
    BrclrReg   = "0000_1100_11DD_DDDD_100b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    BrsetReg   = "0000_1100_11DD_DDDD_101b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    ExtractImm = "0000_1100_0001_1000_000s_000D" [EXT],
    ExtractuImm = "0000_1100_0001_1000_100s_000D" [EXT],
    InsertImm  = "0000_1100_0001_1001_0qqq_000D" [EXT] if insert_src,
    Extract    = "0000_1100_0001_1010_000s_SSSD" if shift_src,
    Extractu   = "0000_1100_0001_1010_100s_SSSD" if shift_src,
    Insert     = "0000_1100_0001_1011_0qqq_SSSD" if insert_ss,
    Merge      = "0000_1100_0001_1011_1000_SSSD" if shift_src,
    AsrImm     = "0000_1100_0001_1100_Siii_iiiD",
    AslImm     = "0000_1100_0001_1101_Siii_iiiD",
    Clb        = "0000_1100_0001_1110_0000_00SD",
    LslReg     = "0000_1100_0001_1110_0001_SSSD" if shift_src,
    Normf      = "0000_1100_0001_1110_0010_SSSD" if shift_src,
    LsrReg     = "0000_1100_0001_1110_0011_SSSD" if shift_src,
    AslReg     = "0000_1100_0001_1110_010s_SSSD" if shift_src,
    AsrReg     = "0000_1100_0001_1110_011s_SSSD" if shift_src,
    LslImm     = "0000_1100_0001_1110_10ii_iiiD",
    LsrImm     = "0000_1100_0001_1110_11ii_iiiD",
    Cmpu       = "0000_1100_0001_1111_1111_SSSd" if cmpu_src,

    // subroutines and long relative branches
    JsrAbs     = "0000_1101_0000_aaaa_aaaa_aaaa" [BRANCH],
    BsccLong   = "0000_1101_0001_0000_0000_CCCC" [EXT | BRANCH | COND],
    BccLong    = "0000_1101_0001_0000_0100_CCCC" [EXT | BRANCH | COND],
    BsrLong    = "0000_1101_0001_0000_1000_0000" [EXT | BRANCH],
    BraLong    = "0000_1101_0001_0000_1100_0000" [EXT | BRANCH],
    BsccRn     = "0000_1101_0001_1RRR_0000_CCCC" [BRANCH | COND],
    BccRn      = "0000_1101_0001_1RRR_0100_CCCC" [BRANCH | COND],
    BsrRn      = "0000_1101_0001_1RRR_1000_0000" [BRANCH],
    BraRn      = "0000_1101_0001_1RRR_1100_0000" [BRANCH],
    BsclrEa    = "0000_1101_10MM_MRRR_0S0b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    BssetEa    = "0000_1101_10MM_MRRR_0S1b_bbbb" [EXT | BRANCH | COND] if ea_reg,
    BsclrAa    = "0000_1101_10aa_aaaa_1S0b_bbbb" [EXT | BRANCH | COND],
    BssetAa    = "0000_1101_10aa_aaaa_1S1b_bbbb" [EXT | BRANCH | COND],
    BsclrPp    = "0000_1101_11pp_pppp_0S0b_bbbb" [EXT | BRANCH | COND],
    BssetPp    = "0000_1101_11pp_pppp_0S1b_bbbb" [EXT | BRANCH | COND],
    BsclrReg   = "0000_1101_11DD_DDDD_100b_bbbb" [EXT | BRANCH | COND] if reg6_mid,
    BssetReg   = "0000_1101_11DD_DDDD_101b_bbbb" [EXT | BRANCH | COND] if reg6_mid,

    // conditional jumps
    JccAbs     = "0000_1110_CCCC_aaaa_aaaa_aaaa" [BRANCH | COND],
    JsccAbs    = "0000_1111_CCCC_aaaa_aaaa_aaaa" [BRANCH | COND],
}

impl Opcode {
    /// Whether this instruction pushes a return address (a subroutine call).
    pub fn is_call(self) -> bool {
        use Opcode::*;

        matches!(
            self,
            JsrAbs
                | JsrEa
                | JsccAbs
                | JsccEa
                | BsrShort
                | BsrLong
                | BsrRn
                | BsccShort
                | BsccLong
                | BsccRn
                | JsclrQq
                | JssetQq
                | JsclrEa
                | JsclrAa
                | JsclrPp
                | JsclrReg
                | JssetEa
                | JssetAa
                | JssetPp
                | JssetReg
                | BsclrQq
                | BssetQq
                | BsclrEa
                | BsclrAa
                | BsclrPp
                | BsclrReg
                | BssetEa
                | BssetAa
                | BssetPp
                | BssetReg
        )
    }
}
