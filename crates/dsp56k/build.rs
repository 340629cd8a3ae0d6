#[path = "src/ins/opcodes.rs"]
#[allow(dead_code)]
mod opcodes;

use std::io::Write;
use std::path::PathBuf;

use opcodes::Opcode;
use strum::VariantArray;

/// Amount of prefix bits (19..10) used to index the candidate table.
const PREFIX_BITS: u32 = 10;
const PREFIX_SHIFT: u32 = 20 - PREFIX_BITS;

fn main() {
    println!("cargo::rerun-if-changed=src/ins/opcodes.rs");

    let lut: Vec<String> = Vec::from_iter((0..(1u32 << PREFIX_BITS)).map(|prefix| {
        let base = prefix << PREFIX_SHIFT;
        let prefix_mask = !((1u32 << PREFIX_SHIFT) - 1) & 0xFF_FFFF;

        let candidates: Vec<String> = Opcode::VARIANTS
            .iter()
            .filter(|opcode| {
                let info = opcode.info();
                (base & info.mask & prefix_mask) == (info.target & prefix_mask)
            })
            .map(|opcode| format!("Opcode::{opcode:?}"))
            .collect();

        format!("&[{}]", candidates.join(", "))
    }));

    let lut = lut.join(",\n");
    let code = format!(
        "static CANDIDATES: [&[Opcode]; {}] = [{lut}];",
        1u32 << PREFIX_BITS
    );

    let path = PathBuf::from(std::env::var("OUT_DIR").unwrap()).join("dsp56k_candidates.rs");
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(code.as_bytes()).unwrap();
}
