use cores::{DspCore, interpreter, jit};
use dsp56k::{Config, Dsp, NullPeripherals, RunState, Space, U24, U56};
use libtest_mimic::{Arguments, Failed, Trial};
use std::fmt::Write;
use zerocopy::IntoBytes;

const WAIT: u32 = 0x00_0086;
const BUDGET: u64 = 10_000;

struct Case {
    name: &'static str,
    program: &'static [u32],
    setup: fn(&mut Dsp),
    check: fn(&Dsp) -> Result<(), String>,
}

fn no_setup(_: &mut Dsp) {}

fn no_check(_: &Dsp) -> Result<(), String> {
    Ok(())
}

fn expect(what: &str, value: u64, expected: u64) -> Result<(), String> {
    if value != expected {
        return Err(format!("{what} is {value:X}, expected {expected:X}"));
    }

    Ok(())
}

fn check_asl(dsp: &Dsp) -> Result<(), String> {
    expect("a", dsp.regs.a.value(), 0x55_579BDE_2468AC)?;

    let sr = dsp.regs.status();
    if !(sr.carry() && sr.overflow() && sr.limit() && sr.extension()) {
        return Err(format!("expected C, V, L and E to be set, sr is {}", dsp.regs.sr));
    }

    Ok(())
}

fn set_asl_input(dsp: &mut Dsp) {
    dsp.regs.a = U56::new(0xAA_ABCDEF_123456);
}

fn check_carry(dsp: &Dsp) -> Result<(), String> {
    if !dsp.regs.status().carry() {
        return Err(format!("expected C to be set, sr is {}", dsp.regs.sr));
    }

    Ok(())
}

fn set_negative(dsp: &mut Dsp) {
    dsp.regs.a = U56::new(0xFF_800000_000001);
}

const CASES: &[Case] = &[
    Case {
        name: "asl_immediate",
        // asl #1,a,a
        program: &[0x0C_1D02, WAIT],
        setup: set_asl_input,
        check: check_asl,
    },
    Case {
        name: "asl_parallel",
        // asl a
        program: &[0x20_0032, WAIT],
        setup: set_asl_input,
        check: check_asl,
    },
    Case {
        name: "asr_negative",
        // asr a
        program: &[0x20_0022, WAIT],
        setup: |dsp| dsp.regs.a = U56::new(0xFF_800000_000001),
        check: no_check,
    },
    Case {
        name: "accumulate",
        // clr a, add x0,a, add x0,a
        program: &[0x20_0013, 0x20_0040, 0x20_0040, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(0x40_0000),
        check: no_check,
    },
    Case {
        name: "increment",
        // inc a
        program: &[0x00_0008, 0x00_0008, WAIT],
        setup: |dsp| dsp.regs.a = U56::new(0x00_7FFFFF_FFFFFF),
        check: no_check,
    },
    Case {
        name: "repeat_immediate",
        // rep #5, add x0,a
        program: &[0x06_05A0, 0x20_0040, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(3),
        check: |dsp| expect("a", dsp.regs.a.value(), 15 << 24),
    },
    Case {
        name: "repeat_long",
        // rep #200, add x0,a
        program: &[0x06_C8A0, 0x20_0040, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(3),
        check: |dsp| expect("a", dsp.regs.a.value(), 600 << 24),
    },
    Case {
        name: "repeat_register",
        // rep x0, add x0,a
        program: &[0x06_C420, 0x20_0040, WAIT],
        setup: |dsp| {
            dsp.regs.x0 = U24::new(7);
            dsp.regs.lc = U24::new(0x1234);
        },
        check: |dsp| {
            expect("a", dsp.regs.a.value(), 49 << 24)?;
            expect("lc", dsp.regs.lc.value() as u64, 0x1234)
        },
    },
    Case {
        name: "repeat_register_zero",
        // rep y0, add x0,a, inc a
        program: &[0x06_C620, 0x20_0040, 0x00_0008, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(5),
        check: |dsp| expect("a", dsp.regs.a.value(), 1),
    },
    Case {
        name: "repeat_shift_once",
        // rep #1, asr a
        program: &[0x06_01A0, 0x20_0022, WAIT],
        setup: set_negative,
        check: |dsp| {
            expect("a", dsp.regs.a.value(), 0xFF_C00000_000000)?;
            check_carry(dsp)
        },
    },
    Case {
        name: "repeat_shift_word",
        // rep #24, asr a
        program: &[0x06_18A0, 0x20_0022, WAIT],
        setup: |dsp| dsp.regs.a = U56::new(0x00_123456_89ABCD),
        check: |dsp| {
            expect("a", dsp.regs.a.value(), 0x12_3456)?;
            check_carry(dsp)
        },
    },
    Case {
        name: "repeat_shift_past_width",
        // rep #70, asr a
        program: &[0x06_46A0, 0x20_0022, WAIT],
        setup: set_negative,
        check: |dsp| {
            expect("a", dsp.regs.a.value(), 0xFF_FFFFFF_FFFFFF)?;
            check_carry(dsp)
        },
    },
    Case {
        name: "repeat_logic_shift",
        // add x0,a, rep #6, lsl a
        program: &[0x20_0040, 0x06_06A0, 0x20_0033, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(1),
        check: |dsp| expect("a", dsp.regs.a.value(), 0x40 << 24),
    },
    Case {
        name: "repeat_stores",
        // rep #8, move x0,x:(r0)+
        program: &[0x06_08A0, 0x44_5800, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(0x11),
        check: |dsp| {
            expect("r0", dsp.regs.r[0].value() as u64, 8)?;
            expect("x:7", dsp.mem.read(Space::X, U24::new(7)).value() as u64, 0x11)
        },
    },
    Case {
        name: "skipped_loop_end",
        // do #2,$3, rep #0, inc a
        program: &[0x06_0280, 0x00_0003, 0x06_00A0, 0x00_0008, WAIT],
        setup: no_setup,
        check: |dsp| {
            expect("a", dsp.regs.a.value(), 0)?;
            expect("sp", dsp.regs.stack_index() as u64, 0)
        },
    },
    Case {
        name: "hardware_loop",
        // do #3,$3, add x0,a, add x0,a
        program: &[0x06_0380, 0x00_0003, 0x20_0040, 0x20_0040, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(1),
        check: |dsp| expect("a", dsp.regs.a.value(), 6 << 24),
    },
    Case {
        name: "modulo_stores",
        // do #6,$3, move x0,x:(r0)+, add x0,a
        program: &[0x06_0680, 0x00_0003, 0x44_5800, 0x20_0040, WAIT],
        setup: |dsp| {
            dsp.regs.x0 = U24::new(0x11);
            dsp.regs.r[0] = U24::new(0x20);
            dsp.regs.m[0] = U24::new(3);
        },
        check: |dsp| expect("r0", dsp.regs.r[0].value() as u64, 0x22),
    },
    Case {
        name: "memory_moves",
        // move x0,x:$10, move x0,y:$11, move x:$10,y0, add y0,a
        program: &[0x44_1000, 0x4C_1100, 0x46_9000, 0x20_0050, WAIT],
        setup: |dsp| dsp.regs.x0 = U24::new(0x12_3456),
        check: |dsp| expect("y0", dsp.regs.y0.value() as u64, 0x12_3456),
    },
    Case {
        name: "jump",
        // jmp $2, inc a, inc a
        program: &[0x0C_0002, 0x00_0008, 0x00_0008, WAIT],
        setup: no_setup,
        check: |dsp| expect("a", dsp.regs.a.value(), 1),
    },
    Case {
        name: "conditional_jump",
        // clr a, jeq $3, inc a
        program: &[0x20_0013, 0x0E_A003, 0x00_0008, WAIT],
        setup: |dsp| dsp.regs.a = U56::new(5),
        check: |dsp| expect("a", dsp.regs.a.value(), 0),
    },
    Case {
        name: "subroutine",
        // jsr $3, inc a, wait, inc a, inc a, rts
        program: &[0x0D_0003, 0x00_0008, WAIT, 0x00_0008, 0x00_0008, 0x00_000C],
        setup: no_setup,
        check: |dsp| expect("a", dsp.regs.a.value(), 3),
    },
    Case {
        name: "mode_registers",
        // movec #$10,m0, andi #$fe,mr
        program: &[0x05_10A0, 0x00_FEB8, WAIT],
        setup: no_setup,
        check: no_check,
    },
    Case {
        name: "self_modifying",
        // movem x0,p:$2, nop, clr a
        program: &[0x07_0204, 0x00_0000, 0x20_0013, WAIT],
        setup: |dsp| {
            dsp.regs.a = U56::new(5);
            dsp.regs.x0 = U24::new(0x00_0008);
        },
        check: |dsp| expect("a", dsp.regs.a.value(), 6),
    },
];

fn prepare(case: &Case) -> Dsp {
    let mut dsp = Dsp::new(&Config::default(), Box::new(NullPeripherals::new()));
    for (addr, &word) in case.program.iter().enumerate() {
        dsp.write(Space::P, U24::new(addr as u32), U24::new(word));
    }

    dsp.mem.take_program_writes();
    (case.setup)(&mut dsp);
    dsp
}

fn differences(interp: &Dsp, jit: &Dsp) -> Vec<String> {
    let mut diffs = vec![];
    if interp.regs.as_bytes() != jit.regs.as_bytes() {
        diffs.push(format!(
            "registers:\r\n  interpreter {:?}\r\n  jit         {:?}",
            interp.regs, jit.regs
        ));
    }

    if interp.state != jit.state {
        diffs.push(format!("state: {:?} vs {:?}", interp.state, jit.state));
    }

    for space in [Space::X, Space::Y, Space::P] {
        let words = interp.mem.words(space).iter().zip(jit.mem.words(space));
        for (addr, (a, b)) in words.enumerate().filter(|(_, (a, b))| a != b) {
            diffs.push(format!("{}:{addr:06X}: {a} vs {b}", space.name()));
        }
    }

    diffs
}

fn run_case(case: &Case) -> Result<(), Failed> {
    let mut interp_dsp = prepare(case);
    let mut jit_dsp = prepare(case);

    interpreter::Core::new()
        .exec(&mut interp_dsp, BUDGET)
        .map_err(|e| Failed::from(format!("interpreter failed: {e}")))?;

    let mut core = jit::Core::new(jit::Config::default())
        .map_err(|e| Failed::from(format!("creating the jit failed: {e}")))?;
    core.exec(&mut jit_dsp, BUDGET)
        .map_err(|e| Failed::from(format!("jit failed: {e}")))?;

    if interp_dsp.state == RunState::Running {
        return Err(Failed::from("program did not reach its WAIT"));
    }

    let diffs = differences(&interp_dsp, &jit_dsp);
    if !diffs.is_empty() {
        let mut msg = format!("cores diverged in {} places\r\n", diffs.len());
        for diff in diffs.iter().take(8) {
            writeln!(&mut msg, "{diff}").unwrap();
        }

        return Err(Failed::from(msg));
    }

    (case.check)(&interp_dsp).map_err(Failed::from)
}

fn main() {
    let args = Arguments::from_args();

    let tests = CASES
        .iter()
        .map(|case| {
            Trial::test(case.name, move || {
                let result = std::panic::catch_unwind(move || run_case(case));
                match result {
                    Ok(r) => r,
                    Err(e) => {
                        let mut msg = "<unknown panic>".to_owned();
                        if let Some(s) = e.downcast_ref::<String>() {
                            msg = s.clone();
                        } else if let Some(s) = e.downcast_ref::<&'static str>() {
                            msg = (*s).to_owned();
                        }

                        Err(Failed::from(msg))
                    }
                }
            })
        })
        .collect();

    std::panic::set_hook(Box::new(move |_| ()));
    libtest_mimic::run(&args, tests).exit();
}
