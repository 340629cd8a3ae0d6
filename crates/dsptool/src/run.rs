use bytesize::ByteSize;
use cores::{DspCore, interpreter, jit};
use dsp56k::{Config, Dsp, NullPeripherals, Registers, Space, TraceConfig, loader::Image};
use eyre_pretty::{Context, Result, bail};
use std::path::Path;
use tracing::info;
use zerocopy::IntoBytes;

/// Which core to run a program with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CoreKind {
    Interpreter,
    Jit,
}

pub fn load(path: &Path, trace: TraceConfig) -> Result<Dsp> {
    let text = std::fs::read_to_string(path).context("reading program image")?;
    let image = Image::parse(&text).context("parsing program image")?;

    let config = Config {
        trace,
        ..Config::default()
    };

    let mut dsp = Dsp::new(&config, Box::new(NullPeripherals::new()));
    dsp.load_image(&image);

    // nothing has been compiled yet
    dsp.mem.take_program_writes();

    Ok(dsp)
}

pub fn print_registers(regs: &Registers) {
    println!("pc  {}  sr  {}  omr {}", regs.pc, regs.sr, regs.omr);
    println!("a   {}  b   {}", regs.a, regs.b);
    println!(
        "x1  {}  x0  {}  y1  {}  y0  {}",
        regs.x1, regs.x0, regs.y1, regs.y0
    );

    for i in 0..8 {
        println!("r{i}  {}  n{i}  {}  m{i}  {}", regs.r[i], regs.n[i], regs.m[i]);
    }

    println!(
        "la  {}  lc  {}  sp  {}  ep  {}",
        regs.la, regs.lc, regs.sp, regs.ep
    );
}

fn core(kind: CoreKind, config: &jit::Config) -> Result<Box<dyn DspCore>> {
    Ok(match kind {
        CoreKind::Interpreter => Box::new(interpreter::Core::new()),
        CoreKind::Jit => {
            Box::new(jit::Core::new(config.clone()).context("creating the JIT core")?)
        }
    })
}

pub fn run(path: &Path, kind: CoreKind, instructions: u64, trace: TraceConfig) -> Result<()> {
    let mut dsp = load(path, trace)?;
    let config = jit::Config::default();

    let executed = if kind == CoreKind::Jit {
        let mut core = jit::Core::new(config.clone()).context("creating the JIT core")?;
        let executed = core.exec(&mut dsp, instructions)?;

        info!(
            "compiled {} blocks ({} of code)",
            core.compiler.compiled_count(),
            ByteSize(core.compiler.code_size() as u64).display()
        );

        executed
    } else {
        core(kind, &config)?.exec(&mut dsp, instructions)?
    };

    info!(
        "executed {} instructions, core is {:?}",
        executed.instructions, dsp.state
    );

    print_registers(&dsp.regs);
    Ok(())
}

/// First difference between two DSP instances.
fn divergence(interp: &Dsp, jit: &Dsp) -> Option<String> {
    if interp.regs.as_bytes() != jit.regs.as_bytes() {
        return Some(format!(
            "registers differ\ninterpreter: {:?}\njit: {:?}",
            interp.regs, jit.regs
        ));
    }

    if interp.state != jit.state {
        return Some(format!(
            "run states differ: {:?} vs {:?}",
            interp.state, jit.state
        ));
    }

    for space in [Space::X, Space::Y, Space::P] {
        let words = interp.mem.words(space).iter().zip(jit.mem.words(space));
        if let Some((addr, (a, b))) = words.enumerate().find(|(_, (a, b))| a != b) {
            return Some(format!(
                "{}:{addr:06X} differs: {a} vs {b}",
                space.name()
            ));
        }
    }

    None
}

/// Runs a program on both cores in lockstep chunks, stopping at the first divergence.
pub fn compare(path: &Path, instructions: u64, chunk: u64) -> Result<()> {
    let mut interp_dsp = load(path, TraceConfig::default())?;
    let mut jit_dsp = load(path, TraceConfig::default())?;

    let mut interp = core(CoreKind::Interpreter, &jit::Config::default())?;
    let mut jit = core(CoreKind::Jit, &jit::Config::default())?;

    let chunk = chunk.max(1);
    let mut done = 0;
    while done < instructions {
        let amount = chunk.min(instructions - done);
        let target = interp_dsp.executed + amount;

        interp.exec(&mut interp_dsp, amount)?;

        // the JIT may stop early or overshoot a chunk, line it up with the interpreter
        jit.exec(&mut jit_dsp, target.saturating_sub(jit_dsp.executed))?;
        while jit_dsp.executed < interp_dsp.executed {
            if jit.step(&mut jit_dsp)?.instructions == 0 {
                break;
            }
        }

        while interp_dsp.executed < jit_dsp.executed {
            if interp.step(&mut interp_dsp)?.instructions == 0 {
                break;
            }
        }

        if let Some(message) = divergence(&interp_dsp, &jit_dsp) {
            bail!(
                "cores diverged after {} instructions: {message}",
                interp_dsp.executed
            );
        }

        if interp_dsp.executed == done || interp_dsp.state != dsp56k::RunState::Running {
            break;
        }

        done = interp_dsp.executed;
    }

    info!("cores agree after {} instructions", interp_dsp.executed);
    print_registers(&interp_dsp.regs);

    Ok(())
}
