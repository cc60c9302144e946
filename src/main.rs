#[macro_use]
extern crate log;

mod config;

use config::{Config, RunError};
use r4300_core::cpu::Register;
use r4300_core::{Cpu, Debugger, StopReason, System};

use std::path::PathBuf;
use std::fs;

/// Stops the system after an instruction at any of the addresses has run.
struct Breakpoints {
    addrs: Vec<u32>,
    hit: Option<u32>,
}

impl Breakpoints {
    fn new(addrs: Vec<u32>) -> Self {
        Self { addrs, hit: None }
    }
}

impl Debugger for Breakpoints {
    fn instruction_load(&mut self, addr: u32) {
        if self.addrs.contains(&addr) {
            self.hit = Some(addr);
        }
    }

    fn data_load(&mut self, _: u32) {}

    fn data_store(&mut self, _: u32) {}

    fn should_stop(&mut self) -> bool {
        self.hit.is_some()
    }
}

fn dump_registers(cpu: &Cpu) {
    info!("pc: {:08x}", cpu.pc());
    for row in 0..8_u8 {
        let line: Vec<String> = (0..4_u8)
            .map(|col| {
                let reg = Register(row * 4 + col);
                format!("{:>4}: {:016x}", reg.to_string(), cpu.read_reg(reg))
            })
            .collect();
        info!("{}", line.join("  "));
    }
    info!("  hi: {:016x}    lo: {:016x}", cpu.hi(), cpu.lo());
}

fn run() -> Result<(), RunError> {
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_create(&path)?;

    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .parse_env("RUST_LOG")
        .init();

    info!("Using config file {}", path.display());

    if config.image.as_os_str().is_empty() {
        return Err(RunError::NoImage);
    }

    let image = fs::read(&config.image)
        .map_err(|err| RunError::Image(config.image.clone(), err))?;

    let mut system = System::new(&config.cpu, Box::new(()));
    system.load_image(config.load_address, &image);
    system.cpu.set_pc(config.entry);

    let mut dbg = Breakpoints::new(config.breakpoints.clone());

    match system.run(config.max_steps, &mut dbg) {
        StopReason::Halted => {
            if let Some(halt) = system.cpu.halted() {
                warn!("Stopped: {halt}");
            }
        }
        StopReason::Break => {
            if let Some(addr) = dbg.hit {
                info!("Stopped at breakpoint {addr:08x}");
            }
        }
        StopReason::Steps => {
            info!("Stopped after {} steps", config.max_steps);
        }
    }

    dump_registers(&system.cpu);
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
