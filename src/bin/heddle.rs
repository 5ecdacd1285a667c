// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Command-line runner: binds a core shared object, runs a boot image under
//! it, and optionally cross-checks every retired instruction against a
//! reference model.

use heddle::core::{Channel, DlCore};
use heddle::difftest::{Difftest, DlRef};
use heddle::profile::CoreProfile;
use heddle::session::{RunState, Session};
use heddle::wave::WaveProbe;
use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[command(name = "heddle")]
#[command(about = "Co-simulation and differential-testing harness for soft RISC-V cores")]
struct Args {
    /// Core model shared object exporting the core_* C ABI.
    core: PathBuf,

    /// Boot image copied into backing memory before reset.
    #[clap(default_value = "char-test.bin")]
    image: PathBuf,

    /// Reference model shared object exporting the difftest_* C ABI;
    /// omit to run without differential testing.
    reference: Option<PathBuf>,

    /// Core variant profile (JSON). Defaults apply when omitted.
    #[clap(long)]
    profile: Option<PathBuf>,

    /// VCD output path for the handshake-level signals.
    #[clap(long)]
    wave: Option<PathBuf>,

    /// Log every retired instruction.
    #[clap(long)]
    itrace: bool,

    /// Log every bus transaction.
    #[clap(long)]
    mtrace: bool,

    /// Log every register-file change.
    #[clap(long)]
    rtrace: bool,

    /// Stop after this many retired instructions (0 = unlimited).
    #[clap(long, default_value = "0")]
    max_insts: u64,
}

fn main() {
    clilog::init_stderr_color_debug();

    let args = <Args as clap::Parser>::parse();
    clilog::info!("Harness args:\n{:#?}", args);

    let profile = match &args.profile {
        Some(path) => match CoreProfile::from_file(path) {
            Ok(p) => p,
            Err(e) => {
                clilog::error!("Failed to load core profile: {}", e);
                std::process::exit(1);
            }
        },
        None => CoreProfile::default(),
    };

    let image = match std::fs::read(&args.image) {
        Ok(bytes) => bytes,
        Err(e) => {
            clilog::error!("Failed to read boot image {:?}: {}", args.image, e);
            std::process::exit(1);
        }
    };
    clilog::info!(
        "Loaded {} bytes boot image from {:?}",
        image.len(),
        args.image
    );

    let core = match DlCore::open(&args.core) {
        Ok(c) => c,
        Err(e) => {
            clilog::error!("Failed to load core model: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = match Session::new(core, profile, image) {
        Ok(s) => s,
        Err(e) => {
            clilog::error!("Failed to set up session: {}", e);
            std::process::exit(1);
        }
    };
    session.itrace = args.itrace;
    session.rtrace = args.rtrace;
    session.bus_mut().mtrace = args.mtrace;

    if let Some(path) = &args.wave {
        match WaveProbe::create(path) {
            Ok(probe) => session.attach_wave(probe),
            Err(e) => {
                clilog::error!("Failed to create wave output {:?}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    match &args.reference {
        Some(path) => match DlRef::open(path) {
            Ok(r) => {
                session.attach_difftest(Difftest::new(Box::new(r)));
                clilog::info!("Differential testing enabled against {:?}", path);
            }
            Err(e) => {
                clilog::error!("Failed to load reference model: {}", e);
                std::process::exit(1);
            }
        },
        None => clilog::warn!("No reference model given; differential testing disabled"),
    }

    session.start();

    let timer_sim = clilog::stimer!("simulation");
    loop {
        let st = session.step_instruction();
        if st.is_terminal() {
            break;
        }
        if args.max_insts != 0 && session.instret() >= args.max_insts {
            break;
        }
    }
    clilog::finish!(timer_sim);
    // exit() below skips destructors; flush the probe first
    session.close_wave();

    println!();
    println!("=== Harness Summary ===");
    println!("Instructions retired: {}", session.instret());
    println!("Cycles: {}", session.cycles());
    for ch in Channel::ALL {
        let st = session.bus().chan(ch);
        println!(
            "{} channel: {} reads, {} writes, {} protocol violations",
            ch.tag(),
            st.reads,
            st.writes,
            st.violations
        );
    }
    println!();

    match session.run_state() {
        RunState::Running => {
            clilog::warn!(
                "Instruction bound ({}) reached before the program ended",
                args.max_insts
            );
            println!("RESULT: UNFINISHED");
            std::process::exit(1);
        }
        RunState::Ended { code: 0, .. } => {
            println!("RESULT: PASSED");
        }
        RunState::Ended { code, .. } => {
            println!("RESULT: FAILED (exit code {})", code);
            std::process::exit(1);
        }
        RunState::Aborted { pc } => {
            println!("RESULT: DIVERGED at pc = {:#010x}", pc);
            std::process::exit(2);
        }
    }
}
