use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use mpsse_bsp::device::Ftd2xxDevice;
use mpsse_bsp::transport::open_and_init;
use swd_monitor::cli::Args;
use swd_monitor::dpap::{ApSize, DpAp};
use swd_monitor::poll::{PollEngine, PollVar};
use swd_monitor::swd::SwdLink;

fn main() -> Result<()> {
    let args = Args::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", args.default_log_filter());
    }
    env_logger::init();

    let device = match &args.serial {
        Some(serial) => Ftd2xxDevice::open_with_serial(serial)
            .with_context(|| format!("opening FTDI device with serial {serial:?}"))?,
        None => Ftd2xxDevice::open().context("opening FTDI device")?,
    };

    let mut transport =
        open_and_init(device, args.clock_hz).context("initialising MPSSE transport")?;
    if !transport.check_sync().context("checking MPSSE sync")? {
        bail!("MPSSE sync check failed");
    }

    let mut link = SwdLink::new(transport);
    link.swd_reset().context("resetting SWD line")?;

    let mut dpap = DpAp::new(link);
    let idcode = dpap
        .cpu_swd_start()
        .context("SWD startup (IDCODE read / DP power-up)")?;
    info!("target IDCODE: {idcode:08X}");

    dpap.ap_config(ApSize::Word, false);
    let link = dpap.into_link();

    let vars: Vec<PollVar> = args
        .vars
        .iter()
        .map(|v| PollVar::new(v.name.clone(), v.addr))
        .collect();

    let (tx, rx) = mpsc::channel();
    let mut engine = PollEngine::new(link, vars, tx).with_delay(args.poll_interval());

    let poll_thread = thread::spawn(move || engine.run());

    for line in rx {
        println!("{line}");
    }

    poll_thread.join().expect("poll thread panicked");
    Ok(())
}
