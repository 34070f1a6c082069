//! Spray robot executable entry point.
//!
//! # Architecture
//!
//! - Start a session and the logger
//! - Load `params/spray_exec.toml` from the software root
//! - Open the I/O backend: the Raspberry Pi GPIO on the robot, the simulation everywhere else
//! - Bring up the [`Robot`], which starts every subsystem worker
//! - Run the operator console until `quit`, Ctrl-C or end of input, then power off and clean
//!   up

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::NaiveDate;
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use serde::Serialize;
use std::sync::Arc;
use structopt::{clap::AppSettings, StructOpt};

// Internal
use robot_if::{
    eqpt::DigitalIo,
    tc::{arm_ctrl::ArmCmd, motor_ctrl::MotorCmd, sprayer::SprayRequest},
};
use spray_lib::{params::SprayExecParams, robot::Robot};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "spray $ ";

/// Console history, relative to the software root
const HISTORY_PATH: &str = "data/console_history.txt";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// I/O backend along with anything that has to live as long as it.
struct Backend {
    io: Arc<dyn DigitalIo>,

    /// Wheel encoder emulation, only present on the simulated backend
    #[cfg(not(all(target_arch = "arm", target_os = "linux")))]
    _encoders: robot_if::eqpt::sim::EncoderSim,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Operator console commands.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "spray",
    setting = AppSettings::NoBinaryName,
    setting = AppSettings::DisableVersion
)]
enum ConsoleCmd {
    /// Power on: enable and self-test the motors, then centre the arm
    #[structopt(name = "start")]
    Start,

    /// Power off: stop, discard queued sprays and disable the motors
    #[structopt(name = "stop")]
    Stop,

    /// Queue a spray
    #[structopt(name = "spray")]
    Spray(SprayRequest),

    /// Manual motor command
    #[structopt(name = "drive")]
    Drive {
        #[structopt(subcommand)]
        cmd: MotorCmd,
    },

    /// Manual arm command
    #[structopt(name = "arm")]
    Arm {
        #[structopt(subcommand)]
        cmd: ArmCmd,
    },

    /// Show the status snapshot
    #[structopt(name = "status")]
    Status,

    /// Show the sprays committed on a day (YYYY-MM-DD), today if omitted
    #[structopt(name = "report")]
    Report { date: Option<NaiveDate> },

    /// Read the battery now, optionally setting the simulated voltage first
    #[structopt(name = "battery")]
    Battery {
        #[structopt(long)]
        set: Option<f64>,
    },

    /// Measure the distance to the nearest obstacle
    #[structopt(name = "distance")]
    Distance,

    /// Power off, release the hardware and exit
    #[structopt(name = "shutdown", alias = "quit", alias = "exit")]
    Shutdown,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("spray_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Spray Robot Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: SprayExecParams =
        util::params::load("spray_exec.toml").wrap_err("Could not load spray_exec params")?;
    params
        .resolve_paths()
        .wrap_err("Could not resolve the data paths")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE HARDWARE ----

    let backend = open_backend(&params).wrap_err("Could not open the I/O backend")?;

    let robot = Robot::new(params, backend.io.clone(), None)
        .wrap_err("Failed to initialise the robot")?;

    // ---- CONSOLE ----

    run_console(&robot).wrap_err("Console failed")?;

    // ---- SHUTDOWN ----

    let res = robot.manual_shutdown();
    if res.ok {
        info!("{}", res.message);
    } else {
        warn!("Shutdown: {} {:?}", res.message, res.causes);
    }

    info!("End of execution");
    drop(robot);
    drop(backend);

    Ok(())
}

/// Read and execute console commands until the operator quits.
fn run_console(robot: &Robot) -> Result<(), Report> {
    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;

    let history = host::resolve_path(HISTORY_PATH).ok();
    if let Some(h) = &history {
        if rl.load_history(h).is_err() {
            info!("No console history found");
        }
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                info!("Console closed");
                break;
            }
            Err(e) => return Err(e).wrap_err("Could not read from the console"),
        };

        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str()).ok();

        let cmd = match ConsoleCmd::from_iter_safe(line.split_whitespace()) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        if !exec(robot, cmd) {
            break;
        }
    }

    if let Some(h) = &history {
        if let Some(dir) = h.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        if let Err(e) = rl.save_history(h) {
            warn!("Could not save the console history: {}", e);
        }
    }

    Ok(())
}

/// Execute one console command, returning `false` if the console should exit.
fn exec(robot: &Robot, cmd: ConsoleCmd) -> bool {
    match cmd {
        ConsoleCmd::Start => print_json(&robot.start()),
        ConsoleCmd::Stop => print_json(&robot.stop()),
        ConsoleCmd::Spray(req) => print_json(&robot.spray(req)),
        ConsoleCmd::Drive { cmd } => print_json(&robot.drive(cmd)),
        ConsoleCmd::Arm { cmd } => print_json(&robot.arm_cmd(cmd)),
        ConsoleCmd::Status => print_json(&robot.get_status()),
        ConsoleCmd::Report { date } => match robot.get_report(date) {
            Ok(r) => print_json(&r),
            Err(e) => println!("report generation failed: {}", e),
        },
        ConsoleCmd::Battery { set } => {
            if let Some(v) = set {
                robot.set_simulated_voltage(v);
            }
            print_json(&robot.read_battery_now())
        }
        ConsoleCmd::Distance => print_json(&robot.distance_cm()),
        ConsoleCmd::Shutdown => return false,
    }

    true
}

fn print_json<T: Serialize>(val: &T) {
    match serde_json::to_string_pretty(val) {
        Ok(s) => println!("{}", s),
        Err(e) => println!("Could not format the result: {}", e),
    }
}

#[cfg(all(target_arch = "arm", target_os = "linux"))]
fn open_backend(_params: &SprayExecParams) -> Result<Backend, Report> {
    use robot_if::eqpt::rpi::RpiGpio;

    info!("Using the Raspberry Pi GPIO backend");
    Ok(Backend {
        io: Arc::new(RpiGpio::new()?),
    })
}

#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
fn open_backend(params: &SprayExecParams) -> Result<Backend, Report> {
    use robot_if::eqpt::sim::{EncoderSimConfig, SimGpio, WheelSim};
    use std::time::Duration;

    info!("Using the simulated GPIO backend");

    let sim = Arc::new(SimGpio::new());
    let m = &params.motor_ctrl;
    let encoders = sim.attach_encoders(EncoderSimConfig {
        enable_pin: m.enable_pin,
        wheels: vec![
            WheelSim {
                enc_a: m.enc_left_a_pin,
                enc_b: m.enc_left_b_pin,
                bwd_pin: m.left_bwd_pin,
            },
            WheelSim {
                enc_a: m.enc_right_a_pin,
                enc_b: m.enc_right_b_pin,
                bwd_pin: m.right_bwd_pin,
            },
        ],
        tick_period: Duration::from_millis(10),
    });

    Ok(Backend {
        io: sim,
        _encoders: encoders,
    })
}
