use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;
use crate::logging::{LogFormat, LogLevel};
use crate::proto::command::RateUnit;

#[derive(Parser, Debug, Clone)]
#[command(name = "pumpctl", about = "Syringe pump control over a serial link")]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Query diameter, rate, target and run state
    Status(LinkOpts),
    /// Send diameter, rate and target, then read them back
    Set(SetOpts),
    /// Start infusing
    Run(LinkOpts),
    /// Stop infusing
    Stop(LinkOpts),
    /// Print state changes as they happen
    Watch(WatchOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
}

#[derive(Args, Debug, Clone)]
pub struct LinkOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Give up on a silent exchange after this many milliseconds
    #[arg(long, default_value_t = 1000)]
    pub reply_timeout_ms: u64,
    /// Idle poll spacing while the pump runs, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,
}

impl LinkOpts {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            ..DispatcherConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SetOpts {
    #[command(flatten)]
    pub link: LinkOpts,
    /// Syringe inner diameter in mm
    #[arg(long)]
    pub diameter: f64,
    /// Infusion rate, in --unit
    #[arg(long)]
    pub rate: f64,
    #[arg(long, value_enum, default_value_t = UnitArg::MlMin)]
    pub unit: UnitArg,
    /// Target volume in ml
    #[arg(long)]
    pub target: f64,
}

#[derive(Args, Debug, Clone)]
pub struct WatchOpts {
    #[command(flatten)]
    pub link: LinkOpts,
    /// How long to watch, in seconds
    #[arg(long, default_value_t = 10.0)]
    pub secs: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum UnitArg {
    MlMin,
    UlMin,
    MlHr,
    UlHr,
}

impl From<UnitArg> for RateUnit {
    fn from(u: UnitArg) -> Self {
        match u {
            UnitArg::MlMin => RateUnit::MlPerMin,
            UnitArg::UlMin => RateUnit::UlPerMin,
            UnitArg::MlHr => RateUnit::MlPerHour,
            UnitArg::UlHr => RateUnit::UlPerHour,
        }
    }
}
