use anyhow::{Context, Result, bail};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cli::{LinkOpts, SetOpts, WatchOpts};
use crate::dispatcher::PumpEvent;
use crate::handle::PumpHandle;
use crate::proto::command::{Answer, DeviceState, RequestKind};
use crate::proto::parser::format_volume;

const ANSWER_WAIT: Duration = Duration::from_secs(5);
/// How long a prompt may trail the answer it closes.
const PROMPT_WAIT: Duration = Duration::from_millis(100);

fn open(link: &LinkOpts) -> Result<PumpHandle> {
    let handle = PumpHandle::open(&link.ser, link.dispatcher_config())
        .with_context(|| format!("opening pump on {}", link.ser.dev))?;
    info!(dev = %link.ser.dev, baud = link.ser.baud, "pump connected");
    Ok(handle)
}

/// The target query queued on open also tells us whether the pump is
/// already running: its prompt follows the answer. An idle pump's prompt
/// changes nothing and raises no event, so the mirrored state is read once
/// the prompt has had time to land.
fn settle(h: &PumpHandle, link: &LinkOpts) -> Result<DeviceState> {
    settle_within(h, link.dispatcher_config().reply_timeout.min(PROMPT_WAIT))
}

fn settle_within(h: &PumpHandle, prompt_wait: Duration) -> Result<DeviceState> {
    h.wait_for(ANSWER_WAIT, |ev| match ev {
        PumpEvent::Answer(Answer::Target(t)) => Some(*t),
        _ => None,
    })
    .context("pump did not answer the target query")?;
    let state = h
        .wait_for(prompt_wait, |ev| match ev {
            PumpEvent::State(s) => Some(*s),
            _ => None,
        })
        .unwrap_or_else(|| h.state());
    Ok(state)
}

fn watch_window(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .with_context(|| format!("--secs {} is out of range", secs))
}

fn collect_answers(h: &PumpHandle, n: usize) -> Result<Vec<Answer>> {
    let mut answers = Vec::with_capacity(n);
    h.wait_for(ANSWER_WAIT, |ev| {
        match ev {
            PumpEvent::Answer(a) => answers.push(*a),
            PumpEvent::DecodeFailed { request, error } => {
                warn!(?request, "bad answer: {}", error)
            }
            _ => {}
        }
        (answers.len() == n).then_some(())
    })
    .with_context(|| format!("expected {} answers, got {}", n, answers.len()))?;
    Ok(answers)
}

fn print_answers(answers: &[Answer]) {
    for a in answers {
        match a {
            Answer::Diameter(mm) => println!("diameter: {:.5} mm", mm),
            Answer::Rate(r, u) => println!("rate:     {:.5} {}", r, u),
            Answer::Target(ml) => println!("target:   {}", format_volume(*ml)),
        }
    }
}

fn state_label(s: DeviceState) -> &'static str {
    match s {
        DeviceState::Disconnected => "disconnected",
        DeviceState::Stopped => "stopped",
        DeviceState::Forward => "running",
        DeviceState::Stalled => "stalled",
    }
}

pub fn status(link: LinkOpts) -> Result<()> {
    let h = open(&link)?;
    let state = settle(&h, &link)?;
    h.submit(RequestKind::GetDiameter);
    h.submit(RequestKind::GetRate);
    h.submit(RequestKind::GetTarget);
    let answers = collect_answers(&h, 3)?;
    println!("state:    {}", state_label(state));
    print_answers(&answers);
    h.close()?;
    Ok(())
}

pub fn set(opts: SetOpts) -> Result<()> {
    let h = open(&opts.link)?;
    if settle(&h, &opts.link)? == DeviceState::Forward {
        bail!("pump is running; stop it before changing its configuration");
    }
    h.configure(opts.diameter, opts.rate, opts.unit.into(), opts.target);
    let answers = collect_answers(&h, 3)?;
    print_answers(&answers);
    h.close()?;
    Ok(())
}

pub fn run(link: LinkOpts) -> Result<()> {
    let h = open(&link)?;
    if settle(&h, &link)? == DeviceState::Forward {
        println!("already running");
        return Ok(());
    }
    h.submit(RequestKind::Run);
    h.wait_for(ANSWER_WAIT, |ev| {
        matches!(ev, PumpEvent::State(DeviceState::Forward)).then_some(())
    })
    .context("pump did not start")?;
    println!("state:    {}", state_label(DeviceState::Forward));
    h.close()?;
    Ok(())
}

pub fn stop(link: LinkOpts) -> Result<()> {
    let h = open(&link)?;
    if settle(&h, &link)? != DeviceState::Forward {
        println!("not running");
        return Ok(());
    }
    h.submit(RequestKind::Stop);
    h.wait_for(ANSWER_WAIT, |ev| {
        matches!(ev, PumpEvent::State(DeviceState::Stopped)).then_some(())
    })
    .context("pump did not stop")?;
    println!("state:    {}", state_label(DeviceState::Stopped));
    h.close()?;
    Ok(())
}

pub fn watch(opts: WatchOpts) -> Result<()> {
    let window = watch_window(opts.secs)?;
    let h = open(&opts.link)?;
    let until = Instant::now()
        .checked_add(window)
        .context("watch window overflows the clock")?;
    loop {
        let left = until.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        let ev = h.wait_for(left, |ev| Some(ev.clone()));
        match ev {
            Some(PumpEvent::State(DeviceState::Disconnected)) => {
                println!("state:    {}", state_label(DeviceState::Disconnected));
                break;
            }
            Some(PumpEvent::State(s)) => println!("state:    {}", state_label(s)),
            Some(PumpEvent::Answer(a)) => print_answers(&[a]),
            Some(PumpEvent::DecodeFailed { request, error }) => {
                warn!(?request, "bad answer: {}", error)
            }
            None => {}
        }
    }
    let stats = h.close()?;
    info!(
        packets = stats.packets,
        status = stats.status_events,
        polls = stats.polls,
        "watch done"
    );
    Ok(())
}
